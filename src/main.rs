mod cli;
mod commands;
mod crawl;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Use mimalloc to keep RSS flat under many concurrent body buffers
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use sitemirror_core::config::AppConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::run_mirror;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment overrides
    if let Ok(v) = std::env::var("MIRROR_WORKERS") {
        if let Some(n) = v.parse::<usize>().ok().filter(|&n| n > 0 && n <= 256) {
            config.http.max_concurrency = n;
        }
    }
    if let Ok(v) = std::env::var("MAX_DEPTH") {
        if let Ok(n) = v.parse::<u32>() {
            config.general.max_depth = n;
        }
    }

    match cli.command {
        Commands::Mirror {
            url,
            output,
            delay,
            concurrency,
            depth,
            max_pages,
            resume,
        } => {
            if let Some(output) = output {
                config.general.output_dir = output;
            }
            if let Some(delay) = delay {
                config.http.min_delay_ms = delay;
            }
            if let Some(n) = concurrency.filter(|&n| n > 0) {
                config.http.max_concurrency = n;
            }
            if let Some(depth) = depth {
                config.general.max_depth = depth;
            }
            if let Some(max_pages) = max_pages {
                config.general.max_pages = max_pages;
            }
            config.general.resume |= resume;

            run_mirror(config, &url).await?;
        }
        Commands::Inspect { file, url, rewrite } => {
            commands::inspect::run(&config, &file, &url, rewrite)?;
        }
    }

    Ok(())
}
