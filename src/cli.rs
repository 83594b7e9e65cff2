use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sitemirror", about = "Mirror a website for offline browsing")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a site and rewrite it to browse from disk
    Mirror {
        /// Start URL
        url: String,

        /// Output directory
        #[arg(short, long)]
        output: Option<String>,

        /// Minimum delay between requests to one host, in milliseconds
        #[arg(short, long)]
        delay: Option<u64>,

        /// Number of concurrent workers
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,

        /// Maximum page depth (0 = unlimited)
        #[arg(long)]
        depth: Option<u32>,

        /// Stop following links after this many pages (0 = unlimited)
        #[arg(long)]
        max_pages: Option<u64>,

        /// Reuse local paths from the previous run's manifest
        #[arg(long)]
        resume: bool,
    },
    /// Show the references a saved page contains and where they would be stored
    Inspect {
        /// Saved HTML file
        file: PathBuf,

        /// URL the page was fetched from
        #[arg(short, long)]
        url: String,

        /// Also print the rewritten page
        #[arg(long)]
        rewrite: bool,
    },
}
