use std::path::Path;

use anyhow::{Context, Result};

use sitemirror_core::{AppConfig, CanonicalUrl};
use sitemirror_layout::MirrorLayout;
use sitemirror_parser::{Discovered, LinkExtractor};
use sitemirror_rewriter::Rewriter;

/// Offline extraction over a saved page, against an empty registry.
pub fn run(config: &AppConfig, file: &Path, page_url: &str, rewrite: bool) -> Result<()> {
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let page = CanonicalUrl::parse(page_url)
        .with_context(|| format!("not an http(s) URL: {page_url}"))?;

    let extractor = LinkExtractor::from_config(config)?;
    let layout = MirrorLayout::new();
    let local_path = layout.resolve_page(&page).local_path;
    let found = extractor.extract_html(&body, page.url());

    println!("{} -> {}\n", page, local_path);
    for discovered in &found {
        let (kind, context, path) = match discovered {
            Discovered::Resource(link) => (
                link.category.to_string(),
                format!("{:?}", link.context),
                layout.resolve(&link.url, link.category).local_path,
            ),
            Discovered::Page(url) => (
                "page".to_string(),
                "Anchor".to_string(),
                layout.resolve_page(url).local_path,
            ),
        };
        println!("  {:<10} {:<12} {} -> {}", kind, context, discovered.url(), path);
    }
    println!("\n{} references", found.len());

    if rewrite {
        let rewriter = Rewriter::new(extractor.normalizer(), &layout);
        println!("\n{}", rewriter.rewrite_page(&page, &body));
    }
    Ok(())
}
