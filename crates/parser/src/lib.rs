pub mod classify;
pub mod css;
pub mod html;
pub mod normalize;
pub mod script;
pub mod srcset;

use std::collections::HashSet;

use scraper::Html;
use tracing::debug;
use url::Url;

use sitemirror_core::{
    AppConfig, CanonicalUrl, Candidate, MirrorError, ResourceCategory, ResourceLink,
};

pub use classify::{classify, extension_of, ExtensionTable};
pub use normalize::{is_non_resource, Normalizer, UnwrapRule};

/// Max bytes to parse (5 MB). Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// A normalized, classified reference.
#[derive(Debug, Clone)]
pub enum Discovered {
    Resource(ResourceLink),
    Page(CanonicalUrl),
}

impl Discovered {
    pub fn url(&self) -> &CanonicalUrl {
        match self {
            Self::Resource(link) => &link.url,
            Self::Page(url) => url,
        }
    }
}

/// Every candidate reference in an HTML document, lazily, in matcher order.
pub fn scan_html<'a>(document: &'a Html, raw: &'a str) -> impl Iterator<Item = Candidate> + 'a {
    html::attribute_refs(document)
        .chain(html::srcset_refs(document))
        .chain(css::url_refs(raw))
        .chain(html::inline_script_refs(document))
}

/// Extractor → Normalizer → Classifier.
#[derive(Debug, Clone, Default)]
pub struct LinkExtractor {
    normalizer: Normalizer,
    table: ExtensionTable,
}

impl LinkExtractor {
    pub fn new(normalizer: Normalizer, table: ExtensionTable) -> Self {
        Self { normalizer, table }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, MirrorError> {
        Ok(Self {
            normalizer: Normalizer::from_config(&config.normalizer)?,
            table: ExtensionTable::with_overrides(&config.classifier.extensions),
        })
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn table(&self) -> &ExtensionTable {
        &self.table
    }

    /// Unique references of an HTML page, first occurrence order.
    pub fn extract_html(&self, body: &str, page_url: &Url) -> Vec<Discovered> {
        let body = truncate(body, MAX_PARSE_SIZE);
        let document = Html::parse_document(body);
        self.collect(scan_html(&document, body), page_url)
    }

    /// Unique `url()` references of a stylesheet, resolved against the stylesheet URL.
    pub fn extract_css(&self, css: &str, css_url: &Url) -> Vec<Discovered> {
        self.collect(css::url_refs(truncate(css, MAX_PARSE_SIZE)), css_url)
    }

    /// Normalize and classify a single candidate.
    pub fn resolve(&self, candidate: &Candidate, origin: &Url) -> Option<Discovered> {
        let url = self.normalizer.normalize(&candidate.value, origin)?;
        let category = self.table.classify(&url);

        // Anchors to known file types are assets; everything else is a page.
        if candidate.context.is_page_link() && category == ResourceCategory::OtherFile {
            return Some(Discovered::Page(url));
        }

        Some(Discovered::Resource(ResourceLink {
            url,
            category,
            origin: origin.clone(),
            context: candidate.context,
        }))
    }

    fn collect(&self, candidates: impl Iterator<Item = Candidate>, origin: &Url) -> Vec<Discovered> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut dropped = 0usize;

        for candidate in candidates {
            match self.resolve(&candidate, origin) {
                Some(discovered) => {
                    let key = (
                        matches!(discovered, Discovered::Page(_)),
                        discovered.url().as_str().to_string(),
                    );
                    if seen.insert(key) {
                        found.push(discovered);
                    }
                }
                None => dropped += 1,
            }
        }

        debug!(origin = %origin, found = found.len(), dropped, "extracted references");
        found
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemirror_core::LinkContext;

    const PAGE: &str = r##"<!doctype html>
<html><head>
  <link rel="stylesheet" href="/css/site.css?v=1">
  <link rel="stylesheet" href="//example.com/css/site.css?v=1">
  <script src="js/app.js"></script>
  <style>.hero { background: url('/img/hero.jpg'); }</style>
</head><body>
  <img src="/cdn-cgi/image/w=1920,format=auto/files/logo.png" srcset="/a.png 1x, /b.png 2x">
  <div style="background-image: url(/img/bg.webp)"></div>
  <a href="/about">About</a>
  <a href="/docs/manual.pdf">Manual</a>
  <a href="https://other.org/">Elsewhere</a>
  <a href="javascript:void(0)">Noop</a>
  <a href="#top">Top</a>
  <a href="mailto:x@example.com">Mail</a>
  <img src="data:image/gif;base64,R0lGOD">
  <script>fetch("/api/items");</script>
</body></html>"##;

    fn urls(found: &[Discovered]) -> Vec<&str> {
        found.iter().map(|d| d.url().as_str()).collect()
    }

    #[test]
    fn test_extract_html_end_to_end() {
        let extractor = LinkExtractor::default();
        let page_url = Url::parse("https://example.com/index.html").unwrap();
        let found = extractor.extract_html(PAGE, &page_url);
        let all = urls(&found);

        assert!(all.contains(&"https://example.com/css/site.css?v=1"));
        assert!(all.contains(&"https://example.com/js/app.js"));
        assert!(all.contains(&"https://example.com/img/hero.jpg"));
        assert!(all.contains(&"https://example.com/files/logo.png"));
        assert!(all.contains(&"https://example.com/a.png"));
        assert!(all.contains(&"https://example.com/b.png"));
        assert!(all.contains(&"https://example.com/img/bg.webp"));
        assert!(all.contains(&"https://example.com/api/items"));
        assert!(!all.iter().any(|u| u.starts_with("data:") || u.starts_with("javascript:")));
        assert!(!all.iter().any(|u| u.starts_with("mailto:")));

        // Same stylesheet spelled two ways appears once.
        assert_eq!(
            all.iter()
                .filter(|u| **u == "https://example.com/css/site.css?v=1")
                .count(),
            1
        );
    }

    #[test]
    fn test_anchor_classification() {
        let extractor = LinkExtractor::default();
        let page_url = Url::parse("https://example.com/").unwrap();
        let found = extractor.extract_html(PAGE, &page_url);

        let pages: Vec<&str> = found
            .iter()
            .filter_map(|d| match d {
                Discovered::Page(url) => Some(url.as_str()),
                _ => None,
            })
            .collect();
        assert!(pages.contains(&"https://example.com/about"));
        assert!(pages.contains(&"https://other.org/"));
        assert!(!pages.iter().any(|p| p.ends_with(".pdf")));

        let manual = found
            .iter()
            .find_map(|d| match d {
                Discovered::Resource(link) if link.url.path() == "/docs/manual.pdf" => Some(link),
                _ => None,
            })
            .unwrap();
        assert_eq!(manual.category, ResourceCategory::Document);
        assert_eq!(manual.context, LinkContext::Anchor);
    }

    #[test]
    fn test_extract_css_resolves_against_stylesheet() {
        let extractor = LinkExtractor::default();
        let css_url = Url::parse("https://cdn.example.com/assets/css/site.css").unwrap();
        let css = r#"@font-face { src: url("../fonts/a.woff2") format("woff2"); }
                     .x { background: url(../img/x.svg) }"#;
        let found = extractor.extract_css(css, &css_url);

        assert_eq!(
            urls(&found),
            vec![
                "https://cdn.example.com/assets/fonts/a.woff2",
                "https://cdn.example.com/assets/img/x.svg",
            ]
        );
        match &found[0] {
            Discovered::Resource(link) => assert_eq!(link.category, ResourceCategory::Font),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let text = "aé";
        assert_eq!(truncate(text, 2), "a");
        assert_eq!(truncate(text, 3), "aé");
    }
}
