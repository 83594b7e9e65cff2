use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::MirrorError;

/// Implemented by whatever actually talks to the network.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, MirrorError>;
    fn max_concurrency(&self) -> usize;
    fn default_delay(&self) -> Duration;

    /// Classify a fetch error as "dead" (permanent) or "unreachable" (worth a retry).
    fn classify_error(&self, error: &MirrorError) -> &'static str {
        match error {
            MirrorError::Status(404 | 410)
            | MirrorError::BodyTooLarge { .. }
            | MirrorError::InvalidUrl(_) => "dead",
            _ => "unreachable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_size: 50 * 1024 * 1024,
            user_agent: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false)
    }
}

/// An absolute http(s) URL without a fragment.
///
/// Only constructible through [`CanonicalUrl::from_url`], so every value in the
/// registry has already passed the mirrorability check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    /// Strips the fragment; rejects anything that is not http(s) with a host.
    pub fn from_url(mut url: Url) -> Option<Self> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        url.set_fragment(None);
        Some(Self(url))
    }

    pub fn parse(input: &str) -> Option<Self> {
        Url::parse(input).ok().and_then(Self::from_url)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Document,
    OtherFile,
}

impl ResourceCategory {
    /// Top-level directory under the output root.
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Stylesheet => "css",
            Self::Script => "js",
            Self::Image => "images",
            Self::Font => "fonts",
            Self::Media => "media",
            Self::Document | Self::OtherFile => "files",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Image => "image",
            Self::Font => "font",
            Self::Media => "media",
            Self::Document => "document",
            Self::OtherFile => "other_file",
        };
        f.pad(name)
    }
}

/// Where in the page a reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkContext {
    Stylesheet,
    Script,
    Image,
    LazyImage,
    Srcset,
    Media,
    Poster,
    Icon,
    FontLink,
    CssUrl,
    FontFace,
    InlineScript,
    Anchor,
}

impl LinkContext {
    pub fn is_page_link(&self) -> bool {
        matches!(self, Self::Anchor)
    }
}

/// A reference as it appears in the source text, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub value: String,
    pub context: LinkContext,
}

#[derive(Debug, Clone)]
pub struct ResourceLink {
    pub url: CanonicalUrl,
    pub category: ResourceCategory,
    pub origin: Url,
    pub context: LinkContext,
}

/// Delivered by the crawl scheduler once per successfully fetched page.
#[derive(Debug, Clone)]
pub struct PageFetched {
    /// The URL the page was scheduled under.
    pub page_url: Url,
    /// Where redirects ended; relative references resolve against this.
    pub final_url: Url,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct PageRecord {
    pub url: CanonicalUrl,
    pub body: String,
    pub local_path: String,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Page,
    Asset {
        category: ResourceCategory,
        local_path: String,
    },
}

#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub url: Url,
    pub depth: u32,
    pub kind: JobKind,
    pub source_url: Option<String>,
    pub priority: f64,
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_strips_fragment() {
        let url = CanonicalUrl::parse("https://Example.com/a.css#top").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a.css");
        assert_eq!(url.host(), "example.com");
    }

    #[test]
    fn test_canonical_rejects_non_http() {
        assert!(CanonicalUrl::parse("javascript:void(0)").is_none());
        assert!(CanonicalUrl::parse("mailto:a@b.c").is_none());
        assert!(CanonicalUrl::parse("ftp://example.com/x").is_none());
        assert!(CanonicalUrl::parse("data:image/png;base64,AAAA").is_none());
    }

    #[test]
    fn test_category_dirs() {
        assert_eq!(ResourceCategory::Stylesheet.dir(), "css");
        assert_eq!(ResourceCategory::Font.dir(), "fonts");
        assert_eq!(ResourceCategory::Document.dir(), "files");
        assert_eq!(ResourceCategory::OtherFile.dir(), "files");
    }
}
