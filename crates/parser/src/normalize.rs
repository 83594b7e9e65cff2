use regex::Regex;
use tracing::debug;
use url::Url;

use sitemirror_core::config::NormalizerConfig;
use sitemirror_core::{CanonicalUrl, MirrorError};

/// Prefixes that never denote a fetchable resource.
const NON_RESOURCE_PREFIXES: &[&str] = &["data:", "javascript:", "mailto:", "tel:", "#"];

/// Built-in image-proxy unwrap rules, tried in order against the URL path.
const DEFAULT_UNWRAP_RULES: &[(&str, &str)] = &[
    // /cdn-cgi/image/<params>/files/x.png -> /files/x.png
    (r"^/cdn-cgi/image/[^/]*/(files/.*)$", "/$1"),
    (r"^/cdn-cgi/image/(.*)$", "/files/$1"),
];

/// One path rewrite applied before canonicalization.
#[derive(Debug, Clone)]
pub struct UnwrapRule {
    pattern: Regex,
    replacement: String,
}

impl UnwrapRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, MirrorError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| MirrorError::Config(format!("bad unwrap pattern {pattern:?}: {e}")))?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }

    fn apply(&self, path: &str) -> Option<String> {
        if !self.pattern.is_match(path) {
            return None;
        }
        Some(
            self.pattern
                .replace(path, self.replacement.as_str())
                .into_owned(),
        )
    }
}

/// Maps raw references to [`CanonicalUrl`]s relative to the page they came from.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<UnwrapRule>,
}

impl Default for Normalizer {
    fn default() -> Self {
        let rules = DEFAULT_UNWRAP_RULES
            .iter()
            .filter_map(|(pattern, replacement)| UnwrapRule::new(pattern, replacement).ok())
            .collect();
        Self { rules }
    }
}

impl Normalizer {
    pub fn new(rules: Vec<UnwrapRule>) -> Self {
        Self { rules }
    }

    /// Configured rules replace the built-in list; an empty list keeps the defaults.
    pub fn from_config(config: &NormalizerConfig) -> Result<Self, MirrorError> {
        if config.unwrap_rules.is_empty() {
            return Ok(Self::default());
        }
        let rules = config
            .unwrap_rules
            .iter()
            .map(|rule| UnwrapRule::new(&rule.pattern, &rule.replacement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Resolve `raw` against `page_url`. `None` means "not mirrorable".
    pub fn normalize(&self, raw: &str, page_url: &Url) -> Option<CanonicalUrl> {
        let raw = raw.trim();
        if raw.is_empty() || is_non_resource(raw) {
            return None;
        }

        let resolved = if raw.starts_with("//") {
            Url::parse(&format!("{}:{}", page_url.scheme(), raw))
        } else {
            page_url.join(raw)
        };
        let mut url = match resolved {
            Ok(url) => url,
            Err(e) => {
                debug!(raw, page = %page_url, "dropping unresolvable reference: {}", e);
                return None;
            }
        };

        if let Some(path) = self.unwrap_path(url.path()) {
            url.set_path(&path);
        }

        CanonicalUrl::from_url(url)
    }

    /// First matching rule wins.
    pub fn unwrap_path(&self, path: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(path))
    }
}

pub fn is_non_resource(value: &str) -> bool {
    let value = value.trim_start();
    NON_RESOURCE_PREFIXES.iter().any(|prefix| {
        value
            .get(..prefix.len())
            .map(|head| head.eq_ignore_ascii_case(prefix))
            .unwrap_or(false)
    })
}
