use std::collections::HashMap;

use once_cell::sync::Lazy;

use sitemirror_core::{CanonicalUrl, ResourceCategory};

const BUILTIN: &[(&str, ResourceCategory)] = &[
    ("css", ResourceCategory::Stylesheet),
    ("js", ResourceCategory::Script),
    ("woff", ResourceCategory::Font),
    ("woff2", ResourceCategory::Font),
    ("ttf", ResourceCategory::Font),
    ("eot", ResourceCategory::Font),
    ("otf", ResourceCategory::Font),
    ("jpg", ResourceCategory::Image),
    ("jpeg", ResourceCategory::Image),
    ("png", ResourceCategory::Image),
    ("gif", ResourceCategory::Image),
    ("webp", ResourceCategory::Image),
    ("bmp", ResourceCategory::Image),
    ("ico", ResourceCategory::Image),
    ("svg", ResourceCategory::Image),
    ("mp4", ResourceCategory::Media),
    ("webm", ResourceCategory::Media),
    ("ogg", ResourceCategory::Media),
    ("mp3", ResourceCategory::Media),
    ("wav", ResourceCategory::Media),
    ("flac", ResourceCategory::Media),
    ("pdf", ResourceCategory::Document),
    ("zip", ResourceCategory::Document),
    ("rar", ResourceCategory::Document),
    ("txt", ResourceCategory::Document),
    ("doc", ResourceCategory::Document),
    ("docx", ResourceCategory::Document),
    ("xls", ResourceCategory::Document),
    ("xlsx", ResourceCategory::Document),
    ("ppt", ResourceCategory::Document),
    ("pptx", ResourceCategory::Document),
];

static DEFAULT_TABLE: Lazy<ExtensionTable> = Lazy::new(ExtensionTable::default);

/// Extension → category lookup. Extension is authoritative; no content sniffing.
#[derive(Debug, Clone)]
pub struct ExtensionTable {
    map: HashMap<String, ResourceCategory>,
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self {
            map: BUILTIN
                .iter()
                .map(|(ext, category)| (ext.to_string(), *category))
                .collect(),
        }
    }
}

impl ExtensionTable {
    /// Built-in table with `overrides` layered on top (keys are case-folded).
    pub fn with_overrides(overrides: &HashMap<String, ResourceCategory>) -> Self {
        let mut table = Self::default();
        for (ext, category) in overrides {
            table
                .map
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), *category);
        }
        table
    }

    pub fn lookup(&self, extension: &str) -> Option<ResourceCategory> {
        self.map.get(&extension.to_ascii_lowercase()).copied()
    }

    pub fn classify(&self, url: &CanonicalUrl) -> ResourceCategory {
        extension_of(url.path())
            .and_then(|ext| self.lookup(&ext))
            .unwrap_or(ResourceCategory::OtherFile)
    }
}

/// Classify with the built-in table.
pub fn classify(url: &CanonicalUrl) -> ResourceCategory {
    DEFAULT_TABLE.classify(url)
}

/// Lower-cased text after the last `.` of the last path segment.
pub fn extension_of(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
