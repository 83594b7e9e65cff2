//! Pure URL → relative path conventions. Allocation lives in [`crate::registry`].

use sitemirror_core::{CanonicalUrl, ResourceCategory};
use sitemirror_parser::extension_of;

/// Output-root copy of the site's root page.
pub const ROOT_INDEX: &str = "index.html";

/// `www.Example.com:8080` → `example_com_8080`.
pub fn normalized_domain(url: &CanonicalUrl) -> String {
    let host = url.host().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut domain: String = host
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '_',
        })
        .collect();
    if let Some(port) = url.url().port() {
        domain.push('_');
        domain.push_str(&port.to_string());
    }
    domain
}

/// `<category-dir>/<normalized-domain>/<filename>`.
pub fn asset_path(url: &CanonicalUrl, category: ResourceCategory) -> String {
    let segment = url.path().rsplit('/').next().unwrap_or_default();
    let mut filename = sanitize(segment);
    if filename.is_empty() {
        filename = "index".to_string();
    } else if filename.chars().all(|c| c == '.') {
        filename = "file".to_string();
    }

    if let Some(ext) = expected_extension(url, category) {
        let suffix = format!(".{ext}");
        if !filename.to_ascii_lowercase().ends_with(&suffix) {
            filename.push_str(&suffix);
        }
    }

    format!("{}/{}/{}", category.dir(), normalized_domain(url), filename)
}

/// `<normalized-domain>/<page-path>.html`.
///
/// `/` and the empty path become `index.html`. A trailing slash on any other
/// path is a directory index: `/blog/` → `blog/index.html`. Each directory
/// keeps its own index, so `/blog/` never shares a file with the home page.
pub fn page_path(url: &CanonicalUrl) -> String {
    let domain = normalized_domain(url);
    let path = url.path();

    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(sanitize)
        .collect();

    if segments.is_empty() || path.ends_with('/') {
        segments.push(ROOT_INDEX.to_string());
    } else if let Some(last) = segments.last_mut() {
        *last = match last.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => format!("{stem}.html"),
            _ => format!("{last}.html"),
        };
    }

    format!("{domain}/{}", segments.join("/"))
}

/// Path to `target` as written inside the document stored at `from_doc`.
/// Both are relative to the output root.
pub fn relative_path(from_doc: &str, target: &str) -> String {
    let mut from_dirs: Vec<&str> = from_doc.split('/').collect();
    from_dirs.pop();
    let target_parts: Vec<&str> = target.split('/').collect();
    let target_dirs = &target_parts[..target_parts.len() - 1];

    let common = from_dirs
        .iter()
        .zip(target_dirs)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = "../".repeat(from_dirs.len() - common);
    out.push_str(&target_parts[common..].join("/"));
    out
}

fn expected_extension(url: &CanonicalUrl, category: ResourceCategory) -> Option<String> {
    match (extension_of(url.path()), category) {
        (_, ResourceCategory::OtherFile) => None,
        (Some(ext), _) => Some(ext),
        (None, ResourceCategory::Stylesheet) => Some("css".into()),
        (None, ResourceCategory::Script) => Some("js".into()),
        (None, _) => None,
    }
}

/// Keep `[A-Za-z0-9_.-]`, replace the rest with `_`.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}
