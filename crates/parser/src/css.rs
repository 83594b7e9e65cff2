//! `url(...)` references in stylesheet text, inline `style` attributes and
//! `<style>` blocks.

use once_cell::sync::Lazy;
use regex::Regex;

use sitemirror_core::{Candidate, LinkContext};

/// Group 1 is the opening quote (possibly empty), group 2 the reference.
pub static CSS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(["']?)([^"')]+?)["']?\s*\)"#).unwrap()
});

static FONT_FACE_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)src\s*:\s*url\(\s*["']?([^"')]+?)["']?\s*\)"#).unwrap()
});

/// Every `url()` reference, then every `src: url()` declaration.
pub fn url_refs(text: &str) -> impl Iterator<Item = Candidate> + '_ {
    let generic = CSS_URL_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(2))
        .map(|m| Candidate {
            value: m.as_str().trim().to_string(),
            context: LinkContext::CssUrl,
        });
    let font_face = FONT_FACE_SRC_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| Candidate {
            value: m.as_str().trim().to_string(),
            context: LinkContext::FontFace,
        });
    generic.chain(font_face)
}
