//! Best-effort endpoint discovery in inline JavaScript.

use once_cell::sync::Lazy;
use regex::Regex;

/// String literals that look like data endpoints.
static ENDPOINT_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']([^"'\s]*/(?:api|ajax|json|data)/[^"'\s]+)["']"#).unwrap()
});

static JS_FETCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)fetch\(\s*["']([^"']+)["']"#).unwrap());

static JS_GET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\.get\(\s*["']([^"']+)["']"#).unwrap());

static JS_POST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\.post\(\s*["']([^"']+)["']"#).unwrap());

static JS_AJAX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\.ajax\(\s*["']([^"']+)["']"#).unwrap());

static JS_URL_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)url:\s*["']([^"']+)["']"#).unwrap());

static PATTERNS: Lazy<[&'static Regex; 6]> = Lazy::new(|| {
    [
        &*ENDPOINT_LITERAL_RE,
        &*JS_FETCH_RE,
        &*JS_GET_RE,
        &*JS_POST_RE,
        &*JS_AJAX_RE,
        &*JS_URL_KEY_RE,
    ]
});

/// Candidate endpoint strings, in pattern order. May repeat; callers dedup.
pub fn endpoint_literals(script: &str) -> impl Iterator<Item = &str> {
    PATTERNS.iter().flat_map(move |re| {
        re.captures_iter(script)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
    })
}
