//! In-place rewriting of mirrored references.
//!
//! Only the bytes of a matched reference value are replaced; everything else
//! in the document is copied through untouched. Lookups go through the layout
//! registry and never allocate: anything without an entry stays as written.

use std::ops::Range;

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use sitemirror_core::CanonicalUrl;
use sitemirror_layout::{page_path, relative_path, MirrorLayout};
use sitemirror_parser::css::CSS_URL_RE;
use sitemirror_parser::{srcset, Normalizer};

/// Link-bearing attributes. Groups 2, 3 and 4 hold a double-quoted, single-quoted
/// or bare value.
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(\s(?:href|src|data-src|data-lazy-src|poster)\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#,
    )
    .unwrap()
});

static SRCSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\ssrcset\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

pub struct Rewriter<'a> {
    normalizer: &'a Normalizer,
    layout: &'a MirrorLayout,
}

impl<'a> Rewriter<'a> {
    pub fn new(normalizer: &'a Normalizer, layout: &'a MirrorLayout) -> Self {
        Self { normalizer, layout }
    }

    /// Rewrite a page stored at its own registry path.
    pub fn rewrite_page(&self, page_url: &CanonicalUrl, body: &str) -> String {
        let doc_path = self
            .layout
            .lookup(page_url)
            .unwrap_or_else(|| page_path(page_url));
        self.rewrite_html(page_url.url(), &doc_path, body)
    }

    /// Rewrite HTML so references resolve from `doc_path`. `base` resolves
    /// relative references.
    pub fn rewrite_html(&self, base: &Url, doc_path: &str, body: &str) -> String {
        let mut count = 0;
        let body = self.rewrite_attributes(base, doc_path, body, &mut count);
        let body = self.rewrite_srcsets(base, doc_path, &body, &mut count);
        let body = self.rewrite_css_urls(base, doc_path, &body, &mut count);
        debug!(page = %base, doc_path, rewritten = count, "rewrote html");
        body
    }

    /// Rewrite a stylesheet stored at `doc_path`; `css_url` resolves its references.
    pub fn rewrite_css(&self, css_url: &Url, doc_path: &str, css: &str) -> String {
        let mut count = 0;
        let css = self.rewrite_css_urls(css_url, doc_path, css, &mut count);
        debug!(stylesheet = %css_url, doc_path, rewritten = count, "rewrote css");
        css
    }

    /// Relative replacement for one raw reference, or `None` to leave it alone.
    ///
    /// `raw` is the text exactly as it appears in the document. A fragment is
    /// carried over still encoded, so it cannot close the surrounding quotes.
    pub fn map_reference(&self, raw: &str, base: &Url, doc_path: &str) -> Option<String> {
        let raw = raw.trim();
        let decoded = decode_html_entities(raw);
        let url = self.normalizer.normalize(&decoded, base)?;
        let target = self.layout.lookup(&url)?;

        let mut mapped = relative_path(doc_path, &target);
        if let Some((_, fragment)) = raw.split_once('#') {
            if !fragment.is_empty() {
                mapped.push('#');
                mapped.push_str(fragment);
            }
        }
        Some(mapped)
    }

    fn rewrite_attributes(&self, base: &Url, doc_path: &str, body: &str, count: &mut usize) -> String {
        let edits = ATTR_RE
            .captures_iter(body)
            .filter_map(|cap| cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4)))
            .filter_map(|value| {
                self.map_reference(value.as_str(), base, doc_path)
                    .map(|mapped| (value.range(), mapped))
            })
            .collect();
        splice(body, edits, count)
    }

    fn rewrite_srcsets(&self, base: &Url, doc_path: &str, body: &str, count: &mut usize) -> String {
        let mut edits = Vec::new();
        for cap in SRCSET_RE.captures_iter(body) {
            let Some(value) = cap.get(2).or_else(|| cap.get(3)) else {
                continue;
            };
            for range in srcset::candidate_ranges(value.as_str()) {
                let raw = &value.as_str()[range.clone()];
                if let Some(mapped) = self.map_reference(raw, base, doc_path) {
                    let offset = value.start();
                    edits.push((offset + range.start..offset + range.end, mapped));
                }
            }
        }
        splice(body, edits, count)
    }

    fn rewrite_css_urls(&self, base: &Url, doc_path: &str, text: &str, count: &mut usize) -> String {
        let edits = CSS_URL_RE
            .captures_iter(text)
            .filter_map(|cap| cap.get(2))
            .filter_map(|value| {
                self.map_reference(unquote(value.as_str()), base, doc_path)
                    .map(|mapped| (value.range(), mapped))
            })
            .collect();
        splice(text, edits, count)
    }
}

/// Strip one pair of surrounding quotes, including the `&quot;` form found
/// in `style` attributes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ["&quot;", "&#34;", "&#39;", "\"", "'"] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}

/// Apply non-overlapping, ascending edits.
fn splice(text: &str, edits: Vec<(Range<usize>, String)>, count: &mut usize) -> String {
    if edits.is_empty() {
        return text.to_string();
    }
    *count += edits.len();

    let mut out = String::with_capacity(text.len() + edits.len() * 16);
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemirror_core::ResourceCategory;

    fn url(s: &str) -> CanonicalUrl {
        CanonicalUrl::parse(s).unwrap()
    }

    fn setup() -> (Normalizer, MirrorLayout) {
        let layout = MirrorLayout::new();
        layout.resolve_page(&url("https://example.com/"));
        layout.resolve_page(&url("https://example.com/about"));
        layout.resolve(&url("https://example.com/a.css"), ResourceCategory::Stylesheet);
        layout.resolve(&url("https://example.com/files/logo.png"), ResourceCategory::Image);
        layout.resolve(&url("https://example.com/img/bg.jpg"), ResourceCategory::Image);
        layout.resolve(&url("https://example.com/img/a.png"), ResourceCategory::Image);
        layout.resolve(&url("https://example.com/img/a@2x.png"), ResourceCategory::Image);
        layout.resolve(&url("https://example.com/fonts/x.woff2"), ResourceCategory::Font);
        layout.resolve(&url("https://example.com/search.json?a=1&b=2"), ResourceCategory::OtherFile);
        (Normalizer::default(), layout)
    }

    #[test]
    fn test_stylesheet_round_trip() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<link rel="stylesheet" href="https://example.com/a.css">"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(out, r#"<link rel="stylesheet" href="../css/example_com/a.css">"#);
    }

    #[test]
    fn test_non_resources_pass_through() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r##"<a href="javascript:void(0)">x</a><a href="#top">t</a><a href="mailto:a@b.c">m</a><img src="data:image/png;base64,AAAA">"##;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(out, html);
    }

    #[test]
    fn test_unresolved_reference_left_unchanged() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<img src="/never-seen.png"><a href="https://other.org/">o</a>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(out, html);
        assert!(layout.lookup(&url("https://example.com/never-seen.png")).is_none());
    }

    #[test]
    fn test_cdn_proxy_and_relative_forms() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<img src='/cdn-cgi/image/w=1920,format=auto/files/logo.png'><script src=//example.com/files/logo.png></script>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(
            out,
            r#"<img src='../images/example_com/logo.png'><script src=../images/example_com/logo.png></script>"#
        );
    }

    #[test]
    fn test_page_links_and_fragments() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<a href="/about#team">About</a> <a HREF="/">Home</a>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/about"), html);
        assert_eq!(out, r#"<a href="about.html#team">About</a> <a HREF="index.html">Home</a>"#);
    }

    #[test]
    fn test_encoded_fragment_stays_inside_attribute() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<a href="/about#x&quot; onclick=&quot;alert(1)" class="nav">a</a><a href='/about#it&#39;s'>b</a>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(
            out,
            r#"<a href="about.html#x&quot; onclick=&quot;alert(1)" class="nav">a</a><a href='about.html#it&#39;s'>b</a>"#
        );
    }

    #[test]
    fn test_unquote_forms() {
        assert_eq!(unquote(" '/a.png' "), "/a.png");
        assert_eq!(unquote("\"/a.png\""), "/a.png");
        assert_eq!(unquote("&quot;/a.png&quot;"), "/a.png");
        assert_eq!(unquote("/a.png"), "/a.png");
    }

    #[test]
    fn test_srcset_candidates() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<img srcset="/img/a.png 1x, /img/a@2x.png 2x, /missing.png 3x">"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(
            out,
            r#"<img srcset="../images/example_com/a.png 1x, ../images/example_com/a_2x.png 2x, /missing.png 3x">"#
        );
    }

    #[test]
    fn test_inline_style_and_style_block() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<style>.h{background:url("/img/bg.jpg")}</style><div style="background:url(&quot;/img/bg.jpg&quot;)"></div>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(
            out,
            r#"<style>.h{background:url("../images/example_com/bg.jpg")}</style><div style="background:url(../images/example_com/bg.jpg)"></div>"#
        );
    }

    #[test]
    fn test_entity_encoded_query() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<a href="/search.json?a=1&amp;b=2">s</a>"#;
        let out = rewriter.rewrite_page(&url("https://example.com/"), html);
        assert_eq!(out, r#"<a href="../files/example_com/search.json">s</a>"#);
    }

    #[test]
    fn test_root_copy_location() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let html = r#"<link rel="stylesheet" href="/a.css"><a href="/about">a</a>"#;
        let out = rewriter.rewrite_html(url("https://example.com/").url(), "index.html", html);
        assert_eq!(
            out,
            r#"<link rel="stylesheet" href="css/example_com/a.css"><a href="example_com/about.html">a</a>"#
        );
    }

    #[test]
    fn test_rewrite_css_relative_to_stylesheet() {
        let (normalizer, layout) = setup();
        let rewriter = Rewriter::new(&normalizer, &layout);
        let css_url = Url::parse("https://example.com/a.css").unwrap();
        let css = r#"@font-face{src:url('fonts/x.woff2') format("woff2")} .b{background:url(img/bg.jpg)} .c{background:url(data:image/png;base64,AA)}"#;
        let out = rewriter.rewrite_css(&css_url, "css/example_com/a.css", css);
        assert_eq!(
            out,
            r#"@font-face{src:url('../../fonts/example_com/x.woff2') format("woff2")} .b{background:url(../../images/example_com/bg.jpg)} .c{background:url(data:image/png;base64,AA)}"#
        );
    }
}
