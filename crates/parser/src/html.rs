use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use sitemirror_core::{Candidate, LinkContext};

use crate::script;
use crate::srcset;

/// A selector plus the attribute holding the reference.
struct AttrRule {
    selector: Selector,
    attr: &'static str,
    context: LinkContext,
    accept: fn(&str) -> bool,
}

fn any(_: &str) -> bool {
    true
}

fn looks_like_font(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    [".woff", ".ttf", ".eot", ".otf"]
        .iter()
        .any(|ext| lower.contains(ext))
}

fn rule(sel: &str, attr: &'static str, context: LinkContext) -> AttrRule {
    AttrRule {
        selector: Selector::parse(sel).unwrap(),
        attr,
        context,
        accept: any,
    }
}

static ATTR_RULES: Lazy<Vec<AttrRule>> = Lazy::new(|| {
    vec![
        rule(r#"link[rel~="stylesheet"][href]"#, "href", LinkContext::Stylesheet),
        rule("script[src]", "src", LinkContext::Script),
        rule("img[src]", "src", LinkContext::Image),
        rule("img[data-src]", "data-src", LinkContext::LazyImage),
        rule("img[data-lazy-src]", "data-lazy-src", LinkContext::LazyImage),
        rule("source[src]", "src", LinkContext::Media),
        rule("video[src]", "src", LinkContext::Media),
        rule("audio[src]", "src", LinkContext::Media),
        rule("track[src]", "src", LinkContext::Media),
        rule("video[poster]", "poster", LinkContext::Poster),
        rule(r#"link[rel~="icon"][href]"#, "href", LinkContext::Icon),
        AttrRule {
            accept: looks_like_font,
            ..rule(r#"link[rel*="font"][href]"#, "href", LinkContext::FontLink)
        },
        rule("a[href]", "href", LinkContext::Anchor),
    ]
});

static SRCSET_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img[srcset], source[srcset]").unwrap());

static INLINE_SCRIPT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("script:not([src])").unwrap());

/// Attribute references (`href`, `src`, lazy-load attributes, anchors).
pub fn attribute_refs(document: &Html) -> impl Iterator<Item = Candidate> + '_ {
    ATTR_RULES.iter().flat_map(move |rule| {
        document
            .select(&rule.selector)
            .filter_map(move |el| el.value().attr(rule.attr))
            .filter(move |value| (rule.accept)(value))
            .map(move |value| Candidate {
                value: owned(value),
                context: rule.context,
            })
    })
}

/// One candidate per `srcset` entry on `<img>` and `<source>`.
pub fn srcset_refs(document: &Html) -> impl Iterator<Item = Candidate> + '_ {
    document
        .select(&SRCSET_SEL)
        .filter_map(|el| el.value().attr("srcset"))
        .flat_map(|value| {
            srcset::candidates(value)
                .map(|url| Candidate {
                    value: owned(url),
                    context: LinkContext::Srcset,
                })
                .collect::<Vec<_>>()
        })
}

/// Heuristic endpoints inside inline `<script>` bodies.
pub fn inline_script_refs(document: &Html) -> impl Iterator<Item = Candidate> + '_ {
    document.select(&INLINE_SCRIPT_SEL).flat_map(|el| {
        let body: String = el.text().collect();
        script::endpoint_literals(&body)
            .map(|value| Candidate {
                value: value.to_string(),
                context: LinkContext::InlineScript,
            })
            .collect::<Vec<_>>()
    })
}

fn owned(value: &str) -> String {
    value.trim().to_string()
}
