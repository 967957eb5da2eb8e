//! Anchor scraping for index listing pages.
//!
//! A listing page is an HTML document where every anchor's `href` points at
//! a candidate artifact, the URL fragment carries an integrity checksum, and
//! an optional `data-requires-python` attribute carries the interpreter
//! constraint. That is the entire contract; nothing else on the page
//! matters, so a full HTML parser is not pulled in.

use std::sync::LazyLock;

use regex::Regex;

// A raw `>` inside an attribute value would end the tag here; listing pages
// escape it as `&gt;`.
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\s[^>]*>").unwrap());

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});

static REQUIRES_PYTHON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bdata-requires-python\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});

/// One anchor scraped from a listing page, attributes entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// The `href` value, fragment and all
    pub href: String,

    /// The `data-requires-python` value, if present
    pub requires_python: Option<String>,
}

/// Extract every anchor with an `href` from a listing page.
pub fn scrape_links(html: &str) -> Vec<PageLink> {
    let mut links = Vec::new();

    for anchor in ANCHOR_RE.find_iter(html) {
        let tag = anchor.as_str();

        let Some(href) = first_group(&HREF_RE, tag) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }

        links.push(PageLink {
            href: decode_entities(href),
            requires_python: first_group(&REQUIRES_PYTHON_RE, tag).map(decode_entities),
        });
    }

    links
}

/// The first matching alternation group: double-quoted, single-quoted, or
/// bare attribute value.
fn first_group<'t>(re: &Regex, tag: &'t str) -> Option<&'t str> {
    let captures = re.captures(tag)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|m| m.as_str())
}

/// Decode the handful of entities index pages actually emit.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}
