//! Lenient HTML parsing with link absolutization.
//!
//! Documents are parsed with html5ever (through kuchikiki), which recovers
//! from any malformed markup the way browsers do, so parsing never fails.
//! After parsing, every link-bearing attribute is rewritten to an absolute
//! URL so callers can follow links without knowing where the page came from.
//!
//! Rewritten:
//! - single-URL attributes such as `href`, `src`, `action`, `poster`
//! - every candidate in `srcset`
//! - every entry of the space-separated `archive` attribute
//! - `url(...)` references in `style` attributes and `<style>` elements
//!
//! A `<base href>` is honoured as the resolution base and then removed, since
//! the links it would affect are already absolute.

use std::fmt;
use std::sync::LazyLock;

use kuchikiki::NodeRef;
use kuchikiki::traits::{NodeIterator, TendrilSink};
use regex::{Captures, Regex};
use tracing::{debug, instrument, warn};
use url::Url;

/// Attributes holding exactly one URL.
const LINK_ATTRIBUTES: &[&str] = &[
    "action",
    "background",
    "cite",
    "classid",
    "codebase",
    "data",
    "dynsrc",
    "formaction",
    "href",
    "icon",
    "longdesc",
    "lowsrc",
    "manifest",
    "poster",
    "profile",
    "src",
    "usemap",
];

/// `url(...)` inside CSS, optionally quoted.
#[allow(clippy::expect_used)]
static CSS_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(['"]?)([^'"()]+?)\s*['"]?\s*\)"#).expect("CSS url regex is valid") // Static pattern, safe to panic
});

/// A parsed document whose links are absolute.
#[derive(Clone)]
pub struct HtmlDocument {
    root: NodeRef,
    base_url: Url,
}

impl fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlDocument")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HtmlDocument {
    /// Document node of the tree.
    #[must_use]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// URL that relative links were resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Text of the first `<title>`, trimmed.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.root
            .select_first("title")
            .ok()
            .map(|title| title.as_node().text_contents().trim().to_string())
    }

    /// Values of all single-URL link attributes, in document order.
    #[must_use]
    pub fn links(&self) -> Vec<String> {
        let mut links = Vec::new();
        for element in self.root.descendants().elements() {
            let attributes = element.attributes.borrow();
            for name in LINK_ATTRIBUTES {
                if let Some(value) = attributes.get(*name) {
                    links.push(value.to_string());
                }
            }
        }
        links
    }

    /// Serializes the tree back to markup.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = Vec::new();
        if let Err(error) = self.root.serialize(&mut out) {
            warn!(%error, "HTML serialization stopped early");
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Parses `bytes` as HTML and rewrites its links against `base_url`.
///
/// Never fails: invalid UTF-8 is replaced and malformed markup is repaired by
/// the parser.
#[instrument(skip(bytes), fields(base_url = %base_url, bytes = bytes.len()))]
#[must_use]
pub fn parse_lenient(bytes: &[u8], base_url: &Url) -> HtmlDocument {
    let text = String::from_utf8_lossy(bytes);
    let root = kuchikiki::parse_html().one(&*text);

    let base_url = take_base_href(&root, base_url);
    let rewritten = absolutize_links(&root, &base_url);
    debug!(rewritten, "absolutized links");

    HtmlDocument { root, base_url }
}

/// Resolves the first `<base href>` against the page URL and detaches every
/// `<base>` that carries an `href`.
fn take_base_href(root: &NodeRef, page_url: &Url) -> Url {
    let bases: Vec<_> = root
        .descendants()
        .elements()
        .filter(|element| &*element.name.local == "base")
        .collect();

    let mut resolved: Option<Url> = None;
    for base in bases {
        let href = base
            .attributes
            .borrow()
            .get("href")
            .map(|href| href.trim().to_string());
        let Some(href) = href else {
            continue;
        };
        if resolved.is_none() {
            resolved = page_url.join(&href).ok();
        }
        base.as_node().detach();
    }

    resolved.unwrap_or_else(|| page_url.clone())
}

/// Rewrites link attributes in place, returning how many values changed.
fn absolutize_links(root: &NodeRef, base: &Url) -> usize {
    let mut rewritten = 0;

    for element in root.descendants().elements() {
        {
            let mut attributes = element.attributes.borrow_mut();

            for name in LINK_ATTRIBUTES {
                let resolved = attributes
                    .get(*name)
                    .and_then(|value| resolve(base, value));
                if let Some(resolved) = resolved {
                    attributes.insert(*name, resolved);
                    rewritten += 1;
                }
            }

            let srcset = attributes
                .get("srcset")
                .map(|value| rewrite_srcset(base, value));
            if let Some(srcset) = srcset {
                attributes.insert("srcset", srcset);
                rewritten += 1;
            }

            let archive = attributes
                .get("archive")
                .map(|value| rewrite_archive(base, value));
            if let Some(archive) = archive {
                attributes.insert("archive", archive);
                rewritten += 1;
            }

            let style = attributes
                .get("style")
                .filter(|value| CSS_URL_PATTERN.is_match(value))
                .map(|value| rewrite_css(base, value));
            if let Some(style) = style {
                attributes.insert("style", style);
                rewritten += 1;
            }
        }

        if &*element.name.local == "style" {
            for child in element.as_node().children() {
                if let Some(text) = child.as_text() {
                    let css = text.borrow().clone();
                    if CSS_URL_PATTERN.is_match(&css) {
                        *text.borrow_mut() = rewrite_css(base, &css);
                        rewritten += 1;
                    }
                }
            }
        }
    }

    rewritten
}

/// Resolves one attribute value. Empty values and values the URL parser
/// rejects are left alone.
fn resolve(base: &Url, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let absolute = base.join(trimmed).ok()?;
    if absolute.as_str() == value {
        return None;
    }
    Some(absolute.into())
}

fn resolve_or_keep(base: &Url, value: &str) -> String {
    resolve(base, value).unwrap_or_else(|| value.trim().to_string())
}

fn rewrite_srcset(base: &Url, srcset: &str) -> String {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| match candidate.split_once(char::is_whitespace) {
            Some((url, descriptor)) => {
                format!("{} {}", resolve_or_keep(base, url), descriptor.trim())
            }
            None => resolve_or_keep(base, candidate),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn rewrite_archive(base: &Url, archive: &str) -> String {
    archive
        .split_whitespace()
        .map(|entry| resolve_or_keep(base, entry))
        .collect::<Vec<_>>()
        .join(" ")
}

fn rewrite_css(base: &Url, css: &str) -> String {
    CSS_URL_PATTERN
        .replace_all(css, |caps: &Captures<'_>| {
            let quote = &caps[1];
            let target = resolve_or_keep(base, &caps[2]);
            format!("url({quote}{target}{quote})")
        })
        .into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/articles/index.html").unwrap()
    }

    fn attr(doc: &HtmlDocument, selector: &str, name: &str) -> String {
        let element = doc.root().select_first(selector).unwrap();
        element.attributes.borrow().get(name).unwrap().to_string()
    }

    #[test]
    fn test_relative_links_become_absolute() {
        let html = br#"<html><body>
            <a id="sibling" href="next.html">next</a>
            <a id="rooted" href="/about">about</a>
            <a id="parent" href="../up.html">up</a>
            <img src="img/cat.png">
            <form action="?q=1"></form>
        </body></html>"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(attr(&doc, "#sibling", "href"), "https://example.com/articles/next.html");
        assert_eq!(attr(&doc, "#rooted", "href"), "https://example.com/about");
        assert_eq!(attr(&doc, "#parent", "href"), "https://example.com/up.html");
        assert_eq!(attr(&doc, "img", "src"), "https://example.com/articles/img/cat.png");
        assert_eq!(attr(&doc, "form", "action"), "https://example.com/articles/index.html?q=1");
    }

    #[test]
    fn test_absolute_and_special_links_unchanged() {
        let html = br#"<a id="abs" href="https://other.org/x">x</a>
            <a id="mail" href="mailto:me@example.com">m</a>
            <a id="js" href="javascript:void(0)">j</a>"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(attr(&doc, "#abs", "href"), "https://other.org/x");
        assert_eq!(attr(&doc, "#mail", "href"), "mailto:me@example.com");
        assert_eq!(attr(&doc, "#js", "href"), "javascript:void(0)");
    }

    #[test]
    fn test_protocol_relative_and_fragment_links() {
        let html = br##"<script src="//cdn.example.net/app.js"></script><a href="#top">top</a>"##;

        let doc = parse_lenient(html, &page());

        assert_eq!(attr(&doc, "script", "src"), "https://cdn.example.net/app.js");
        assert_eq!(attr(&doc, "a", "href"), "https://example.com/articles/index.html#top");
    }

    #[test]
    fn test_malformed_markup_still_absolutized() {
        let html = b"<html><body><div><p>unclosed <a href='a.html'>one</a><ul><li>item<li><a href=b.html>two</div></span>";

        let doc = parse_lenient(html, &page());

        let links = doc.links();
        assert_eq!(
            links,
            vec![
                "https://example.com/articles/a.html".to_string(),
                "https://example.com/articles/b.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_and_empty_input_parse() {
        let doc = parse_lenient(b"<a href=\"x\">\xff\xfe</a>", &page());
        assert_eq!(doc.links(), vec!["https://example.com/articles/x".to_string()]);

        let empty = parse_lenient(b"", &page());
        assert!(empty.links().is_empty());
        assert!(empty.to_html().contains("<html>"));
    }

    #[test]
    fn test_base_href_used_and_removed() {
        let html = br#"<html><head><base href="/static/v2/"></head>
            <body><a href="doc.html">d</a></body></html>"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(attr(&doc, "a", "href"), "https://example.com/static/v2/doc.html");
        assert_eq!(doc.base_url().as_str(), "https://example.com/static/v2/");
        assert!(doc.root().select_first("base").is_err(), "<base> should be removed");
    }

    #[test]
    fn test_base_without_href_kept() {
        let html = br#"<html><head><base target="_blank"></head><body><a href="x">x</a></body></html>"#;

        let doc = parse_lenient(html, &page());

        assert!(doc.root().select_first("base").is_ok());
        assert_eq!(doc.base_url(), &page());
    }

    #[test]
    fn test_srcset_candidates_resolved() {
        let html = br#"<img src="a.png" srcset="a-1x.png 1x, /img/a-2x.png 2x,a-3x.png">"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(
            attr(&doc, "img", "srcset"),
            "https://example.com/articles/a-1x.png 1x, https://example.com/img/a-2x.png 2x, https://example.com/articles/a-3x.png"
        );
    }

    #[test]
    fn test_archive_entries_resolved() {
        let html = br#"<object archive="a.jar  lib/b.jar"></object>"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(
            attr(&doc, "object", "archive"),
            "https://example.com/articles/a.jar https://example.com/articles/lib/b.jar"
        );
    }

    #[test]
    fn test_css_urls_resolved() {
        let html = br#"<html><head><style>body { background: url('bg.png'); }</style></head>
            <body><div style="background-image: url(tiles/t.gif)">x</div></body></html>"#;

        let doc = parse_lenient(html, &page());

        assert_eq!(
            attr(&doc, "div", "style"),
            "background-image: url(https://example.com/articles/tiles/t.gif)"
        );
        let style = doc
            .root()
            .select_first("style")
            .unwrap()
            .as_node()
            .text_contents();
        assert!(
            style.contains("url('https://example.com/articles/bg.png')"),
            "style was: {style}"
        );
    }

    #[test]
    fn test_empty_attribute_left_alone() {
        let doc = parse_lenient(br#"<a href="">self</a>"#, &page());
        assert_eq!(attr(&doc, "a", "href"), "");
    }

    #[test]
    fn test_title_and_serialization() {
        let doc = parse_lenient(
            b"<html><head><title> Listing </title></head><body><a href='p2'>2</a></body></html>",
            &page(),
        );
        assert_eq!(doc.title().as_deref(), Some("Listing"));
        assert!(doc.to_html().contains("href=\"https://example.com/articles/p2\""));
    }
}
