//! Main-content extraction from rendered HTML pages
//!
//! A page's content region is the first match from an ordered list of
//! [`ContentSelector`] strategies, falling back to `<body>`. Non-content
//! elements are dropped before conversion to markdown.

use crate::convert::html_to_markdown;
use crate::urls::{in_scope, resolve_link};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Pages with less extracted text than this are treated as empty
pub const MIN_CONTENT_LENGTH: usize = 50;

/// Elements removed from the content region
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "iframe", "svg",
];

/// Elements serialized without a closing tag
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

static TITLE_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("title").ok());
static H1_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("h1").ok());
static LINK_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("a[href]").ok());

/// One strategy for locating the main content region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSelector {
    /// Element name, e.g. `main`
    Tag(&'static str),
    /// ARIA role attribute, e.g. `[role="main"]`
    Role(&'static str),
    /// Class name, e.g. `.content`
    Class(&'static str),
    /// Element id, e.g. `#content`
    Id(&'static str),
}

impl ContentSelector {
    /// CSS form of this strategy
    pub fn css(&self) -> String {
        match self {
            ContentSelector::Tag(tag) => (*tag).to_string(),
            ContentSelector::Role(role) => format!("[role=\"{}\"]", role),
            ContentSelector::Class(class) => format!(".{}", class),
            ContentSelector::Id(id) => format!("#{}", id),
        }
    }

    /// First element in the document matching this strategy
    pub fn find<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let selector = Selector::parse(&self.css()).ok()?;
        document.select(&selector).next()
    }
}

/// Content selectors in priority order
pub const DEFAULT_CONTENT_SELECTORS: &[ContentSelector] = &[
    ContentSelector::Tag("main"),
    ContentSelector::Tag("article"),
    ContentSelector::Role("main"),
    ContentSelector::Class("content"),
    ContentSelector::Class("main-content"),
    ContentSelector::Class("post-content"),
    ContentSelector::Class("documentation"),
    ContentSelector::Class("docs-content"),
    ContentSelector::Id("content"),
    ContentSelector::Class("markdown-body"),
    ContentSelector::Tag("body"),
];

/// Content pulled out of one rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub markdown: String,
    /// Normalized outbound links, in-scope only when a scope is given
    pub links: Vec<String>,
}

/// Extract title, main content and outbound links
pub fn extract_page(html: &str, page_url: &Url, scope: Option<&str>) -> ExtractedPage {
    let document = Html::parse_document(html);
    let title = page_title(&document, page_url);
    let markdown = main_content(&document, DEFAULT_CONTENT_SELECTORS)
        .map(|element| {
            let mut cleaned = String::new();
            serialize_children(element, &mut cleaned);
            html_to_markdown(&cleaned)
        })
        .unwrap_or_default();
    let links = extract_links(&document, page_url, scope);

    ExtractedPage {
        title,
        markdown,
        links,
    }
}

/// First content region matched by `selectors`
pub fn main_content<'a>(
    document: &'a Html,
    selectors: &[ContentSelector],
) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| s.find(document))
}

/// Page title from `<title>`, then the first `<h1>`, then the URL
pub fn page_title(document: &Html, page_url: &Url) -> String {
    let text_of = |selector: &Option<Selector>| {
        selector
            .as_ref()
            .and_then(|s| document.select(s).next())
            .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
    };

    text_of(&TITLE_SELECTOR)
        .or_else(|| text_of(&H1_SELECTOR))
        .or_else(|| {
            page_url
                .path_segments()
                .and_then(|mut segs| segs.rfind(|s| !s.is_empty()))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Untitled".to_string())
}

/// All `<a href>` targets, resolved, normalized and de-duplicated
pub fn extract_links(document: &Html, base: &Url, scope: Option<&str>) -> Vec<String> {
    let Some(selector) = LINK_SELECTOR.as_ref() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(base, href))
        .filter(|link| scope.map_or(true, |s| in_scope(link, s)))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

/// Whether a page title looks like an error page served with HTTP 200
pub fn is_error_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    if lower.contains("404") || lower.contains("not found") {
        return true;
    }
    // "Error", "Error 500", "Error | Site" but not "Error handling"
    let head = lower
        .split(['|', '-', '–', ':'])
        .next()
        .unwrap_or("")
        .trim();
    head == "error"
        || head
            .strip_prefix("error ")
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Reason to drop a page from the corpus, if any
pub fn rejection_reason(title: &str, markdown: &str) -> Option<String> {
    if is_error_title(title) {
        return Some(format!("error page title '{}'", title));
    }
    let length = markdown.trim().chars().count();
    if length < MIN_CONTENT_LENGTH {
        return Some(format!(
            "content too short ({} < {} characters)",
            length, MIN_CONTENT_LENGTH
        ));
    }
    None
}

/// Re-serialize the children of `element`, dropping non-content elements
fn serialize_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => escape_text(text, out),
            Node::Element(el) => {
                let name = el.name();
                if STRIPPED_TAGS.contains(&name) {
                    continue;
                }
                out.push('<');
                out.push_str(name);
                for (attr, value) in el.attrs() {
                    out.push(' ');
                    out.push_str(attr);
                    out.push_str("=\"");
                    out.push_str(&value.replace('"', "&quot;"));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    serialize_children(child_el, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            _ => {}
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
