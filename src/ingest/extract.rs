//! Readable-article extraction.
//!
//! [`ReadabilityExtractor`] scores paragraph containers the way the classic
//! readability heuristics do, keeping every score in a side table keyed by
//! node id. The parsed tree is never mutated; the chosen subtree is written
//! out through a whitelisting serializer that also absolutizes links and
//! emits XHTML-safe markup, so the same HTML can go straight into an ebook.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::Result;

/// What an extractor pulls out of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub byline: String,
    pub excerpt: String,
    /// Plain text of the article, for full-text search.
    pub text_content: String,
    /// Cleaned article HTML for the reader view.
    pub content_html: String,
    pub image_url: String,
    pub favicon_url: String,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &str) -> Result<Extracted>;
}

const MIN_PARAGRAPH_CHARS: usize = 25;
const EXCERPT_CHARS: usize = 200;
const TEXT_WIDTH: usize = 100;

const UNLIKELY: &[&str] = &[
    "banner", "breadcrumb", "combx", "comment", "community", "cookie", "disqus", "extra", "footer",
    "header", "legends", "menu", "modal", "nav", "popup", "promo", "related", "remark", "replies",
    "rss", "share", "shoutbox", "sidebar", "skyscraper", "social", "sponsor", "subscribe", "tags",
    "tool", "widget", "advert",
];
const LIKELY: &[&str] = &["and", "article", "body", "column", "content", "main", "shadow", "post", "entry", "text"];
const POSITIVE: &[&str] = &[
    "article", "blog", "body", "content", "entry", "hentry", "h-entry", "main", "page", "post",
    "story", "text",
];
const NEGATIVE: &[&str] = &[
    "hidden", "banner", "combx", "comment", "com-", "contact", "foot", "footer", "footnote",
    "masthead", "media", "meta", "outbrain", "promo", "related", "scroll", "share", "shoutbox",
    "sidebar", "skyscraper", "sponsor", "shopping", "tags", "tool", "widget",
];

/// Elements dropped together with their content.
const DROPPED: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "button", "input", "select", "textarea",
    "nav", "aside", "footer", "svg", "canvas", "object", "embed", "link", "meta", "template",
    "head", "title",
];
const VOID: &[&str] = &["br", "hr", "img", "wbr", "source", "col", "area"];
const KEPT_ATTRIBUTES: &[&str] = &[
    "href", "src", "alt", "title", "width", "height", "colspan", "rowspan", "lang", "dir", "cite",
    "datetime",
];
const BLOCK_WRAPPERS: &[&str] = &["html", "body"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadabilityExtractor;

impl Extractor for ReadabilityExtractor {
    fn extract(&self, html: &str, page_url: &str) -> Result<Extracted> {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();

        let content_html = article_html(&document, base.as_ref());
        let text_content = html_to_text(&content_html);

        let excerpt = meta_content(&document, &["og:description", "twitter:description", "description"])
            .unwrap_or_else(|| first_paragraph(&content_html));

        Ok(Extracted {
            title: page_title(&document),
            byline: byline(&document),
            excerpt: truncate_chars(&collapse_whitespace(&excerpt), EXCERPT_CHARS),
            text_content,
            content_html,
            image_url: meta_content(&document, &["og:image", "og:image:url", "twitter:image"])
                .or_else(|| link_href(&document, "image_src"))
                .and_then(|src| absolutize(base.as_ref(), &src))
                .unwrap_or_default(),
            favicon_url: favicon(&document, base.as_ref()),
        })
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Url::parse(href).ok().map(String::from),
    }
}

/// First non-empty `content` among `<meta property|name=...>` keys.
fn meta_content(document: &Html, keys: &[&str]) -> Option<String> {
    let sel = selector("meta")?;
    keys.iter().find_map(|key| {
        document.select(&sel).find_map(|el| {
            let attr = el
                .value()
                .attr("property")
                .or_else(|| el.value().attr("name"))?;
            if !attr.eq_ignore_ascii_case(key) {
                return None;
            }
            let content = el.value().attr("content")?.trim();
            (!content.is_empty()).then(|| content.to_string())
        })
    })
}

fn link_href(document: &Html, rel: &str) -> Option<String> {
    let sel = selector("link[rel][href]")?;
    document.select(&sel).find_map(|el| {
        let rels = el.value().attr("rel")?.to_ascii_lowercase();
        rels.split_whitespace()
            .any(|r| r == rel)
            .then(|| el.value().attr("href").unwrap_or_default().to_string())
    })
}

fn page_title(document: &Html) -> String {
    if let Some(title) = meta_content(document, &["og:title", "twitter:title"]) {
        return collapse_whitespace(&title);
    }
    let from_tag = selector("title")
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());
    if let Some(title) = from_tag {
        return title;
    }
    selector("h1")
        .and_then(|sel| document.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

fn byline(document: &Html) -> String {
    if let Some(author) = meta_content(document, &["author", "article:author", "twitter:creator"]) {
        return author;
    }
    let Some(sel) = selector("[rel=author], [itemprop=author], .byline, .author") else {
        return String::new();
    };
    document
        .select(&sel)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty() && text.chars().count() < 100)
        .unwrap_or_default()
}

fn favicon(document: &Html, base: Option<&Url>) -> String {
    link_href(document, "icon")
        .or_else(|| link_href(document, "shortcut"))
        .or_else(|| link_href(document, "apple-touch-icon"))
        .or_else(|| Some("/favicon.ico".to_string()))
        .and_then(|href| absolutize(base, &href))
        .unwrap_or_default()
}

fn class_and_id(el: &ElementRef<'_>) -> String {
    let mut s = el.value().attr("class").unwrap_or_default().to_ascii_lowercase();
    s.push(' ');
    s.push_str(&el.value().attr("id").unwrap_or_default().to_ascii_lowercase());
    s
}

fn is_unlikely(el: &ElementRef<'_>) -> bool {
    let mut current = Some(*el);
    while let Some(node) = current {
        let name = node.value().name();
        if name == "body" {
            return false;
        }
        let marker = class_and_id(&node);
        if UNLIKELY.iter().any(|u| marker.contains(u)) && !LIKELY.iter().any(|l| marker.contains(l)) {
            return true;
        }
        if DROPPED.contains(&name) {
            return true;
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    false
}

fn class_weight(el: &ElementRef<'_>) -> f64 {
    let marker = class_and_id(el);
    let mut weight = 0.0;
    if NEGATIVE.iter().any(|n| marker.contains(n)) {
        weight -= 25.0;
    }
    if POSITIVE.iter().any(|p| marker.contains(p)) {
        weight += 25.0;
    }
    weight
}

fn base_score(el: &ElementRef<'_>) -> f64 {
    let tag = match el.value().name() {
        "article" => 10.0,
        "div" | "section" | "main" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    tag + class_weight(el)
}

fn text_len(el: &ElementRef<'_>) -> usize {
    el.text().map(|t| t.trim().chars().count()).sum()
}

fn link_density(el: &ElementRef<'_>) -> f64 {
    let total = text_len(el);
    if total == 0 {
        return 0.0;
    }
    let Some(sel) = selector("a") else {
        return 0.0;
    };
    let linked: usize = el.select(&sel).map(|a| text_len(&a)).sum();
    linked as f64 / total as f64
}

fn paragraph_score(el: &ElementRef<'_>) -> f64 {
    let text: String = el.text().collect();
    let len = text.trim().chars().count();
    1.0 + text.matches(',').count() as f64 + (len as f64 / 100.0).min(3.0)
}

/// Picks the best-scoring container plus related siblings and serializes
/// them.
fn article_html(document: &Html, base: Option<&Url>) -> String {
    let Some(paragraphs) = selector("p, pre, td") else {
        return String::new();
    };

    let mut scores = HashMap::new();
    for p in document.select(&paragraphs) {
        if text_len(&p) < MIN_PARAGRAPH_CHARS || is_unlikely(&p) {
            continue;
        }
        let score = paragraph_score(&p);

        let parent = p.parent().and_then(ElementRef::wrap);
        let grandparent = parent.and_then(|e| e.parent()).and_then(ElementRef::wrap);

        for (ancestor, share) in [(parent, 1.0), (grandparent, 0.5)] {
            if let Some(ancestor) = ancestor {
                let entry = scores
                    .entry(ancestor.id())
                    .or_insert_with(|| (ancestor, base_score(&ancestor)));
                entry.1 += score * share;
            }
        }
    }

    let top = scores
        .values()
        .map(|(el, score)| (*el, score * (1.0 - link_density(el))))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let mut out = String::new();
    match top {
        Some((top, top_score)) => {
            let threshold = (top_score * 0.2).max(10.0);
            let siblings: Vec<ElementRef<'_>> = match top.parent().and_then(ElementRef::wrap) {
                Some(parent) => parent.children().filter_map(ElementRef::wrap).collect(),
                None => vec![top],
            };
            for sibling in siblings {
                let keep = if sibling.id() == top.id() {
                    true
                } else if let Some((_, score)) = scores.get(&sibling.id()) {
                    score * (1.0 - link_density(&sibling)) >= threshold
                } else {
                    sibling.value().name() == "p"
                        && text_len(&sibling) > 80
                        && link_density(&sibling) < 0.25
                };
                if keep {
                    write_clean(sibling, base, &mut out);
                }
            }
        }
        None => {
            if let Some(body) = selector("body").and_then(|s| document.select(&s).next()) {
                write_clean(body, base, &mut out);
            }
        }
    }

    out
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Serializes `el` keeping only safe tags and attributes. Output is
/// well-formed XML.
pub(crate) fn write_clean(el: ElementRef<'_>, base: Option<&Url>, out: &mut String) {
    let name = el.value().name();
    if DROPPED.contains(&name) || name.contains(':') {
        return;
    }

    let wrapper = BLOCK_WRAPPERS.contains(&name);
    if !wrapper {
        out.push('<');
        out.push_str(name);
        for attr in KEPT_ATTRIBUTES {
            let Some(value) = el.value().attr(attr) else {
                continue;
            };
            let attr = *attr;
            let value = if attr == "href" || attr == "src" {
                match absolutize(base, value) {
                    Some(v) => v,
                    None => continue,
                }
            } else {
                value.to_string()
            };
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_attr(&value, out);
            out.push('"');
        }
        if VOID.contains(&name) {
            out.push_str("/>");
            return;
        }
        out.push('>');
    }

    for child in el.children() {
        match child.value() {
            Node::Text(text) => escape_text(text, out),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_clean(child, base, out);
                }
            }
            _ => {}
        }
    }

    if !wrapper {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

/// Plain text rendering of cleaned HTML, with blank lines squeezed out.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let text = match html2text::from_read(html.as_bytes(), TEXT_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {e}");
            return String::new();
        }
    };
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_paragraph(content_html: &str) -> String {
    let fragment = Html::parse_fragment(content_html);
    selector("p")
        .and_then(|sel| {
            fragment
                .select(&sel)
                .map(|p| collapse_whitespace(&p.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<!doctype html>
<html>
<head>
  <title>Fallback Title</title>
  <meta property="og:title" content="Understanding Ownership">
  <meta name="author" content="Ferris Crab">
  <meta property="og:image" content="/img/cover.png">
  <link rel="icon" href="/static/favicon.png">
</head>
<body>
  <nav class="menu"><a href="/">Home</a><a href="/about">About</a></nav>
  <div class="sidebar"><p>Subscribe to our newsletter, right now, please, it is great.</p></div>
  <article class="post-content">
    <h1>Understanding Ownership</h1>
    <p>Ownership is a set of rules that govern how a program manages memory, and it is central to the language.</p>
    <p>Each value has an owner, there can only be one owner at a time, and when the owner goes out of scope the value is dropped.</p>
    <p>Borrowing lets code refer to a value without taking ownership, see <a href="/docs/borrowing">the borrowing chapter</a> for details.</p>
    <script>trackReader();</script>
    <img src="diagram.png" alt="diagram" onload="x()">
  </article>
  <footer class="footer"><p>Copyright notice that is long enough to be a paragraph, surely.</p></footer>
</body>
</html>"#;

    fn extract() -> Extracted {
        ReadabilityExtractor
            .extract(ARTICLE, "https://blog.example/posts/ownership")
            .unwrap()
    }

    #[test]
    fn reads_metadata() {
        let e = extract();
        assert_eq!(e.title, "Understanding Ownership");
        assert_eq!(e.byline, "Ferris Crab");
        assert_eq!(e.image_url, "https://blog.example/img/cover.png");
        assert_eq!(e.favicon_url, "https://blog.example/static/favicon.png");
    }

    #[test]
    fn keeps_article_and_drops_chrome() {
        let e = extract();
        assert!(e.content_html.contains("Each value has an owner"));
        assert!(!e.content_html.contains("newsletter"));
        assert!(!e.content_html.contains("Copyright"));
        assert!(!e.content_html.contains("trackReader"));
        assert!(!e.content_html.contains("onload"));
        assert!(e
            .content_html
            .contains(r#"href="https://blog.example/docs/borrowing""#));
        assert!(e
            .content_html
            .contains(r#"<img src="https://blog.example/posts/diagram.png" alt="diagram"/>"#));
    }

    #[test]
    fn text_and_excerpt_come_from_the_article() {
        let e = extract();
        assert!(e.text_content.contains("Ownership is a set of rules"));
        assert!(!e.text_content.contains("newsletter"));
        assert!(e.excerpt.starts_with("Ownership is a set of rules"));
    }

    #[test]
    fn falls_back_to_title_tag_and_body() {
        let html = "<html><head><title> Plain   page </title></head><body><span>tiny</span></body></html>";
        let e = ReadabilityExtractor.extract(html, "https://x.example/").unwrap();
        assert_eq!(e.title, "Plain page");
        assert!(e.content_html.contains("<span>tiny</span>"));
        assert_eq!(e.favicon_url, "https://x.example/favicon.ico");
        assert!(e.image_url.is_empty());
    }

    #[test]
    fn serializer_escapes_text() {
        let html = "<html><body><p>a &lt; b &amp; c</p></body></html>";
        let e = ReadabilityExtractor.extract(html, "https://x.example/").unwrap();
        assert!(e.content_html.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn long_excerpts_are_truncated() {
        let long = "word ".repeat(100);
        assert!(truncate_chars(&long, 20).ends_with("..."));
        assert_eq!(truncate_chars("short", 20), "short");
    }
}
