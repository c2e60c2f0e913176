//! Bookmark file formats: Netscape HTML in both directions and Pocket's
//! CSV or HTML export on the way in.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use super::pipeline::sanitize_title;
use super::url::canonicalize;
use crate::error::{Error, Result};
use crate::types::{Bookmark, normalize_tag_name};

/// One entry parsed from an import file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedBookmark {
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub added_at: Option<DateTime<Utc>>,
}

/// A line that could not be imported, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedImport {
    pub bookmarks: Vec<ImportedBookmark>,
    pub skipped: Vec<SkippedEntry>,
}

impl ParsedImport {
    fn push(&mut self, seen: &mut HashSet<String>, raw_url: &str, mut entry: ImportedBookmark) {
        match canonicalize(raw_url) {
            Err(e) => self.skipped.push(SkippedEntry {
                url: raw_url.to_string(),
                reason: e.to_string(),
            }),
            Ok(url) if !seen.insert(url.clone()) => self.skipped.push(SkippedEntry {
                url,
                reason: "URL already exists".into(),
            }),
            Ok(url) => {
                entry.title = clean_title(&entry.title, &url);
                entry.url = url;
                let mut tags = Vec::new();
                for tag in entry.tags.iter().map(|t| normalize_tag_name(t)) {
                    if !tag.is_empty() && !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
                entry.tags = tags;
                self.bookmarks.push(entry);
            }
        }
    }
}

/// Collapses whitespace, then cleans the title the way saved bookmarks are.
#[must_use]
pub fn clean_title(title: &str, url: &str) -> String {
    sanitize_title(&title.split_whitespace().collect::<Vec<_>>().join(" "), url)
}

fn unix_time(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split([',', '|'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Internal(format!("bad selector {css:?}: {e}")))
}

/// Name of the closest enclosing `<H3>` folder, if any.
fn folder_name(anchor: &ElementRef<'_>) -> Option<String> {
    let mut current = anchor.parent().and_then(ElementRef::wrap);
    while let Some(node) = current {
        if node.value().name() == "dl" {
            // html5ever nests the folder's DL inside its DT, next to the H3.
            let holder = node.parent().and_then(ElementRef::wrap);
            let heading = holder
                .into_iter()
                .flat_map(|h| h.children().filter_map(ElementRef::wrap).collect::<Vec<_>>())
                .chain(node.prev_siblings().filter_map(ElementRef::wrap))
                .find_map(|el| match el.value().name() {
                    "h3" => Some(el),
                    "dt" => el
                        .children()
                        .filter_map(ElementRef::wrap)
                        .find(|c| c.value().name() == "h3"),
                    _ => None,
                });
            if let Some(h3) = heading {
                let name = h3.text().collect::<String>().trim().to_string();
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    None
}

/// Description from the `<DD>` following the anchor's `<DT>`.
fn description(anchor: &ElementRef<'_>) -> String {
    let Some(dt) = anchor.parent().and_then(ElementRef::wrap) else {
        return String::new();
    };
    let dd = dt
        .children()
        .filter_map(ElementRef::wrap)
        .chain(dt.next_siblings().filter_map(ElementRef::wrap).take(1))
        .find(|el| el.value().name() == "dd");
    dd.and_then(|dd| {
        dd.children()
            .find_map(|c| c.value().as_text().map(|t| t.trim().to_string()))
    })
    .unwrap_or_default()
}

/// Parses a Netscape bookmark file. With `generate_tag`, each bookmark is
/// also tagged with the name of its folder.
pub fn parse_netscape(html: &str, generate_tag: bool) -> Result<ParsedImport> {
    let document = Html::parse_document(html);
    let anchors = sel("a[href]")?;
    let mut parsed = ParsedImport::default();
    let mut seen = HashSet::new();

    for a in document.select(&anchors) {
        let href = a.value().attr("href").unwrap_or_default();
        let mut tags = split_tags(a.value().attr("tags").unwrap_or_default());
        if generate_tag {
            if let Some(folder) = folder_name(&a) {
                tags.push(folder);
            }
        }
        let entry = ImportedBookmark {
            title: a.text().collect(),
            excerpt: description(&a),
            tags,
            added_at: a.value().attr("add_date").and_then(unix_time),
            ..ImportedBookmark::default()
        };
        parsed.push(&mut seen, href, entry);
    }

    Ok(parsed)
}

/// Header of Pocket's CSV export.
pub const POCKET_CSV_HEADER: [&str; 6] = ["title", "url", "time_added", "cursor", "tags", "status"];

/// Parses Pocket's CSV export. Tags are `|` separated.
pub fn parse_pocket_csv(data: &str) -> Result<ParsedImport> {
    let mut rows = parse_csv(data).into_iter();
    let header = rows.next().unwrap_or_default();
    let header: Vec<&str> = header.iter().map(|h| h.trim()).collect();
    if header != POCKET_CSV_HEADER {
        return Err(Error::validation(
            "file",
            format!("invalid CSV header, expected: {}", POCKET_CSV_HEADER.join(",")),
        ));
    }

    let mut parsed = ParsedImport::default();
    let mut seen = HashSet::new();
    for row in rows {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let col = |i: usize| row.get(i).map(String::as_str).unwrap_or_default();
        let Some(added_at) = unix_time(col(2)) else {
            parsed.skipped.push(SkippedEntry {
                url: col(1).to_string(),
                reason: "invalid time added".into(),
            });
            continue;
        };
        let entry = ImportedBookmark {
            title: col(0).to_string(),
            tags: split_tags(col(4)),
            added_at: Some(added_at),
            ..ImportedBookmark::default()
        };
        parsed.push(&mut seen, col(1), entry);
    }
    Ok(parsed)
}

/// Parses Pocket's older HTML export (`<a href time_added tags>`).
pub fn parse_pocket_html(html: &str) -> Result<ParsedImport> {
    let document = Html::parse_document(html);
    let anchors = sel("a[href]")?;
    let mut parsed = ParsedImport::default();
    let mut seen = HashSet::new();

    for a in document.select(&anchors) {
        let entry = ImportedBookmark {
            title: a.text().collect(),
            tags: split_tags(a.value().attr("tags").unwrap_or_default()),
            added_at: a.value().attr("time_added").and_then(unix_time),
            ..ImportedBookmark::default()
        };
        parsed.push(&mut seen, a.value().attr("href").unwrap_or_default(), entry);
    }
    Ok(parsed)
}

/// RFC 4180 CSV: quoted fields, doubled quotes, CRLF or LF line ends.
fn parse_csv(data: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders bookmarks as a `NETSCAPE-Bookmark-file-1` document.
#[must_use]
pub fn export_netscape(bookmarks: &[Bookmark]) -> String {
    let mut out = String::from(
        "<!DOCTYPE NETSCAPE-Bookmark-file-1>\n\
         <META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=UTF-8\">\n\
         <TITLE>Bookmarks</TITLE>\n\
         <H1>Bookmarks</H1>\n\
         <DL><p>\n",
    );

    for bookmark in bookmarks {
        let tags = bookmark
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(
            out,
            "    <DT><A HREF=\"{}\" ADD_DATE=\"{}\" LAST_MODIFIED=\"{}\" TAGS=\"{}\">{}</A>",
            html_escape(&bookmark.url),
            bookmark.created_at.timestamp(),
            bookmark.modified_at.timestamp(),
            html_escape(&tags),
            html_escape(&clean_title(&bookmark.title, &bookmark.url)),
        );
        if !bookmark.excerpt.is_empty() {
            let _ = writeln!(out, "    <DD>{}", html_escape(&bookmark.excerpt));
        }
    }

    out.push_str("</DL><p>\n");
    out
}
