//! Minimal WARC/1.0 archives.
//!
//! An archive is a `warcinfo` record followed by one `response` record per
//! captured resource, each record compressed as its own gzip member.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use uuid::Uuid;

use super::fetch::FetchedPage;
use crate::error::{Error, Result};

const WARC_VERSION: &str = "WARC/1.0";
const CRLF: &str = "\r\n";

pub trait Archiver: Send + Sync {
    /// Value stored in the bookmark's `archiver` column.
    fn name(&self) -> &'static str;
    /// Writes an archive of `pages` to `dest`, replacing any previous one.
    fn archive(&self, pages: &[FetchedPage], dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WarcArchiver;

impl Archiver for WarcArchiver {
    fn name(&self) -> &'static str {
        "warc"
    }

    fn archive(&self, pages: &[FetchedPage], dest: &Path) -> Result<()> {
        if pages.is_empty() {
            return Err(Error::Internal("nothing to archive".into()));
        }

        let tmp = dest.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            write_record(&mut file, &warcinfo_record())?;
            for page in pages {
                write_record(&mut file, &response_record(page))?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp, dest)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    pub headers: Vec<(String, String)>,
    pub block: Bytes,
}

impl WarcRecord {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        self.header("WARC-Type").unwrap_or_default()
    }

    #[must_use]
    pub fn target_uri(&self) -> &str {
        self.header("WARC-Target-URI").unwrap_or_default()
    }

    /// Splits a `response` record's block into status, content type and
    /// body.
    pub fn http_response(&self) -> Result<ArchivedResponse> {
        let block = &self.block[..];
        let split = find_subslice(block, b"\r\n\r\n")
            .ok_or_else(|| Error::Internal("archived response has no header terminator".into()))?;
        let head = String::from_utf8_lossy(&block[..split]);
        let mut lines = head.split("\r\n");

        let status = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(200);

        let content_type = lines
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(ArchivedResponse {
            status,
            content_type,
            body: self.block.slice(split + 4..),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

fn warc_date() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

fn warcinfo_record() -> WarcRecord {
    let fields = format!(
        "software: shiori/{}{CRLF}format: WARC File Format 1.0{CRLF}",
        env!("CARGO_PKG_VERSION")
    );
    WarcRecord {
        headers: vec![
            ("WARC-Type".into(), "warcinfo".into()),
            ("WARC-Date".into(), warc_date()),
            ("WARC-Record-ID".into(), record_id()),
            ("Content-Type".into(), "application/warc-fields".into()),
        ],
        block: Bytes::from(fields),
    }
}

fn response_record(page: &FetchedPage) -> WarcRecord {
    let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::OK);
    let mut block = format!(
        "HTTP/1.1 {} {}{CRLF}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    let content_type = page.content_type();
    if !content_type.is_empty() {
        block.push_str(&format!("Content-Type: {content_type}{CRLF}"));
    }
    block.push_str(&format!("Content-Length: {}{CRLF}{CRLF}", page.body.len()));

    let mut bytes = block.into_bytes();
    bytes.extend_from_slice(&page.body);

    WarcRecord {
        headers: vec![
            ("WARC-Type".into(), "response".into()),
            ("WARC-Target-URI".into(), page.url.clone()),
            ("WARC-Date".into(), warc_date()),
            ("WARC-Record-ID".into(), record_id()),
            ("Content-Type".into(), "application/http; msgtype=response".into()),
        ],
        block: Bytes::from(bytes),
    }
}

fn write_record<W: Write>(out: &mut W, record: &WarcRecord) -> Result<()> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

    let mut head = format!("{WARC_VERSION}{CRLF}");
    for (name, value) in &record.headers {
        head.push_str(&format!("{name}: {value}{CRLF}"));
    }
    head.push_str(&format!("Content-Length: {}{CRLF}{CRLF}", record.block.len()));

    encoder.write_all(head.as_bytes())?;
    encoder.write_all(&record.block)?;
    encoder.write_all(format!("{CRLF}{CRLF}").as_bytes())?;

    out.write_all(&encoder.finish()?)?;
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads every record of the archive at `path`.
pub fn read_records(path: &Path) -> Result<Vec<WarcRecord>> {
    let mut data = Vec::new();
    MultiGzDecoder::new(BufReader::new(File::open(path)?)).read_to_end(&mut data)?;
    parse_records(Bytes::from(data))
}

fn parse_records(data: Bytes) -> Result<Vec<WarcRecord>> {
    let malformed = |what: &str| Error::Internal(format!("malformed WARC archive: {what}"));
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.iter().all(u8::is_ascii_whitespace) {
            break;
        }

        let head_len = find_subslice(rest, b"\r\n\r\n").ok_or_else(|| malformed("header"))?;
        let head = String::from_utf8_lossy(&rest[..head_len]);
        let mut lines = head.split("\r\n");
        if lines.next().map(str::trim) != Some(WARC_VERSION) {
            return Err(malformed("version line"));
        }

        let mut headers = Vec::new();
        let mut length = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("Content-Length") {
                length = value.parse::<usize>().ok();
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }
        let length = length.ok_or_else(|| malformed("content length"))?;

        let start = pos + head_len + 4;
        let end = start + length;
        if end > data.len() {
            return Err(malformed("truncated block"));
        }
        records.push(WarcRecord {
            headers,
            block: data.slice(start..end),
        });
        pos = end + 4;
    }

    Ok(records)
}

/// Finds the archived response for `target`. `None` (or an empty target)
/// selects the first response, which is the bookmarked page itself.
pub fn find_response(path: &Path, target: Option<&str>) -> Result<Option<ArchivedResponse>> {
    let records = read_records(path)?;
    let target = target.map(|t| t.trim_start_matches('/')).filter(|t| !t.is_empty());

    let record = records.iter().filter(|r| r.record_type() == "response").find(|r| {
        match target {
            None => true,
            Some(t) => {
                let uri = r.target_uri();
                uri == t || uri.trim_end_matches('/').ends_with(t.trim_end_matches('/'))
            }
        }
    });

    record.map(WarcRecord::http_response).transpose()
}

#[cfg(test)]
mod tests {
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use tempfile::TempDir;

    use super::*;

    fn image_page() -> FetchedPage {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        FetchedPage {
            url: "https://example.com/cover.png".into(),
            status: 200,
            headers,
            body: Bytes::from_static(&[0x89, b'P', b'N', b'G']),
        }
    }

    #[test]
    fn archives_can_be_read_back() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1");
        let page = FetchedPage::from_html("https://example.com/a", "<h1>Archived</h1>");

        WarcArchiver.archive(&[page, image_page()], &dest).unwrap();
        assert!(!dest.with_extension("tmp").exists());

        let records = read_records(&dest).unwrap();
        let types: Vec<_> = records.iter().map(WarcRecord::record_type).collect();
        assert_eq!(types, vec!["warcinfo", "response", "response"]);
        assert_eq!(records[1].target_uri(), "https://example.com/a");

        let main = find_response(&dest, None).unwrap().unwrap();
        assert_eq!(main.status, 200);
        assert!(main.content_type.starts_with("text/html"));
        assert_eq!(&main.body[..], b"<h1>Archived</h1>");

        let image = find_response(&dest, Some("/cover.png")).unwrap().unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.body.len(), 4);

        assert!(find_response(&dest, Some("missing.css")).unwrap().is_none());
    }

    #[test]
    fn empty_capture_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(WarcArchiver.archive(&[], &dir.path().join("x")).is_err());
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let err = parse_records(Bytes::from_static(b"HTTP/1.1 200 OK\r\n\r\n")).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
