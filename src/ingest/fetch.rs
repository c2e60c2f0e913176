use std::time::Duration;

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, redirect};

use crate::error::{Error, Result};

/// Default per-request timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Bodies larger than this are rejected.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
const MAX_REDIRECTS: usize = 10;
const USER_AGENT_STRING: &str = concat!(
    "Mozilla/5.0 (compatible; Shiori/",
    env!("CARGO_PKG_VERSION"),
    "; +https://github.com/go-shiori/shiori)"
);

/// A fetched HTTP response, kept whole so it can be both extracted and
/// archived.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedPage {
    /// A page built from HTML a client already captured.
    #[must_use]
    pub fn from_html(url: &str, html: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Self {
            url: url.to_string(),
            status: 200,
            headers,
            body: Bytes::copy_from_slice(html.as_bytes()),
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    #[must_use]
    pub fn is_html(&self) -> bool {
        let ct = self.content_type().to_ascii_lowercase();
        ct.is_empty() || ct.contains("text/html") || ct.contains("application/xhtml")
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type().to_ascii_lowercase().starts_with("image/")
    }

    /// Body decoded with the charset from the Content-Type header, else a
    /// `<meta>` charset near the top of the document, else UTF-8. A byte
    /// order mark wins over both. Invalid sequences are replaced.
    #[must_use]
    pub fn text(&self) -> String {
        let encoding = charset_param(self.content_type())
            .or_else(|| self.is_html().then(|| meta_charset(&self.body)).flatten())
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        let (text, _, _) = encoding.decode(&self.body);
        text.into_owned()
    }
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    })
}

/// Charset declared by `<meta charset>` or `<meta http-equiv>` in the
/// first kilobyte.
fn meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(1024)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(|c| c == '"' || c == '\'')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

/// HTTP client shared by every ingestion task.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_body: usize,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self {
            client,
            max_body: MAX_BODY_BYTES,
        })
    }

    /// Caps the accepted body size.
    #[must_use]
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// GETs `url`, streaming the body chunk by chunk so oversized responses
    /// are abandoned early.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_STRING)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("GET {url} returned {status}")));
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();

        if let Some(len) = response.content_length() {
            if len > self.max_body as u64 {
                return Err(Error::Upstream(format!(
                    "GET {url}: body of {len} bytes exceeds the limit"
                )));
            }
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > self.max_body {
                return Err(Error::Upstream(format!(
                    "GET {url}: body exceeds {} bytes",
                    self.max_body
                )));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %final_url, bytes = body.len(), "Fetched page");

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            headers,
            body: body.freeze(),
        })
    }
}
