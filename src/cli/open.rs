use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::indices::parse_indices;
use super::output::confirm_action;
use super::serve::shutdown_signal;
use crate::domains::{ArtifactKind, Dependencies};
use crate::ingest::warc;
use crate::types::{Bookmark, GetBookmarksOptions};

const SEPARATOR_WIDTH: usize = 80;

/// How `open` presents the selected bookmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Browser,
    /// Print the readable text in the terminal.
    TextCache,
    /// Serve the WARC archive locally on this port (0 picks one).
    Archive { port: u16 },
}

pub async fn run_open(
    deps: &Dependencies,
    indices: Vec<String>,
    mode: OpenMode,
    yes: bool,
) -> anyhow::Result<()> {
    let ids = parse_indices(&indices)?;
    if ids.len() > 1 && matches!(mode, OpenMode::Archive { .. }) {
        bail!("In archive mode, only one bookmark allowed");
    }
    if ids.is_empty() && !confirm_action("Open ALL bookmarks?", yes)? {
        return Ok(());
    }

    let opts = GetBookmarksOptions {
        with_content: mode == OpenMode::TextCache,
        ids: ids.clone(),
        ..GetBookmarksOptions::default()
    };
    let bookmarks = deps.bookmarks().find(&opts).await?;
    if bookmarks.is_empty() {
        if ids.is_empty() {
            bail!("No bookmarks saved yet");
        }
        bail!("No matching index found");
    }

    match mode {
        OpenMode::Browser => open_in_browser(&bookmarks).await,
        OpenMode::TextCache => print_text_cache(&bookmarks),
        OpenMode::Archive { port } => {
            let path = deps.storage().path(ArtifactKind::Archive, bookmarks[0].id);
            serve_archive(path, port).await
        }
    }
}

async fn open_in_browser(bookmarks: &[Bookmark]) -> anyhow::Result<()> {
    let mut failed = 0;
    for bookmark in bookmarks {
        let url = bookmark.url.clone();
        let opened = tokio::task::spawn_blocking(move || open::that(url)).await?;
        if let Err(e) = opened {
            eprintln!("Failed to open {}: {e}", bookmark.url);
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("Failed to open {failed} bookmark(s)");
    }
    Ok(())
}

fn print_text_cache(bookmarks: &[Bookmark]) -> anyhow::Result<()> {
    let mut missing = 0;
    for bookmark in bookmarks {
        println!("{}. {}", bookmark.id, bookmark.title);
        println!();
        if bookmark.content.trim().is_empty() {
            eprintln!("This bookmark doesn't have any cached content");
            missing += 1;
        } else {
            println!("{}", collapse_whitespace(&bookmark.content));
        }
        println!();
        println!("{}", "=".repeat(SEPARATOR_WIDTH));
        println!();
    }
    if missing > 0 {
        bail!("{missing} bookmark(s) have no cached content");
    }
    Ok(())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Serves one archive on localhost until interrupted and points the
/// browser at it.
async fn serve_archive(path: PathBuf, port: u16) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("This bookmark has no archive");
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("Failed to serve archive")?;
    let address = format!("http://localhost:{}", listener.local_addr()?.port());
    println!("Archive served in {address}");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match tokio::task::spawn_blocking(move || open::that(address)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Failed to open browser: {e}"),
            Err(e) => tracing::warn!("Browser task failed: {e}"),
        }
    });

    let app = Router::new().fallback(archived_resource).with_state(path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn archived_resource(State(path): State<PathBuf>, request: Request) -> Response {
    let target = request.uri().path().trim_start_matches('/').to_string();
    let target = (!target.is_empty()).then_some(target);

    let found = tokio::task::spawn_blocking(move || warc::find_response(&path, target.as_deref())).await;
    match found {
        Ok(Ok(Some(found))) => {
            let content_type = HeaderValue::from_str(&found.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let mut response = Response::new(Body::from(found.body));
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
            response
        }
        Ok(Ok(None)) => (StatusCode::NOT_FOUND, "Resource not found in archive").into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_text_is_flattened() {
        assert_eq!(collapse_whitespace("  one\n\ntwo\tthree  "), "one two three");
    }
}
