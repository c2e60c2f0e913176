//! Bookmark companion files: the readable page, thumbnail, ebook and the
//! archived copy.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tokio_util::io::ReaderStream;

use crate::auth::MaybeAccount;
use crate::domains::ArtifactKind;
use crate::ingest::ebook::image_type;
use crate::ingest::warc;
use crate::server::AppState;
use crate::server::response::{ApiError, StoreResultExt};
use crate::types::Bookmark;

const CACHE_CONTROL: &str = "public, max-age=86400";

pub fn files_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookmark/{id}/content", get(content))
        .route("/bookmark/{id}/thumb", get(thumbnail))
        .route("/bookmark/{id}/ebook", get(ebook))
        .route("/bookmark/{id}/archive", get(archive_root))
        .route("/bookmark/{id}/archive/{*path}", get(archive_file))
}

/// Loads the bookmark, refusing private ones to anonymous callers.
async fn visible_bookmark(
    state: &AppState,
    account: &MaybeAccount,
    id: i64,
) -> Result<Bookmark, ApiError> {
    let bookmark = state
        .deps
        .bookmarks()
        .get(id)
        .await
        .api_err("Bookmark not found")?;
    if !bookmark.public && account.0.is_none() {
        return Err(ApiError::unauthorized("This bookmark is private"));
    }
    Ok(bookmark)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn content(
    account: MaybeAccount,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let bookmark = visible_bookmark(&state, &account, id).await?;

    let body = if !bookmark.html.is_empty() {
        bookmark.html.clone()
    } else if !bookmark.content.is_empty() {
        bookmark
            .content
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| format!("<p>{}</p>", escape(p.trim())))
            .collect()
    } else {
        return Err(ApiError::not_found("This bookmark has no readable content"));
    };

    let page = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><header><h1>{title}</h1><p><a href=\"{url}\">{url}</a></p></header>\
         <article>{body}</article></body></html>",
        title = escape(&bookmark.title),
        url = escape(&bookmark.url),
    );
    Ok::<_, ApiError>(Html(page))
}

/// Serves a raw companion file with an ETag and a day of caching.
async fn serve_artifact(
    state: &AppState,
    headers: &HeaderMap,
    kind: ArtifactKind,
    bookmark: &Bookmark,
) -> Result<Response, ApiError> {
    let storage = state.deps.storage();
    let info = storage
        .stat(kind, bookmark.id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;
    let etag = format!("\"{}\"", info.etag);

    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"));

    let mut response = if matches {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let (body, content_type) = match kind {
            // Thumbnails are small and sniffed for their image type.
            ArtifactKind::Thumbnail => {
                let bytes = storage
                    .read(kind, bookmark.id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("File not found"))?;
                let mime = image_type(&bytes)
                    .map(|(mime, _)| mime)
                    .unwrap_or("application/octet-stream");
                (Body::from(bytes), mime)
            }
            ArtifactKind::Ebook | ArtifactKind::Archive => {
                let file = match tokio::fs::File::open(storage.path(kind, bookmark.id)).await {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(ApiError::not_found("File not found"));
                    }
                    Err(e) => return Err(crate::error::Error::Io(e).into()),
                };
                let mime = if kind == ArtifactKind::Ebook {
                    "application/epub+zip"
                } else {
                    "application/warc"
                };
                (Body::from_stream(ReaderStream::new(file)), mime)
            }
        };
        let mut response = Response::new(body);
        let out = response.headers_mut();
        out.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if kind != ArtifactKind::Thumbnail {
            out.insert(header::CONTENT_LENGTH, HeaderValue::from(info.len));
        }
        if kind == ArtifactKind::Ebook {
            let filename = bookmark
                .title
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == ' ' || c == '-' { c } else { '_' })
                .collect::<String>();
            if let Ok(value) =
                HeaderValue::from_str(&format!("attachment; filename=\"{}.epub\"", filename.trim()))
            {
                response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
            }
        }
        response
    };

    let out = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        out.insert(header::ETAG, value);
    }
    out.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    Ok(response)
}

async fn thumbnail(
    account: MaybeAccount,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let bookmark = visible_bookmark(&state, &account, id).await?;
    serve_artifact(&state, &headers, ArtifactKind::Thumbnail, &bookmark).await
}

async fn ebook(
    account: MaybeAccount,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let bookmark = visible_bookmark(&state, &account, id).await?;
    serve_artifact(&state, &headers, ArtifactKind::Ebook, &bookmark).await
}

async fn archived(state: &AppState, bookmark: &Bookmark, target: Option<String>) -> Result<Response, ApiError> {
    let path = state.deps.storage().path(ArtifactKind::Archive, bookmark.id);
    if !path.is_file() {
        return Err(ApiError::not_found("This bookmark has no archive"));
    }

    let found = tokio::task::spawn_blocking(move || warc::find_response(&path, target.as_deref()))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??
        .ok_or_else(|| ApiError::not_found("Resource not found in archive"))?;

    let content_type = HeaderValue::from_str(&found.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let mut response = Response::new(Body::from(found.body));
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    Ok(response)
}

async fn archive_root(
    account: MaybeAccount,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let bookmark = visible_bookmark(&state, &account, id).await?;
    archived(&state, &bookmark, None).await
}

async fn archive_file(
    account: MaybeAccount,
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(i64, String)>,
) -> Result<Response, ApiError> {
    let bookmark = visible_bookmark(&state, &account, id).await?;
    archived(&state, &bookmark, Some(path)).await
}
