//! Endpoints used by the browser extension. They share the ingestion
//! pipeline with the v1 API but match bookmarks by URL.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crate::auth::RequireUser;
use crate::ingest::IngestRequest;
use crate::server::AppState;
use crate::server::dto::{ExtBookmarkRequest, ExtDeleteRequest, tag_names};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::validate_url;

pub fn ext_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/bookmarks/ext",
        post(save_from_extension).delete(delete_from_extension),
    )
}

async fn save_from_extension(
    RequireUser(account): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtBookmarkRequest>,
) -> impl IntoResponse {
    validate_url(&req.url)?;

    let config = &account.config;
    let mut bookmark = state
        .deps
        .ingest()
        .ingest_extension(IngestRequest {
            url: req.url,
            title: req.title,
            excerpt: req.excerpt,
            tags: tag_names(req.tags),
            public: config.make_public,
            html: req.html,
            create_archive: config.use_archive,
            create_ebook: config.create_ebook,
            offline: false,
        })
        .await?;
    bookmark.html.clear();

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(bookmark))))
}

async fn delete_from_extension(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtDeleteRequest>,
) -> impl IntoResponse {
    validate_url(&req.url)?;

    state
        .deps
        .bookmarks()
        .delete_by_url(&req.url)
        .await
        .api_err("Bookmark not found")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
