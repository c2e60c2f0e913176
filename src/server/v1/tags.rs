use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{RequireAdmin, RequireUser};
use crate::server::AppState;
use crate::server::dto::{BookmarkTagRequest, ListTagsParams, TagNameRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::{ListTagsOptions, TagOrder};

pub async fn list_tags(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTagsParams>,
) -> impl IntoResponse {
    let tags = state
        .deps
        .tags()
        .list(&ListTagsOptions {
            with_bookmark_count: params.with_bookmark_count,
            bookmark_id: params.bookmark_id.unwrap_or_default(),
            order_by: TagOrder::Name,
            search: params.search.unwrap_or_default(),
        })
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tags)))
}

pub async fn create_tag(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TagNameRequest>,
) -> impl IntoResponse {
    let tag = state.deps.tags().create(&req.name).await?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(tag))))
}

pub async fn get_tag(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let tag = state.deps.tags().get(id).await.api_err("Tag not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(tag)))
}

pub async fn rename_tag(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<TagNameRequest>,
) -> impl IntoResponse {
    let tag = state
        .deps
        .tags()
        .rename(id, &req.name)
        .await
        .map_err(|e| match e {
            crate::error::Error::AlreadyExists => ApiError::conflict("Tag name already exists"),
            other => other.into(),
        })?;

    Ok::<_, ApiError>(Json(ApiResponse::success(tag)))
}

pub async fn delete_tag(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    state.deps.tags().delete(id).await?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_bookmark_tags(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let tags = state.deps.tags().for_bookmark(id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(tags)))
}

pub async fn add_bookmark_tag(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BookmarkTagRequest>,
) -> impl IntoResponse {
    state.deps.tags().add_to_bookmark(id, req.tag_id).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success("Tag added")))
}

pub async fn remove_bookmark_tag(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BookmarkTagRequest>,
) -> impl IntoResponse {
    state
        .deps
        .tags()
        .remove_from_bookmark(id, req.tag_id)
        .await?;
    Ok::<_, ApiError>(Json(ApiResponse::success("Tag removed")))
}
