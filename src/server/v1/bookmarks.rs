use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{RequireAdmin, RequireUser};
use crate::domains::{BookmarkPatch, ListBookmarks};
use crate::ingest::{CacheRequest, IngestRequest};
use crate::server::AppState;
use crate::server::dto::{
    BulkTagsRequest, CreateBookmarkRequest, DeleteBookmarksRequest, ListBookmarksParams,
    UpdateBookmarkRequest, UpdateCacheRequest, tag_names,
};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{split_list, validate_ids, validate_url};
use crate::types::{BookmarkOrder, DeleteBookmarks};

fn parse_order(raw: Option<&str>) -> Result<BookmarkOrder, ApiError> {
    match raw.map(str::trim).unwrap_or_default() {
        "" | "added" => Ok(BookmarkOrder::LastAdded),
        "modified" => Ok(BookmarkOrder::LastModified),
        "id" => Ok(BookmarkOrder::Default),
        other => Err(ApiError::invalid(
            "order",
            format!("unknown order {other:?}, expected added, modified or id"),
        )),
    }
}

pub async fn list_bookmarks(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBookmarksParams>,
) -> impl IntoResponse {
    let mut excluded = split_list(params.exclude.as_deref());
    excluded.extend(split_list(params.excluded_tags.as_deref()));

    let query = ListBookmarks {
        keyword: params.keyword.unwrap_or_default(),
        tags: split_list(params.tags.as_deref()),
        excluded_tags: excluded,
        order: parse_order(params.order.as_deref())?,
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or_default(),
    };
    if query.page < 1 {
        return Err(ApiError::invalid("page", "page must be at least 1"));
    }
    if query.limit < 0 {
        return Err(ApiError::invalid("limit", "limit must not be negative"));
    }

    let list = state.deps.bookmarks().list(&query).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(list)))
}

pub async fn create_bookmark(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookmarkRequest>,
) -> impl IntoResponse {
    validate_url(&req.url)?;

    let bookmark = state
        .deps
        .bookmarks()
        .create(IngestRequest {
            url: req.url,
            title: req.title,
            excerpt: req.excerpt,
            tags: tag_names(req.tags),
            public: req.public,
            html: None,
            create_archive: req.create_archive,
            create_ebook: req.create_ebook,
            offline: req.offline,
        })
        .await
        .map_err(|e| match e {
            crate::error::Error::AlreadyExists => ApiError::conflict("Bookmark already exists"),
            other => other.into(),
        })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(bookmark))))
}

pub async fn get_bookmark(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let mut bookmark = state
        .deps
        .bookmarks()
        .get(id)
        .await
        .api_err("Bookmark not found")?;
    bookmark.content.clear();
    bookmark.html.clear();

    Ok::<_, ApiError>(Json(ApiResponse::success(bookmark)))
}

pub async fn update_bookmark(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateBookmarkRequest>,
) -> impl IntoResponse {
    if let Some(url) = &req.url {
        validate_url(url)?;
    }

    let mut bookmark = state
        .deps
        .bookmarks()
        .update(
            id,
            BookmarkPatch {
                url: req.url,
                title: req.title,
                excerpt: req.excerpt,
                public: req.public,
                tags: req.tags.map(tag_names),
            },
        )
        .await
        .map_err(|e| match e {
            crate::error::Error::AlreadyExists => {
                ApiError::conflict("Another bookmark already uses this URL")
            }
            other => other.into(),
        })?;
    bookmark.html.clear();

    Ok::<_, ApiError>(Json(ApiResponse::success(bookmark)))
}

/// `{ids:[..]}` deletes the listed bookmarks; `{truncate:true}` (owners
/// only) deletes all of them.
pub async fn delete_bookmarks(
    RequireUser(account): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteBookmarksRequest>,
) -> impl IntoResponse {
    let target = if req.truncate {
        if !account.owner {
            return Err(ApiError::forbidden("Admin access required"));
        }
        DeleteBookmarks::All
    } else {
        validate_ids("ids", &req.ids)?;
        DeleteBookmarks::Ids(req.ids)
    };

    let deleted = state.deps.bookmarks().delete(target).await?;
    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "deleted": deleted
    }))))
}

pub async fn delete_bookmark(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let bookmarks = state.deps.bookmarks();
    bookmarks.get(id).await.api_err("Bookmark not found")?;
    bookmarks.delete(DeleteBookmarks::Ids(vec![id])).await?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn readable(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let content = state
        .deps
        .bookmarks()
        .readable(id)
        .await
        .api_err("Bookmark not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(content)))
}

pub async fn bulk_update_tags(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkTagsRequest>,
) -> impl IntoResponse {
    validate_ids("bookmark_ids", &req.bookmark_ids)?;
    validate_ids("tag_ids", &req.tag_ids)?;

    state
        .deps
        .bookmarks()
        .bulk_update_tags(&req.bookmark_ids, &req.tag_ids)
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "bookmark_ids": req.bookmark_ids,
        "tag_ids": req.tag_ids,
    }))))
}

pub async fn update_cache(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateCacheRequest>,
) -> impl IntoResponse {
    validate_ids("ids", &req.ids)?;

    let report = state
        .deps
        .bookmarks()
        .update_cache(CacheRequest {
            ids: req.ids,
            keep_metadata: req.keep_metadata,
            create_archive: req.create_archive,
            create_ebook: req.create_ebook,
            skip_exist: req.skip_exist,
        })
        .await
        .api_err("No bookmarks found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_names() {
        assert_eq!(parse_order(None).unwrap(), BookmarkOrder::LastAdded);
        assert_eq!(parse_order(Some("modified")).unwrap(), BookmarkOrder::LastModified);
        assert_eq!(parse_order(Some("id")).unwrap(), BookmarkOrder::Default);
        assert!(parse_order(Some("random")).is_err());
    }
}
