use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{CreateAccountRequest, ListAccountsParams, UpdateAccountRequest};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::types::{AccountUpdate, ListAccountsOptions, NewAccount};

pub async fn list_accounts(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListAccountsParams>,
) -> impl IntoResponse {
    let accounts = state
        .deps
        .accounts()
        .list(&ListAccountsOptions {
            keyword: params.keyword.unwrap_or_default(),
            username: params.username.unwrap_or_default(),
            owner_only: params.owner,
        })
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(accounts)))
}

pub async fn create_account(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let account = state
        .deps
        .accounts()
        .create(NewAccount {
            username: req.username,
            password: req.password,
            owner: req.owner,
            config: req.config.unwrap_or_default(),
        })
        .await
        .map_err(|e| match e {
            crate::error::Error::AlreadyExists => ApiError::conflict("Username already exists"),
            other => other.into(),
        })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(account))))
}

pub async fn get_account(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let account = state
        .deps
        .accounts()
        .get(id)
        .await
        .api_err("Account not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(account)))
}

pub async fn update_account(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAccountRequest>,
) -> impl IntoResponse {
    let account = state
        .deps
        .accounts()
        .update(
            id,
            AccountUpdate {
                username: req.username,
                password: req.password,
                owner: req.owner,
                config: req.config,
            },
        )
        .await
        .api_err("Account not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(account)))
}

pub async fn delete_account(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if admin.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    state
        .deps
        .accounts()
        .delete(id)
        .await
        .api_err("Account not found")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
