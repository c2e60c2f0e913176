use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::{RequireUser, TOKEN_COOKIE};
use crate::domains::{LoginRequest as Credentials, SelfUpdate};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, UpdateSelfRequest};
use crate::server::response::{ApiError, ApiResponse};

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    if req.username.trim().is_empty() {
        return Err(ApiError::invalid("username", "username is required"));
    }
    if req.password.is_empty() {
        return Err(ApiError::invalid("password", "password is required"));
    }

    let response = state
        .deps
        .auth()
        .login(&Credentials {
            username: req.username,
            password: req.password,
            remember_me: req.remember_me,
        })
        .await?;

    tracing::info!(username = %response.account.username, "Login");

    let cookie = format!(
        "{TOKEN_COOKIE}={}; Path={}; HttpOnly; SameSite=Lax",
        response.token, state.deps.config.http.root_path
    );
    Ok::<_, ApiError>((
        [(axum::http::header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(response)),
    ))
}

pub async fn refresh(
    RequireUser(account): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let response = state.deps.auth().refresh(account)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

pub async fn me(RequireUser(account): RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(account))
}

pub async fn update_self(
    RequireUser(account): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSelfRequest>,
) -> impl IntoResponse {
    if account.id == crate::domains::BOOTSTRAP_ACCOUNT_ID {
        return Err(ApiError::forbidden(
            "The default account cannot be changed; create an account first",
        ));
    }

    let updated = state
        .deps
        .accounts()
        .update_self(
            account.id,
            SelfUpdate {
                old_password: req.old_password,
                new_password: req.new_password,
                config: req.config,
            },
        )
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(updated)))
}

/// Tokens are stateless; the client drops its copy.
pub async fn logout(_account: RequireUser) -> impl IntoResponse {
    (
        [(
            axum::http::header::SET_COOKIE,
            format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0"),
        )],
        Json(ApiResponse::success("Logged out")),
    )
}
