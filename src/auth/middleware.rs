use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::Error;
use crate::server::AppState;
use crate::types::Account;

/// Cookie the web UI keeps its token in.
pub const TOKEN_COOKIE: &str = "token";

/// The caller's account, or `None` for anonymous requests. Bad tokens are
/// treated as anonymous.
pub struct MaybeAccount(pub Option<Account>);

/// Extractor that requires a logged-in account.
pub struct RequireUser(pub Account);

/// Extractor that requires a logged-in owner.
pub struct RequireAdmin(pub Account);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "ok": false, "message": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"shiori\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeAccount {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(account) => Ok(MaybeAccount(Some(account))),
            Err(AuthError::InternalError) => Err(AuthError::InternalError),
            Err(_) => Ok(MaybeAccount(None)),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(RequireUser)
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let account = authenticate(parts, state).await?;

        if !account.owner {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(account))
    }
}

/// Token from `Authorization: Bearer`, falling back to the `token` cookie.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| {
            let (scheme, token) = h.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

async fn authenticate(parts: &Parts, state: &Arc<AppState>) -> Result<Account, AuthError> {
    let deps = &state.deps;

    if let Some(token) = bearer_token(&parts.headers) {
        return deps.auth().check_token(&token).await.map_err(|e| match e {
            Error::TokenExpired => AuthError::TokenExpired,
            Error::Token(_) | Error::Unauthorized => AuthError::InvalidToken,
            other => {
                tracing::error!("Failed to resolve token: {other}");
                AuthError::InternalError
            }
        });
    }

    if let Some(sso) = &deps.sso {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(username) = sso.identity(remote, &parts.headers) {
            return match deps.auth().sso_account(&username).await {
                Ok(Some(account)) => Ok(account),
                Ok(None) => {
                    tracing::warn!(username, "SSO proxy asserted an unknown account");
                    Err(AuthError::InvalidToken)
                }
                Err(e) => {
                    tracing::error!("Failed to look up SSO account: {e}");
                    Err(AuthError::InternalError)
                }
            };
        }
    }

    Err(AuthError::MissingAuth)
}
