use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{Error, Result as StoreResult};

/// The `{ok, message, error_params?}` envelope every JSON endpoint answers
/// with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub message: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_params: Option<BTreeMap<String, String>>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(message: T) -> Self {
        Self {
            ok: true,
            message,
            error_params: None,
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub params: Option<BTreeMap<String, String>>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            params: None,
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 400 naming the offending field.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut params = BTreeMap::new();
        params.insert(field.into(), message.clone());
        Self {
            params: Some(params),
            ..Self::bad_request(message)
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation { field, message } => ApiError::invalid(field, message),
            Error::NotFound => ApiError::not_found("Not found"),
            Error::BookmarkNotFound => ApiError::not_found("Bookmark not found"),
            Error::TagNotFound => ApiError::not_found("Tag not found"),
            Error::AlreadyExists => ApiError::conflict("Already exists"),
            Error::Unauthorized | Error::Token(_) => ApiError::unauthorized("Unauthorized"),
            Error::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            Error::TokenExpired => ApiError::unauthorized("Token expired"),
            Error::Forbidden => ApiError::forbidden("Forbidden"),
            Error::Upstream(message) => ApiError::new(StatusCode::BAD_GATEWAY, message),
            Error::Http(e) => {
                tracing::warn!("Upstream request failed: {e}");
                ApiError::new(StatusCode::BAD_GATEWAY, "Failed to reach the remote site")
            }
            other => {
                tracing::error!("Request failed: {other}");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            ok: false,
            message: self.message,
            error_params: self.params,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Extension trait for converting store results to API errors with a custom
/// message for the not-found case.
pub trait StoreResultExt<T> {
    fn api_err(self, not_found: &'static str) -> Result<T, ApiError>;
}

impl<T> StoreResultExt<T> for StoreResult<T> {
    fn api_err(self, not_found: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| {
            if e.is_not_found() {
                ApiError::not_found(not_found)
            } else {
                ApiError::from(e)
            }
        })
    }
}

/// Extension for Option types from store operations.
pub trait StoreOptionExt<T> {
    fn or_not_found(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T> StoreOptionExt<T> for Option<T> {
    fn or_not_found(self, message: &'static str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(message))
    }
}
