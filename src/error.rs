use thiserror::Error;

use crate::store::SchemaVersion;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("not found")]
    NotFound,

    #[error("bookmark not found")]
    BookmarkNotFound,

    #[error("tag not found")]
    TagNotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("username and password do not match")]
    InvalidCredentials,

    #[error("forbidden")]
    Forbidden,

    #[error("token expired")]
    TokenExpired,

    #[error("database schema is at {current} but this build expects {expected}; run `shiori migrate`")]
    MigrationRequired {
        current: SchemaVersion,
        expected: SchemaVersion,
    },

    #[error("migration from {from} to {to} failed: {reason}")]
    Migration {
        from: SchemaVersion,
        to: SchemaVersion,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for the "row is missing" family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound | Error::BookmarkNotFound | Error::TagNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
