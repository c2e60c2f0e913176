//! # Shiori
//!
//! A self-hosted bookmark manager, usable both as a standalone binary and as
//! a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! shiori = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shiori::config::Config;
//! use shiori::domains::Dependencies;
//! use shiori::server::{AppState, create_router};
//! use shiori::store::open_store;
//!
//! let config = Config::from_env()?;
//! let store = open_store(&config).await?;
//! store.migrate().await?;
//!
//! let deps = Dependencies::new(config, store)?;
//! let router = create_router(Arc::new(AppState::new(deps)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domains;
pub mod error;
pub mod ingest;
pub mod server;
pub mod store;
pub mod types;
