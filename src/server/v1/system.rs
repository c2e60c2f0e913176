use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::response::ApiResponse;
use crate::server::router::BUILD_INFO;

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub database: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub commit: &'static str,
    pub build_date: &'static str,
}

pub async fn info(_admin: RequireAdmin, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(SystemInfo {
        version: BUILD_INFO.version,
        database: state.deps.store.dialect().name(),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        commit: BUILD_INFO.commit,
        build_date: BUILD_INFO.date,
    }))
}
