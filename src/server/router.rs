use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderName, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::{Json, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Instrument;
use uuid::Uuid;

use super::ext::ext_router;
use super::files::files_router;
use super::response::ApiResponse;
use super::v1::v1_router;
use crate::domains::Dependencies;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AppState {
    pub deps: Dependencies,
}

impl AppState {
    #[must_use]
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

/// Build metadata reported by the liveness and info endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub date: &'static str,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    commit: match option_env!("SHIORI_BUILD_COMMIT") {
        Some(commit) => commit,
        None => "dev",
    },
    date: match option_env!("SHIORI_BUILD_DATE") {
        Some(date) => date,
        None => "unknown",
    },
};

#[derive(Clone, Default)]
struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

async fn liveness() -> impl IntoResponse {
    Json(ApiResponse::success(BUILD_INFO))
}

async fn landing() -> Html<&'static str> {
    Html(concat!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Shiori</title></head>",
        "<body><h1>Shiori</h1><p>Bookmark manager ",
        env!("CARGO_PKG_VERSION"),
        ". The API lives under <code>api/v1</code>.</p></body></html>"
    ))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ApiResponse {
        ok: false,
        message: "Not found",
        error_params: None,
    }))
}

fn request_id(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// Wraps the request in a span carrying its id.
async fn request_span(request: Request, next: Next) -> Response {
    let span = tracing::info_span!("request", id = %request_id(&request));
    next.run(request).instrument(span).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let id = request_id(&request);
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %id,
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let http = &state.deps.config.http;

    let mut app = Router::new()
        .route("/system/liveness", get(liveness))
        .nest("/api/v1", v1_router())
        .merge(ext_router())
        .merge(files_router());
    if http.serve_web_ui {
        app = app.route("/", get(landing));
    }
    let mut app = app
        .fallback(not_found)
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(request_span));
    if http.access_log {
        app = app.layer(middleware::from_fn(log_request));
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let app = app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(PropagateRequestIdLayer::new(request_id)),
    );

    let root = http.root_path.trim_end_matches('/').to_string();
    let app = app.with_state(state);
    if root.is_empty() {
        app
    } else {
        Router::new().nest(&root, app)
    }
}
