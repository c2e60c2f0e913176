#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use shiori::config::Config;
use shiori::domains::Dependencies;
use shiori::server::{AppState, create_router};
use shiori::store::open_store;

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// The full router over a fresh SQLite store in a temp directory.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub deps: Dependencies,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let mut config = Config::for_data_dir(temp_dir.path());
        config.http.access_log = false;

        let store = open_store(&config).await.expect("open store");
        store.migrate().await.expect("migrate");

        let deps = Dependencies::new(config, store).expect("dependencies");
        let router = create_router(Arc::new(AppState::new(deps.clone())));

        Self {
            temp_dir,
            deps,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body")
            .to_vec();
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.send(request).await
    }

    /// Logs in with the bootstrap credentials and returns the token.
    pub async fn login(&self) -> String {
        let response = self
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(serde_json::json!({"username": "shiori", "password": "gopher"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed");
        response.json()["message"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    /// Saves an offline bookmark through the API and returns its id.
    pub async fn add_bookmark(&self, token: &str, url: &str, tags: &[&str], public: bool) -> i64 {
        let response = self
            .call(
                Method::POST,
                "/api/v1/bookmarks",
                Some(token),
                Some(serde_json::json!({
                    "url": url,
                    "title": url,
                    "tags": tags,
                    "public": public,
                    "offline": true,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "create {url}");
        response.json()["message"]["id"].as_i64().expect("bookmark id")
    }
}
