//! HTTP API tests. Each test drives the real router in-process over its own
//! temp SQLite store, so tests run in parallel without a server.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};

use common::TestApp;
use shiori::domains::ArtifactKind;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

fn ids(list: &Value) -> Vec<i64> {
    list["message"]["bookmarks"]
        .as_array()
        .expect("bookmark array")
        .iter()
        .map(|b| b["id"].as_i64().expect("id"))
        .collect()
}

#[tokio::test]
async fn bootstrap_login_then_me() {
    let app = TestApp::new().await;

    let login = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "shiori", "password": "gopher"})),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let body = login.json();
    assert_eq!(body["ok"], true);
    let token = body["message"]["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    let me = app.call(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    let body = me.json();
    assert_eq!(body["message"]["username"], "shiori");
    assert_eq!(body["message"]["owner"], true);
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let app = TestApp::new().await;
    let login = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "shiori", "password": "nope"})),
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
    assert_eq!(login.json()["ok"], false);
}

#[tokio::test]
async fn me_requires_a_token() {
    let app = TestApp::new().await;
    let me = app.call(Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    assert!(me.headers.contains_key(header::WWW_AUTHENTICATE));

    let bogus = app
        .call(Method::GET, "/api/v1/auth/me", Some("not-a-token"), None)
        .await;
    assert_eq!(bogus.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_canonicalizes_and_rejects_duplicates() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let payload = json!({
        "url": "https://example.com/a?utm_source=x#frag",
        "title": "A",
        "offline": true,
    });
    let created = app
        .call(Method::POST, "/api/v1/bookmarks", Some(&token), Some(payload.clone()))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["message"]["url"], "https://example.com/a");
    assert_eq!(body["message"]["title"], "A");
    assert!(body["message"]["id"].as_i64().unwrap() > 0);

    let again = app
        .call(Method::POST, "/api/v1/bookmarks", Some(&token), Some(payload))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_validates_the_url() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let response = app
        .call(
            Method::POST,
            "/api/v1/bookmarks",
            Some(&token),
            Some(json!({"url": "not a url", "offline": true})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["ok"], false);
}

#[tokio::test]
async fn list_filters_by_required_and_excluded_tags() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let first = app.add_bookmark(&token, "https://one.example", &["go"], false).await;
    app.add_bookmark(&token, "https://two.example", &["go", "draft"], false)
        .await;
    app.add_bookmark(&token, "https://three.example", &["rust"], false)
        .await;

    let list = app
        .call(
            Method::GET,
            "/api/v1/bookmarks?tags=go&excluded_tags=draft",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(list.status, StatusCode::OK);
    let body = list.json();
    assert_eq!(ids(&body), vec![first]);
    assert_eq!(body["message"]["total"], 1);

    let repeated = app
        .call(
            Method::GET,
            "/api/v1/bookmarks?tags=go,Go&excluded_tags=draft,DRAFT",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(repeated.status, StatusCode::OK);
    assert_eq!(ids(&repeated.json()), vec![first]);
}

#[tokio::test]
async fn list_pages_newest_first() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let mut created = Vec::new();
    for n in 0..3 {
        created.push(
            app.add_bookmark(&token, &format!("https://page{n}.example"), &[], false)
                .await,
        );
    }

    let page = app
        .call(Method::GET, "/api/v1/bookmarks?limit=2&page=1", Some(&token), None)
        .await;
    let body = page.json();
    assert_eq!(ids(&body), vec![created[2], created[1]]);
    assert_eq!(body["message"]["total"], 3);

    let page = app
        .call(Method::GET, "/api/v1/bookmarks?limit=2&page=2", Some(&token), None)
        .await;
    assert_eq!(ids(&page.json()), vec![created[0]]);

    let far = app
        .call(
            Method::GET,
            "/api/v1/bookmarks?limit=100&page=4611686018427387903",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(far.status, StatusCode::OK);
    assert!(ids(&far.json()).is_empty());

    let bad = app
        .call(Method::GET, "/api/v1/bookmarks?order=sideways", Some(&token), None)
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_tags_require_existing_rows() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let a = app.add_bookmark(&token, "https://a.example", &[], false).await;
    let b = app.add_bookmark(&token, "https://b.example", &[], false).await;

    let missing = app
        .call(
            Method::PUT,
            "/api/v1/bookmarks/bulk/tags",
            Some(&token),
            Some(json!({"bookmark_ids": [a, b], "tag_ids": [9999]})),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.json()["message"], "Tag not found");

    let tag = app
        .call(
            Method::POST,
            "/api/v1/tags",
            Some(&token),
            Some(json!({"name": "reading"})),
        )
        .await;
    assert_eq!(tag.status, StatusCode::CREATED);
    let tag_id = tag.json()["message"]["id"].as_i64().unwrap();

    let ok = app
        .call(
            Method::PUT,
            "/api/v1/bookmarks/bulk/tags",
            Some(&token),
            Some(json!({"bookmark_ids": [a, b], "tag_ids": [tag_id]})),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let tags = app
        .call(
            Method::GET,
            &format!("/api/v1/bookmarks/{a}/tags"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(tags.status, StatusCode::OK);
    let names: Vec<i64> = tags.json()["message"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect();
    assert!(names.contains(&tag_id));
}

#[tokio::test]
async fn update_replaces_tags_and_delete_removes() {
    let app = TestApp::new().await;
    let token = app.login().await;
    let id = app
        .add_bookmark(&token, "https://edit.example", &["old", "keep"], false)
        .await;

    let updated = app
        .call(
            Method::PATCH,
            &format!("/api/v1/bookmarks/{id}"),
            Some(&token),
            Some(json!({"title": "Edited", "tags": ["keep", "new"]})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    let body = updated.json();
    assert_eq!(body["message"]["title"], "Edited");
    let mut names: Vec<String> = body["message"]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["keep", "new"]);

    let deleted = app
        .call(
            Method::DELETE,
            "/api/v1/bookmarks",
            Some(&token),
            Some(json!({"ids": [id]})),
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.json()["message"]["deleted"], 1);

    let gone = app
        .call(Method::GET, &format!("/api/v1/bookmarks/{id}"), Some(&token), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let empty = app
        .call(
            Method::DELETE,
            "/api/v1/bookmarks",
            Some(&token),
            Some(json!({"ids": []})),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn liveness_needs_no_auth() {
    let app = TestApp::new().await;
    let response = app.call(Method::GET, "/system/liveness", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"]["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["message"]["commit"].is_string());
    assert!(body["message"]["date"].is_string());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;
    let response = app.call(Method::GET, "/system/liveness", None, None).await;
    assert!(response.headers.contains_key("x-request-id"));

    let request = Request::builder()
        .uri("/system/liveness")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers["x-request-id"], "abc-123");
}

#[tokio::test]
async fn system_info_is_owner_only() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let info = app
        .call(Method::GET, "/api/v1/system/info", Some(&token), None)
        .await;
    assert_eq!(info.status, StatusCode::OK);
    assert_eq!(info.json()["message"]["database"], "sqlite");

    let anonymous = app.call(Method::GET, "/api/v1/system/info", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accounts_are_managed_by_owners() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let created = app
        .call(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({"username": "reader", "password": "secret", "owner": false})),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(created.json()["message"].get("password_hash").is_none());

    let duplicate = app
        .call(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({"username": "reader", "password": "other"})),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    // A visitor account does not close the bootstrap login.
    let bootstrap = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "shiori", "password": "gopher"})),
        )
        .await;
    assert_eq!(bootstrap.status, StatusCode::OK);

    let admin = app
        .call(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({"username": "admin", "password": "secret", "owner": true})),
        )
        .await;
    assert_eq!(admin.status, StatusCode::CREATED);

    // Once an owner exists the credentials stop working, but the token
    // issued earlier keeps working until it expires.
    let bootstrap = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "shiori", "password": "gopher"})),
        )
        .await;
    assert_eq!(bootstrap.status, StatusCode::UNAUTHORIZED);
    let listed = app
        .call(Method::GET, "/api/v1/accounts", Some(&token), None)
        .await;
    assert_eq!(listed.status, StatusCode::OK);

    let login = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "reader", "password": "secret"})),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let reader = login.json()["message"]["token"].as_str().unwrap().to_string();

    let forbidden = app
        .call(Method::GET, "/api/v1/accounts", Some(&reader), None)
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn default_account_cannot_change_itself() {
    let app = TestApp::new().await;
    let token = app.login().await;

    let response = app
        .call(
            Method::PATCH,
            "/api/v1/auth/account",
            Some(&token),
            Some(json!({"config": {"theme": "dark"}})),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(
        response.json()["message"]
            .as_str()
            .unwrap()
            .contains("default account cannot be changed")
    );
}

#[tokio::test]
async fn extension_creates_then_merges_by_url() {
    let app = TestApp::new().await;
    let token = app.login().await;
    let html = "<html><head><title>Ext page</title></head>\
                <body><article><p>Captured by the browser extension.</p></article></body></html>";

    let first = app
        .call(
            Method::POST,
            "/api/bookmarks/ext",
            Some(&token),
            Some(json!({"url": "https://ext.example/post", "html": html, "tags": ["a"]})),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    let id = first.json()["message"]["id"].as_i64().unwrap();

    let second = app
        .call(
            Method::POST,
            "/api/bookmarks/ext",
            Some(&token),
            Some(json!({"url": "https://ext.example/post", "html": html, "tags": ["b"]})),
        )
        .await;
    assert_eq!(second.status, StatusCode::CREATED);
    let body = second.json();
    assert_eq!(body["message"]["id"].as_i64().unwrap(), id);
    assert_eq!(body["message"]["tags"].as_array().unwrap().len(), 2);

    let deleted = app
        .call(
            Method::DELETE,
            "/api/bookmarks/ext",
            Some(&token),
            Some(json!({"url": "https://ext.example/post"})),
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn thumbnails_are_cached_with_etags() {
    let app = TestApp::new().await;
    let token = app.login().await;
    let id = app.add_bookmark(&token, "https://thumb.example", &[], true).await;
    app.deps
        .storage()
        .write(ArtifactKind::Thumbnail, id, PNG)
        .await
        .unwrap();

    let uri = format!("/bookmark/{id}/thumb");
    let first = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(first.headers[header::CACHE_CONTROL], "public, max-age=86400");
    assert_eq!(first.body, PNG);
    let etag = first.headers[header::ETAG].to_str().unwrap().to_string();

    let request = Request::builder()
        .uri(&uri)
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let cached = app.send(request).await;
    assert_eq!(cached.status, StatusCode::NOT_MODIFIED);
    assert!(cached.body.is_empty());
}

#[tokio::test]
async fn private_files_need_a_session() {
    let app = TestApp::new().await;
    let token = app.login().await;
    let id = app.add_bookmark(&token, "https://private.example", &[], false).await;
    app.deps
        .storage()
        .write(ArtifactKind::Thumbnail, id, PNG)
        .await
        .unwrap();

    let uri = format!("/bookmark/{id}/thumb");
    let anonymous = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let owner = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(owner.status, StatusCode::OK);

    let no_ebook = app
        .call(Method::GET, &format!("/bookmark/{id}/ebook"), Some(&token), None)
        .await;
    assert_eq!(no_ebook.status, StatusCode::NOT_FOUND);

    let unknown = app
        .call(Method::GET, "/bookmark/9999/thumb", Some(&token), None)
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn readable_page_renders_stored_content() {
    let app = TestApp::new().await;
    let token = app.login().await;
    let html = "<html><head><title>Readable</title></head><body><article>\
                <p>First paragraph of a fairly long article body.</p>\
                <p>Second paragraph that keeps going for a while.</p>\
                </article></body></html>";
    let created = app
        .call(
            Method::POST,
            "/api/bookmarks/ext",
            Some(&token),
            Some(json!({"url": "https://read.example/post", "html": html})),
        )
        .await;
    let id = created.json()["message"]["id"].as_i64().unwrap();

    let page = app
        .call(
            Method::GET,
            &format!("/bookmark/{id}/content"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(page.status, StatusCode::OK);
    let text = String::from_utf8(page.body).unwrap();
    assert!(text.contains("First paragraph"));
    assert!(text.contains("https://read.example/post"));
}
