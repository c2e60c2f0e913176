mod accounts;
mod auth;
mod bookmarks;
mod system;
mod tags;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::server::AppState;

pub fn v1_router() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        .route("/auth/account", patch(auth::update_self))
        .route("/auth/logout", post(auth::logout))
        // Accounts (owner only)
        .route(
            "/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/accounts/{id}",
            get(accounts::get_account)
                .patch(accounts::update_account)
                .delete(accounts::delete_account),
        )
        // Bookmarks
        .route(
            "/bookmarks",
            get(bookmarks::list_bookmarks)
                .post(bookmarks::create_bookmark)
                .delete(bookmarks::delete_bookmarks),
        )
        .route("/bookmarks/cache", put(bookmarks::update_cache))
        .route("/bookmarks/bulk/tags", put(bookmarks::bulk_update_tags))
        .route(
            "/bookmarks/{id}",
            get(bookmarks::get_bookmark)
                .patch(bookmarks::update_bookmark)
                .delete(bookmarks::delete_bookmark),
        )
        .route("/bookmarks/{id}/readable", get(bookmarks::readable))
        .route(
            "/bookmarks/{id}/tags",
            get(tags::list_bookmark_tags)
                .post(tags::add_bookmark_tag)
                .delete(tags::remove_bookmark_tag),
        )
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/{id}",
            get(tags::get_tag)
                .patch(tags::rename_tag)
                .delete(tags::delete_tag),
        )
        // System
        .route("/system/info", get(system::info))
}
