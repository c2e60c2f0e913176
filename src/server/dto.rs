use serde::Deserialize;

use crate::server::validation::{bool_or_int, opt_bool_or_int};
use crate::types::AccountConfig;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSelfRequest {
    #[serde(default)]
    pub old_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub config: Option<AccountConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub owner: bool,
    #[serde(default)]
    pub config: Option<AccountConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "opt_bool_or_int")]
    pub owner: Option<bool>,
    #[serde(default)]
    pub config: Option<AccountConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAccountsParams {
    pub keyword: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub owner: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBookmarksParams {
    pub keyword: Option<String>,
    pub tags: Option<String>,
    pub exclude: Option<String>,
    pub excluded_tags: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub order: Option<String>,
}

/// A tag given either as a bare name or as `{"name": ..}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    Name(String),
    Object { name: String },
}

impl TagInput {
    #[must_use]
    pub fn into_name(self) -> String {
        match self {
            TagInput::Name(name) | TagInput::Object { name } => name,
        }
    }
}

pub fn tag_names(tags: Vec<TagInput>) -> Vec<String> {
    tags.into_iter().map(TagInput::into_name).collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateBookmarkRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<TagInput>,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub public: bool,
    #[serde(default)]
    pub create_archive: bool,
    #[serde(default)]
    pub create_ebook: bool,
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookmarkRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<TagInput>>,
    #[serde(default, deserialize_with = "opt_bool_or_int")]
    pub public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteBookmarksRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub truncate: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkTagsRequest {
    pub bookmark_ids: Vec<i64>,
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCacheRequest {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub keep_metadata: bool,
    #[serde(default)]
    pub create_archive: bool,
    #[serde(default)]
    pub create_ebook: bool,
    #[serde(default)]
    pub skip_exist: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTagsParams {
    #[serde(default)]
    pub with_bookmark_count: bool,
    pub bookmark_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BookmarkTagRequest {
    pub tag_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExtBookmarkRequest {
    pub url: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub tags: Vec<TagInput>,
}

#[derive(Debug, Deserialize)]
pub struct ExtDeleteRequest {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_accept_names_and_objects() {
        let req: CreateBookmarkRequest = serde_json::from_str(
            r#"{"url":"https://a.example","tags":["go",{"name":"rust"}],"public":1}"#,
        )
        .unwrap();
        assert_eq!(tag_names(req.tags), vec!["go", "rust"]);
        assert!(req.public);
        assert!(!req.offline);
    }
}
