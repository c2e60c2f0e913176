use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// A saved URL plus its extracted content.
///
/// `content` and `html` are only populated when requested, since they can be
/// large. The `has_*` flags other than `has_content` are derived from
/// companion files on disk and are filled in by the domain layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub author: String,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip)]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archiver: String,
    #[serde(skip)]
    pub archive_path: String,
    pub has_content: bool,
    pub has_archive: bool,
    pub has_ebook: bool,
    pub has_thumbnail: bool,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookmarkOrder {
    /// Oldest first (`id ASC`).
    #[default]
    Default,
    /// Newest first (`id DESC`).
    LastAdded,
    /// Most recently modified first.
    LastModified,
}

#[derive(Debug, Clone, Default)]
pub struct GetBookmarksOptions {
    pub ids: Vec<i64>,
    /// Required tag names. `"*"` means "has any tag".
    pub tags: Vec<String>,
    /// Excluded tag names. `"*"` means "has no tag".
    pub excluded_tags: Vec<String>,
    pub keyword: String,
    pub with_content: bool,
    pub order: BookmarkOrder,
    pub limit: i64,
    pub offset: i64,
}

/// Target of a delete. Deleting everything has to be asked for explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteBookmarks {
    Ids(Vec<i64>),
    All,
}
