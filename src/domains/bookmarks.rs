use std::collections::BTreeSet;

use serde::Serialize;

use super::Dependencies;
use crate::error::{Error, Result};
use crate::ingest::{CacheReport, CacheRequest, IngestRequest, canonicalize, sanitize_title};
use crate::types::{Bookmark, BookmarkOrder, DeleteBookmarks, GetBookmarksOptions, Tag, normalize_tag_name};

pub const DEFAULT_PAGE_SIZE: i64 = 30;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Filters and paging for the bookmark list.
#[derive(Debug, Clone, Default)]
pub struct ListBookmarks {
    pub keyword: String,
    pub tags: Vec<String>,
    pub excluded_tags: Vec<String>,
    pub order: BookmarkOrder,
    /// 1-based. Zero or less means the first page.
    pub page: i64,
    /// Zero means the default page size.
    pub limit: i64,
}

impl ListBookmarks {
    fn page(&self) -> i64 {
        self.page.max(1)
    }

    fn limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }

    fn options(&self) -> GetBookmarksOptions {
        GetBookmarksOptions {
            tags: tag_filters(&self.tags),
            excluded_tags: tag_filters(&self.excluded_tags),
            keyword: self.keyword.trim().to_string(),
            order: self.order,
            limit: self.limit(),
            offset: (self.page() - 1).saturating_mul(self.limit()),
            ..GetBookmarksOptions::default()
        }
    }
}

/// Normalized, deduplicated tag filters. `Go` and `go` are one filter.
fn tag_filters(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|t| {
            if t.trim() == crate::store::query::ANY_TAG {
                crate::store::query::ANY_TAG.to_string()
            } else {
                normalize_tag_name(t)
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkList {
    pub bookmarks: Vec<Bookmark>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Partial bookmark update. A provided `tags` replaces the tag set.
#[derive(Debug, Clone, Default)]
pub struct BookmarkPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub public: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadableContent {
    pub content: String,
    pub html: String,
}

pub struct BookmarksDomain<'a> {
    deps: &'a Dependencies,
}

impl<'a> BookmarksDomain<'a> {
    pub(super) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    pub async fn list(&self, query: &ListBookmarks) -> Result<BookmarkList> {
        let opts = query.options();
        let mut bookmarks = self.deps.store.get_bookmarks(&opts).await?;
        let total = self.deps.store.get_bookmarks_count(&opts).await?;
        self.deps.storage().decorate_all(&mut bookmarks);
        Ok(BookmarkList {
            bookmarks,
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }

    /// Every bookmark matching `opts`, unpaged. Used by the CLI.
    pub async fn find(&self, opts: &GetBookmarksOptions) -> Result<Vec<Bookmark>> {
        let mut bookmarks = self.deps.store.get_bookmarks(opts).await?;
        self.deps.storage().decorate_all(&mut bookmarks);
        Ok(bookmarks)
    }

    pub async fn get(&self, id: i64) -> Result<Bookmark> {
        if id <= 0 {
            return Err(Error::BookmarkNotFound);
        }
        let mut bookmark = self
            .deps
            .store
            .get_bookmark(id, "")
            .await?
            .ok_or(Error::BookmarkNotFound)?;
        self.deps.storage().decorate(&mut bookmark);
        Ok(bookmark)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<Bookmark>> {
        let url = canonicalize(url)?;
        let mut bookmark = self.deps.store.get_bookmark(0, &url).await?;
        if let Some(bookmark) = bookmark.as_mut() {
            self.deps.storage().decorate(bookmark);
        }
        Ok(bookmark)
    }

    pub async fn create(&self, request: IngestRequest) -> Result<Bookmark> {
        self.deps.ingest().create(request).await
    }

    pub async fn update(&self, id: i64, patch: BookmarkPatch) -> Result<Bookmark> {
        let mut bookmark = self.get(id).await?;

        if let Some(url) = patch.url {
            bookmark.url = canonicalize(&url)?;
        }
        if let Some(title) = patch.title {
            bookmark.title = sanitize_title(&title, &bookmark.url);
        }
        if let Some(excerpt) = patch.excerpt {
            bookmark.excerpt = excerpt;
        }
        if let Some(public) = patch.public {
            bookmark.public = public;
        }
        if let Some(names) = patch.tags {
            bookmark.tags = replace_tags(&bookmark.tags, &names);
        }

        let mut saved = self
            .deps
            .store
            .save_bookmarks(false, vec![bookmark])
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BookmarkNotFound)?;
        self.deps.storage().decorate(&mut saved);
        Ok(saved)
    }

    /// Deletes rows and their companion files. Returns the deleted count.
    pub async fn delete(&self, target: DeleteBookmarks) -> Result<u64> {
        let ids = match &target {
            DeleteBookmarks::Ids(ids) => {
                if ids.is_empty() {
                    return Err(Error::validation("ids", "ids must not be empty"));
                }
                if ids.iter().any(|id| *id <= 0) {
                    return Err(Error::validation("ids", "ids must be positive"));
                }
                ids.clone()
            }
            DeleteBookmarks::All => self
                .deps
                .store
                .get_bookmarks(&GetBookmarksOptions::default())
                .await?
                .into_iter()
                .map(|b| b.id)
                .collect(),
        };

        let deleted = self.deps.store.delete_bookmarks(&target).await?;
        let storage = self.deps.storage();
        for id in ids {
            storage.remove_all(id).await;
        }
        tracing::info!(deleted, "Deleted bookmarks");
        Ok(deleted)
    }

    /// Deletes the bookmark saved under `url`.
    pub async fn delete_by_url(&self, url: &str) -> Result<()> {
        let bookmark = self.get_by_url(url).await?.ok_or(Error::BookmarkNotFound)?;
        self.delete(DeleteBookmarks::Ids(vec![bookmark.id])).await?;
        Ok(())
    }

    pub async fn readable(&self, id: i64) -> Result<ReadableContent> {
        let bookmark = self.get(id).await?;
        Ok(ReadableContent {
            content: bookmark.content,
            html: bookmark.html,
        })
    }

    /// Adds every tag to every bookmark. Both lists must be non-empty.
    pub async fn bulk_update_tags(&self, bookmark_ids: &[i64], tag_ids: &[i64]) -> Result<()> {
        if bookmark_ids.is_empty() {
            return Err(Error::validation("bookmark_ids", "bookmark_ids must not be empty"));
        }
        if tag_ids.is_empty() {
            return Err(Error::validation("tag_ids", "tag_ids must not be empty"));
        }
        self.deps
            .store
            .bulk_update_bookmark_tags(bookmark_ids, tag_ids)
            .await
    }

    pub async fn update_cache(&self, request: CacheRequest) -> Result<CacheReport> {
        self.deps.ingest().update_cache(request).await
    }
}

/// The tag list that turns `current` into exactly `names` on save.
fn replace_tags(current: &[Tag], names: &[String]) -> Vec<Tag> {
    let mut wanted: Vec<String> = Vec::new();
    for name in names.iter().map(|n| normalize_tag_name(n)) {
        if !name.is_empty() && !wanted.contains(&name) {
            wanted.push(name);
        }
    }

    let mut tags: Vec<Tag> = current
        .iter()
        .filter(|t| !wanted.contains(&t.name))
        .map(|t| Tag {
            deleted: true,
            ..t.clone()
        })
        .collect();
    tags.extend(wanted.into_iter().map(Tag::named));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{ArtifactKind, testing};

    async fn seed(deps: &Dependencies, url: &str, tags: &[&str]) -> Bookmark {
        deps.bookmarks()
            .create(IngestRequest {
                url: url.into(),
                title: url.rsplit('/').next().unwrap_or_default().into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                offline: true,
                ..IngestRequest::default()
            })
            .await
            .unwrap()
    }

    #[test]
    fn paging_defaults_and_caps() {
        let query = ListBookmarks::default();
        assert_eq!((query.page(), query.limit()), (1, DEFAULT_PAGE_SIZE));

        let query = ListBookmarks {
            page: 3,
            limit: 500,
            ..ListBookmarks::default()
        };
        let opts = query.options();
        assert_eq!(opts.limit, MAX_PAGE_SIZE);
        assert_eq!(opts.offset, 200);
    }

    #[test]
    fn replacing_tags_marks_removed_ones() {
        let current = vec![
            Tag {
                id: 1,
                ..Tag::named("go")
            },
            Tag {
                id: 2,
                ..Tag::named("web")
            },
        ];
        let tags = replace_tags(&current, &["Web".into(), "rust".into()]);
        let summary: Vec<_> = tags.iter().map(|t| (t.name.as_str(), t.deleted)).collect();
        assert_eq!(summary, [("go", true), ("web", false), ("rust", false)]);
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/1", &["go"]).await;
        seed(&deps, "https://example.com/2", &["go", "draft"]).await;
        seed(&deps, "https://example.com/3", &["rust"]).await;

        let list = deps
            .bookmarks()
            .list(&ListBookmarks {
                tags: vec!["Go".into()],
                excluded_tags: vec!["draft".into()],
                ..ListBookmarks::default()
            })
            .await
            .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.bookmarks[0].url, "https://example.com/1");

        let page = deps
            .bookmarks()
            .list(&ListBookmarks {
                order: BookmarkOrder::LastAdded,
                page: 2,
                limit: 2,
                ..ListBookmarks::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.bookmarks.len(), 1);
        assert_eq!(page.bookmarks[0].url, "https://example.com/1");
    }

    #[tokio::test]
    async fn repeated_tag_filters_still_match() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/go", &["go"]).await;
        seed(&deps, "https://example.com/draft", &["go", "draft"]).await;

        let list = deps
            .bookmarks()
            .list(&ListBookmarks {
                tags: vec!["go".into(), "Go".into()],
                excluded_tags: vec!["draft".into(), " DRAFT ".into()],
                ..ListBookmarks::default()
            })
            .await
            .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.bookmarks[0].url, "https://example.com/go");
    }

    #[tokio::test]
    async fn huge_page_is_empty_not_a_panic() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/1", &[]).await;

        let list = deps
            .bookmarks()
            .list(&ListBookmarks {
                page: i64::MAX / 2,
                limit: MAX_PAGE_SIZE,
                ..ListBookmarks::default()
            })
            .await
            .unwrap();
        assert!(list.bookmarks.is_empty());
        assert_eq!(list.total, 1);
    }

    #[tokio::test]
    async fn update_replaces_tags_and_fields() {
        let (_dir, deps) = testing::deps().await;
        let bookmark = seed(&deps, "https://example.com/p", &["go", "web"]).await;

        let updated = deps
            .bookmarks()
            .update(
                bookmark.id,
                BookmarkPatch {
                    title: Some("Renamed".into()),
                    public: Some(true),
                    tags: Some(vec!["rust".into(), "web".into()]),
                    ..BookmarkPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, bookmark.id);
        assert_eq!(updated.title, "Renamed");
        assert!(updated.public);
        let names: Vec<_> = updated.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["rust", "web"]);
        assert!(updated.modified_at >= updated.created_at);
    }

    #[tokio::test]
    async fn update_to_taken_url_conflicts() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/x", &[]).await;
        let other = seed(&deps, "https://example.com/y", &[]).await;

        let err = deps
            .bookmarks()
            .update(
                other.id,
                BookmarkPatch {
                    url: Some("https://example.com/x#again".into()),
                    ..BookmarkPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
    }

    #[tokio::test]
    async fn delete_removes_companion_files() {
        let (_dir, deps) = testing::deps().await;
        let bookmark = seed(&deps, "https://example.com/d", &[]).await;
        deps.storage()
            .write(ArtifactKind::Thumbnail, bookmark.id, b"img")
            .await
            .unwrap();

        let err = deps
            .bookmarks()
            .delete(DeleteBookmarks::Ids(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let deleted = deps
            .bookmarks()
            .delete(DeleteBookmarks::Ids(vec![bookmark.id]))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!deps.storage().exists(ArtifactKind::Thumbnail, bookmark.id));
        assert!(matches!(
            deps.bookmarks().get(bookmark.id).await.unwrap_err(),
            Error::BookmarkNotFound
        ));
    }

    #[tokio::test]
    async fn truncate_deletes_everything() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/t1", &["a"]).await;
        seed(&deps, "https://example.com/t2", &[]).await;

        let deleted = deps.bookmarks().delete(DeleteBookmarks::All).await.unwrap();
        assert_eq!(deleted, 2);
        let list = deps.bookmarks().list(&ListBookmarks::default()).await.unwrap();
        assert_eq!(list.total, 0);
    }

    #[tokio::test]
    async fn delete_by_url_uses_canonical_form() {
        let (_dir, deps) = testing::deps().await;
        seed(&deps, "https://example.com/u", &[]).await;

        deps.bookmarks()
            .delete_by_url("https://example.com/u?utm_medium=mail")
            .await
            .unwrap();
        assert!(
            deps.bookmarks()
                .get_by_url("https://example.com/u")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn bulk_tags_require_both_lists() {
        let (_dir, deps) = testing::deps().await;
        let err = deps.bookmarks().bulk_update_tags(&[], &[1]).await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "bookmark_ids"));

        let bookmark = seed(&deps, "https://example.com/b", &[]).await;
        let err = deps
            .bookmarks()
            .bulk_update_tags(&[bookmark.id], &[77])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TagNotFound));
    }
}
