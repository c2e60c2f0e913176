use super::Dependencies;
use crate::error::{Error, Result};
use crate::types::{ListTagsOptions, Tag, TagOrder, normalize_tag_name};

pub struct TagsDomain<'a> {
    deps: &'a Dependencies,
}

impl<'a> TagsDomain<'a> {
    pub(super) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    /// Lists tags. Searching inside one bookmark's tags is not supported.
    pub async fn list(&self, opts: &ListTagsOptions) -> Result<Vec<Tag>> {
        if !opts.search.trim().is_empty() && opts.bookmark_id > 0 {
            return Err(Error::validation(
                "search",
                "search cannot be combined with bookmark_id",
            ));
        }
        if opts.bookmark_id > 0 && !self.deps.store.bookmark_exists(opts.bookmark_id).await? {
            return Err(Error::BookmarkNotFound);
        }
        self.deps.store.get_tags(opts).await
    }

    /// Tags of one bookmark, by name.
    pub async fn for_bookmark(&self, bookmark_id: i64) -> Result<Vec<Tag>> {
        self.list(&ListTagsOptions {
            bookmark_id,
            order_by: TagOrder::Name,
            ..ListTagsOptions::default()
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Tag> {
        self.deps.store.get_tag(id).await?.ok_or(Error::TagNotFound)
    }

    /// Creates a tag, or returns the existing one with the same name.
    pub async fn create(&self, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Err(Error::validation("name", "tag name must not be empty"));
        }
        self.deps
            .store
            .create_tags(&[name])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("store returned no tag".into()))
    }

    pub async fn rename(&self, id: i64, name: &str) -> Result<Tag> {
        self.deps.store.rename_tag(id, name).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.deps.store.delete_tag(id).await
    }

    pub async fn add_to_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        self.deps.store.add_tag_to_bookmark(bookmark_id, tag_id).await
    }

    pub async fn remove_from_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        self.deps
            .store
            .remove_tag_from_bookmark(bookmark_id, tag_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::testing;
    use crate::ingest::IngestRequest;

    #[tokio::test]
    async fn search_and_bookmark_filter_are_exclusive() {
        let (_dir, deps) = testing::deps().await;
        let err = deps
            .tags()
            .list(&ListTagsOptions {
                search: "go".into(),
                bookmark_id: 1,
                ..ListTagsOptions::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "search"));
    }

    #[tokio::test]
    async fn create_is_idempotent_by_name() {
        let (_dir, deps) = testing::deps().await;
        let first = deps.tags().create("  Rust  Lang ").await.unwrap();
        let second = deps.tags().create("rust lang").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "rust lang");

        assert!(matches!(
            deps.tags().create("   ").await.unwrap_err(),
            Error::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn rename_delete_and_edges() {
        let (_dir, deps) = testing::deps().await;
        let bookmark = deps
            .bookmarks()
            .create(IngestRequest {
                url: "https://example.com/t".into(),
                title: "T".into(),
                offline: true,
                ..IngestRequest::default()
            })
            .await
            .unwrap();
        let tag = deps.tags().create("old").await.unwrap();

        deps.tags().add_to_bookmark(bookmark.id, tag.id).await.unwrap();
        let renamed = deps.tags().rename(tag.id, "New").await.unwrap();
        assert_eq!(renamed.name, "new");

        let tags = deps.tags().for_bookmark(bookmark.id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "new");
        assert_eq!(deps.tags().get(tag.id).await.unwrap().bookmark_count, Some(1));

        deps.tags().remove_from_bookmark(bookmark.id, tag.id).await.unwrap();
        assert!(deps.tags().for_bookmark(bookmark.id).await.unwrap().is_empty());

        deps.tags().delete(tag.id).await.unwrap();
        assert!(matches!(
            deps.tags().get(tag.id).await.unwrap_err(),
            Error::TagNotFound
        ));
        assert!(matches!(
            deps.tags().for_bookmark(999).await.unwrap_err(),
            Error::BookmarkNotFound
        ));
    }
}
