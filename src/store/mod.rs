//! Persistence for accounts, bookmarks, tags and their edges.
//!
//! [`Store`] is the single contract the rest of the crate talks to. SQLite
//! is served by [`SqliteStore`] on rusqlite; MySQL and PostgreSQL share
//! [`SqlxStore`]. Both build their SQL through [`query`] so filters behave
//! identically on every engine.

mod dialect;
mod migrations;
pub mod query;
mod sqlite;
mod sqlx_store;

pub use dialect::Dialect;
pub use migrations::{Migration, MigrationStep, SchemaVersion, latest_version, migrations_for};
pub use sqlite::SqliteStore;
pub use sqlx_store::SqlxStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::*;

#[async_trait]
pub trait Store: Send + Sync {
    fn dialect(&self) -> Dialect;

    // Schema

    /// Verifies that every pooled connection is usable.
    async fn init(&self) -> Result<()>;
    /// Applies pending migrations and returns the resulting version.
    async fn migrate(&self) -> Result<SchemaVersion>;
    /// Recorded version, `0.0.0` on a fresh database.
    async fn schema_version(&self) -> Result<SchemaVersion>;
    async fn set_schema_version(&self, version: SchemaVersion) -> Result<()>;

    // Bookmarks

    /// Inserts (`create`) or updates bookmarks and syncs their tag edges, in
    /// one transaction. Returns the stored rows with ids and tags filled in.
    async fn save_bookmarks(&self, create: bool, bookmarks: Vec<Bookmark>) -> Result<Vec<Bookmark>>;
    async fn get_bookmarks(&self, opts: &GetBookmarksOptions) -> Result<Vec<Bookmark>>;
    async fn get_bookmarks_count(&self, opts: &GetBookmarksOptions) -> Result<i64>;
    /// Looks a bookmark up by id or by url, content included.
    async fn get_bookmark(&self, id: i64, url: &str) -> Result<Option<Bookmark>>;
    /// Returns the number of deleted rows.
    async fn delete_bookmarks(&self, target: &DeleteBookmarks) -> Result<u64>;
    async fn bookmark_exists(&self, id: i64) -> Result<bool>;

    // Accounts

    async fn create_account(&self, account: &NewAccount) -> Result<Account>;
    async fn update_account(&self, id: i64, update: &AccountUpdate) -> Result<Account>;
    async fn list_accounts(&self, opts: &ListAccountsOptions) -> Result<Vec<Account>>;
    async fn get_account(&self, id: i64) -> Result<Option<Account>>;
    async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>>;
    async fn delete_account(&self, id: i64) -> Result<()>;
    /// Number of accounts, or of owner accounts only.
    async fn count_accounts(&self, owner_only: bool) -> Result<i64>;

    // Tags

    /// Creates the named tags, reusing any that already exist.
    async fn create_tags(&self, names: &[String]) -> Result<Vec<Tag>>;
    async fn get_tags(&self, opts: &ListTagsOptions) -> Result<Vec<Tag>>;
    async fn get_tag(&self, id: i64) -> Result<Option<Tag>>;
    async fn rename_tag(&self, id: i64, name: &str) -> Result<Tag>;
    async fn delete_tag(&self, id: i64) -> Result<()>;
    async fn tag_exists(&self, id: i64) -> Result<bool>;

    // Edges

    async fn add_tag_to_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()>;
    async fn remove_tag_from_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()>;
    /// Attaches every tag to every bookmark. Existing edges are kept.
    async fn bulk_update_bookmark_tags(&self, bookmark_ids: &[i64], tag_ids: &[i64]) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Opens the backend selected by `config.database`. Migrations are not run.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    std::fs::create_dir_all(&config.data_dir)?;

    match config.database.dialect {
        Dialect::Sqlite => {
            let path = config
                .database
                .sqlite_path()
                .ok_or_else(|| Error::Config("sqlite url has no path".into()))?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::open(&path, &config.data_dir)?;
            Ok(Arc::new(store))
        }
        Dialect::MySql | Dialect::Postgres => {
            let store = SqlxStore::connect(&config.database, &config.data_dir).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Rejects bookmarks that would violate the row invariants.
pub(crate) fn validate_bookmark(bookmark: &Bookmark) -> Result<()> {
    if bookmark.url.trim().is_empty() {
        return Err(Error::validation("url", "URL must not be empty"));
    }
    if bookmark.title.trim().is_empty() {
        return Err(Error::validation("title", "title must not be empty"));
    }
    Ok(())
}

/// Normalized, de-duplicated tag names. Empty names are rejected.
pub(crate) fn normalize_tag_names(names: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for raw in names {
        let name = normalize_tag_name(raw);
        if name.is_empty() {
            return Err(Error::validation("tags", "tag name must not be empty"));
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}

pub(crate) fn format_timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format(DATABASE_DATE_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::NaiveDateTime::parse_from_str(s, DATABASE_DATE_FORMAT)
        .map(|ndt| ndt.and_utc())
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&chrono::Utc)))
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            chrono::DateTime::<chrono::Utc>::default()
        })
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    use chrono::SubsecRound;
    chrono::Utc::now().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_at_second_precision() {
        let t = now();
        assert_eq!(parse_timestamp(&format_timestamp(&t)), t);
        assert_eq!(
            parse_timestamp("2024-03-01T10:00:00Z"),
            parse_timestamp("2024-03-01 10:00:00")
        );
    }

    #[test]
    fn tag_names_are_normalized_and_deduplicated() {
        let names = vec!["Rust".to_string(), " rust ".to_string(), "Web  Dev".to_string()];
        assert_eq!(normalize_tag_names(&names).unwrap(), vec!["rust", "web dev"]);
        assert!(normalize_tag_names(&["  ".to_string()]).is_err());
    }

    #[test]
    fn bookmarks_need_url_and_title() {
        let mut b = Bookmark {
            url: "https://example.com".into(),
            title: "Example".into(),
            ..Bookmark::default()
        };
        assert!(validate_bookmark(&b).is_ok());
        b.title.clear();
        assert!(matches!(
            validate_bookmark(&b),
            Err(Error::Validation { field, .. }) if field == "title"
        ));
    }
}
