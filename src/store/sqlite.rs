use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, Transaction, params, params_from_iter};

use super::migrations::{self, Migration, MigrationStep, MigrationTarget, PROMOTE_PAGE_SIZE};
use super::query::{self, IN_LIST_CHUNK, QueryBuilder, SqlValue};
use super::{
    Dialect, SchemaVersion, Store, format_timestamp, normalize_tag_names, now, parse_timestamp,
    validate_bookmark,
};
use crate::auth::hash_password;
use crate::error::{Error, Result};
use crate::types::*;

const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT_MS: u32 = 10_000;

struct Connections {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Connections {
    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// SQLite backend. Writes are serialized through a single connection while
/// reads rotate over a small pool of `query_only` connections.
///
/// rusqlite is synchronous, so every operation, lock waits included, runs
/// on the blocking thread pool.
pub struct SqliteStore {
    conns: Arc<Connections>,
    data_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.as_ref();

        let writer = Self::open_connection(db_path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;

        let readers = (0..READER_POOL_SIZE)
            .map(|_| {
                let conn = Self::open_connection(db_path)?;
                conn.pragma_update(None, "query_only", "ON")?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(path = %db_path.display(), readers = READER_POOL_SIZE, "Opened SQLite database");

        Ok(Self {
            conns: Arc::new(Connections {
                writer: Mutex::new(writer),
                readers,
                next_reader: AtomicUsize::new(0),
            }),
            data_dir: data_dir.into(),
        })
    }

    fn open_connection(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Runs `f` against a reader connection on the blocking pool.
    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conns = Arc::clone(&self.conns);
        tokio::task::spawn_blocking(move || f(&*conns.reader()))
            .await
            .map_err(|e| Error::Internal(format!("SQLite task failed: {e}")))?
    }

    /// Runs `f` against the write connection on the blocking pool.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conns = Arc::clone(&self.conns);
        tokio::task::spawn_blocking(move || f(&mut *conns.writer()))
            .await
            .map_err(|e| Error::Internal(format!("SQLite task failed: {e}")))?
    }

    /// Like [`Self::write`], inside a transaction that commits when `f`
    /// succeeds and rolls back otherwise.
    async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.write(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Int(v) => ToSqlOutput::from(*v),
            SqlValue::Text(v) => ToSqlOutput::from(v.as_str()),
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// Maps uniqueness failures to `AlreadyExists`; everything else passes
/// through as a database error.
fn map_write_err(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return Error::AlreadyExists;
        }
    }
    Error::Database(err)
}

fn bookmark_from_row(row: &Row<'_>, with_content: bool) -> rusqlite::Result<Bookmark> {
    let mut bookmark = Bookmark {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        excerpt: row.get(3)?,
        author: row.get(4)?,
        public: row.get::<_, i64>(5)? != 0,
        created_at: parse_timestamp(&row.get::<_, String>(6)?),
        modified_at: parse_timestamp(&row.get::<_, String>(7)?),
        archiver: row.get(8)?,
        archive_path: row.get(9)?,
        has_content: row.get::<_, i64>(10)? != 0,
        ..Bookmark::default()
    };
    if with_content {
        bookmark.content = row.get(11)?;
        bookmark.html = row.get(12)?;
    }
    Ok(bookmark)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        owner: row.get::<_, i64>(3)? != 0,
        config: AccountConfig::from_json(&row.get::<_, String>(4)?),
    })
}

fn query_bookmarks(conn: &Connection, qb: QueryBuilder, with_content: bool) -> Result<Vec<Bookmark>> {
    let (sql, args) = qb.build();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        bookmark_from_row(row, with_content)
    })?;
    let mut bookmarks = rows.collect::<std::result::Result<Vec<_>, _>>()?;
    attach_tags(conn, &mut bookmarks)?;
    Ok(bookmarks)
}

/// Fills `tags` on every bookmark with one IN-query per chunk of ids.
fn attach_tags(conn: &Connection, bookmarks: &mut [Bookmark]) -> Result<()> {
    if bookmarks.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = bookmarks.iter().map(|b| b.id).collect();
    let mut edges: Vec<(i64, Tag)> = Vec::new();

    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let (sql, args) = query::select_tags_for_bookmarks(Dialect::Sqlite, chunk).build();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Tag {
                    id: row.get(1)?,
                    name: row.get(2)?,
                    ..Tag::default()
                },
            ))
        })?;
        for row in rows {
            edges.push(row?);
        }
    }

    for bookmark in bookmarks.iter_mut() {
        bookmark.tags = edges
            .iter()
            .filter(|(bookmark_id, _)| *bookmark_id == bookmark.id)
            .map(|(_, tag)| tag.clone())
            .collect();
    }

    Ok(())
}

fn tag_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT id FROM tag WHERE name = ?1", params![name], |row| {
        row.get(0)
    })
    .optional()
    .map_err(Error::from)
}

fn ensure_tag(conn: &Connection, name: &str) -> Result<Tag> {
    let id = match tag_id_by_name(conn, name)? {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO tag (name) VALUES (?1)", params![name])
                .map_err(map_write_err)?;
            conn.last_insert_rowid()
        }
    };
    Ok(Tag {
        id,
        name: name.to_string(),
        ..Tag::default()
    })
}

fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    let exists: i64 = conn.query_row(&sql, params![id], |row| row.get(0))?;
    Ok(exists != 0)
}

fn ensure_edge_ends(conn: &Connection, bookmark_id: i64, tag_id: i64) -> Result<()> {
    if !row_exists(conn, "bookmark", bookmark_id)? {
        return Err(Error::BookmarkNotFound);
    }
    if !row_exists(conn, "tag", tag_id)? {
        return Err(Error::TagNotFound);
    }
    Ok(())
}

/// Number of distinct `ids` present in `table`.
fn count_existing(conn: &Connection, table: &str, ids: &[i64]) -> Result<usize> {
    let mut found = 0;
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let mut qb = QueryBuilder::new(
            Dialect::Sqlite,
            format!("SELECT COUNT(id) FROM {table} WHERE id IN "),
        );
        qb.push_in_list(chunk.iter().copied());
        let (sql, args) = qb.build();
        let count: i64 = conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        found += usize::try_from(count).unwrap_or_default();
    }
    Ok(found)
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn save_bookmark(tx: &Transaction<'_>, create: bool, mut bookmark: Bookmark) -> Result<Bookmark> {
    validate_bookmark(&bookmark)?;

    let timestamp = now();
    bookmark.modified_at = timestamp;

    if create {
        bookmark.created_at = timestamp;
        tx.execute(
            "INSERT INTO bookmark (url, title, excerpt, author, public, content, html,
                 archiver, archive_path, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                bookmark.url,
                bookmark.title,
                bookmark.excerpt,
                bookmark.author,
                i64::from(bookmark.public),
                bookmark.content,
                bookmark.html,
                bookmark.archiver,
                bookmark.archive_path,
                format_timestamp(&bookmark.created_at),
                format_timestamp(&bookmark.modified_at),
            ],
        )
        .map_err(map_write_err)?;
        bookmark.id = tx.last_insert_rowid();
    } else {
        let rows = tx
            .execute(
                "UPDATE bookmark SET url = ?1, title = ?2, excerpt = ?3, author = ?4,
                     public = ?5, content = ?6, html = ?7, archiver = ?8,
                     archive_path = ?9, modified_at = ?10
                 WHERE id = ?11",
                params![
                    bookmark.url,
                    bookmark.title,
                    bookmark.excerpt,
                    bookmark.author,
                    i64::from(bookmark.public),
                    bookmark.content,
                    bookmark.html,
                    bookmark.archiver,
                    bookmark.archive_path,
                    format_timestamp(&bookmark.modified_at),
                    bookmark.id,
                ],
            )
            .map_err(map_write_err)?;
        if rows == 0 {
            return Err(Error::BookmarkNotFound);
        }
        let created_at: String = tx.query_row(
            "SELECT created_at FROM bookmark WHERE id = ?1",
            params![bookmark.id],
            |row| row.get(0),
        )?;
        bookmark.created_at = parse_timestamp(&created_at);
    }

    for tag in std::mem::take(&mut bookmark.tags) {
        let name = normalize_tag_name(&tag.name);
        if tag.deleted {
            let tag_id = if tag.id > 0 {
                Some(tag.id)
            } else {
                tag_id_by_name(tx, &name)?
            };
            if let Some(tag_id) = tag_id {
                tx.execute(
                    "DELETE FROM bookmark_tag WHERE bookmark_id = ?1 AND tag_id = ?2",
                    params![bookmark.id, tag_id],
                )?;
            }
            continue;
        }
        if name.is_empty() {
            return Err(Error::validation("tags", "tag name must not be empty"));
        }
        let tag = ensure_tag(tx, &name)?;
        tx.execute(
            Dialect::Sqlite.insert_edge_sql(),
            params![bookmark.id, tag.id],
        )?;
    }

    bookmark.has_content = !bookmark.content.is_empty();
    let mut saved = [bookmark];
    attach_tags(tx, &mut saved)?;
    let [bookmark] = saved;
    Ok(bookmark)
}

fn promote_warc_archives(tx: &Transaction<'_>, data_dir: &Path) -> Result<()> {
    let mut last_id = 0_i64;
    let mut promoted = 0_usize;

    loop {
        let ids: Vec<i64> = {
            let mut stmt =
                tx.prepare("SELECT id FROM bookmark WHERE id > ?1 ORDER BY id ASC LIMIT ?2")?;
            let rows = stmt.query_map(params![last_id, PROMOTE_PAGE_SIZE], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let Some(&last) = ids.last() else {
            break;
        };
        last_id = last;

        for id in ids {
            let relative = format!("archive/{id}");
            if data_dir.join(&relative).is_file() {
                tx.execute(
                    "UPDATE bookmark SET archiver = 'warc', archive_path = ?1 WHERE id = ?2",
                    params![relative, id],
                )?;
                promoted += 1;
            }
        }
    }

    tracing::info!(promoted, "Promoted existing WARC archives");
    Ok(())
}

fn read_schema_version(conn: &Connection) -> Result<SchemaVersion> {
    let has_table: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'shiori_system'",
        [],
        |row| row.get(0),
    )?;
    if has_table == 0 {
        return Ok(SchemaVersion::default());
    }

    let raw: Option<String> = conn
        .query_row(
            "SELECT database_schema_version FROM shiori_system LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    raw.map_or(Ok(SchemaVersion::default()), |v| v.parse())
}

fn write_schema_version(conn: &Connection, version: SchemaVersion) -> Result<()> {
    conn.execute(
        "UPDATE shiori_system SET database_schema_version = ?1",
        params![version.to_string()],
    )?;
    Ok(())
}

#[async_trait]
impl MigrationTarget for SqliteStore {
    async fn current_version(&self) -> Result<SchemaVersion> {
        self.write(|conn| read_schema_version(conn)).await
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        let step = migration.step;
        let to = migration.to;
        let data_dir = self.data_dir.clone();
        self.transaction(move |tx| {
            match step {
                MigrationStep::Script(sql) => tx.execute_batch(sql)?,
                MigrationStep::PromoteWarcArchives => promote_warc_archives(tx, &data_dir)?,
            }
            write_schema_version(tx, to)
        })
        .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn init(&self) -> Result<()> {
        let conns = Arc::clone(&self.conns);
        self.write(move |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            for reader in &conns.readers {
                reader
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .query_row("SELECT 1", [], |_| Ok(()))?;
            }
            Ok(())
        })
        .await
    }

    async fn migrate(&self) -> Result<SchemaVersion> {
        migrations::run(self, migrations::migrations_for(Dialect::Sqlite)).await
    }

    async fn schema_version(&self) -> Result<SchemaVersion> {
        self.read(read_schema_version).await
    }

    async fn set_schema_version(&self, version: SchemaVersion) -> Result<()> {
        self.write(move |conn| write_schema_version(conn, version)).await
    }

    // Bookmarks

    async fn save_bookmarks(&self, create: bool, bookmarks: Vec<Bookmark>) -> Result<Vec<Bookmark>> {
        self.transaction(move |tx| {
            bookmarks
                .into_iter()
                .map(|bookmark| save_bookmark(tx, create, bookmark))
                .collect()
        })
        .await
    }

    async fn get_bookmarks(&self, opts: &GetBookmarksOptions) -> Result<Vec<Bookmark>> {
        let qb = query::select_bookmarks(Dialect::Sqlite, opts);
        let with_content = opts.with_content;
        self.read(move |conn| query_bookmarks(conn, qb, with_content)).await
    }

    async fn get_bookmarks_count(&self, opts: &GetBookmarksOptions) -> Result<i64> {
        let (sql, args) = query::count_bookmarks(Dialect::Sqlite, opts).build();
        self.read(move |conn| {
            let count = conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
            Ok(count)
        })
        .await
    }

    async fn get_bookmark(&self, id: i64, url: &str) -> Result<Option<Bookmark>> {
        let mut qb = QueryBuilder::new(
            Dialect::Sqlite,
            format!(
                "SELECT {}{} FROM bookmark b WHERE b.id = ",
                query::BOOKMARK_COLUMNS,
                query::BOOKMARK_CONTENT_COLUMNS
            ),
        );
        qb.push_bind(id).push(" OR b.url = ").push_bind(url).push(" LIMIT 1");

        let bookmarks = self.read(move |conn| query_bookmarks(conn, qb, true)).await?;
        Ok(bookmarks.into_iter().next())
    }

    async fn delete_bookmarks(&self, target: &DeleteBookmarks) -> Result<u64> {
        if matches!(target, DeleteBookmarks::Ids(ids) if ids.is_empty()) {
            return Err(Error::validation("ids", "ids must not be empty"));
        }
        let target = target.clone();
        self.transaction(move |tx| {
            let mut deleted = 0_u64;
            match target {
                DeleteBookmarks::Ids(ids) => {
                    for chunk in ids.chunks(IN_LIST_CHUNK) {
                        let mut qb = QueryBuilder::new(Dialect::Sqlite, "DELETE FROM bookmark WHERE id IN ");
                        qb.push_in_list(chunk.iter().copied());
                        let (sql, args) = qb.build();
                        deleted += tx.execute(&sql, params_from_iter(args.iter()))? as u64;
                    }
                }
                DeleteBookmarks::All => {
                    tx.execute("DELETE FROM bookmark_tag", [])?;
                    deleted = tx.execute("DELETE FROM bookmark", [])? as u64;
                }
            }
            Ok(deleted)
        })
        .await
    }

    async fn bookmark_exists(&self, id: i64) -> Result<bool> {
        self.read(move |conn| row_exists(conn, "bookmark", id)).await
    }

    // Accounts

    async fn create_account(&self, account: &NewAccount) -> Result<Account> {
        if account.username.trim().is_empty() {
            return Err(Error::validation("username", "username must not be empty"));
        }
        if account.password.is_empty() {
            return Err(Error::validation("password", "password must not be empty"));
        }

        let account = account.clone();
        self.write(move |conn| {
            let hash = hash_password(&account.password)?;
            conn.execute(
                "INSERT INTO account (username, password, owner, config) VALUES (?1, ?2, ?3, ?4)",
                params![
                    account.username,
                    hash,
                    i64::from(account.owner),
                    account.config.to_json()
                ],
            )
            .map_err(map_write_err)?;

            Ok(Account {
                id: conn.last_insert_rowid(),
                username: account.username,
                password_hash: hash,
                owner: account.owner,
                config: account.config,
            })
        })
        .await
    }

    async fn update_account(&self, id: i64, update: &AccountUpdate) -> Result<Account> {
        if let Some(username) = &update.username {
            if username.trim().is_empty() {
                return Err(Error::validation("username", "username must not be empty"));
            }
        }
        if update.password.as_deref() == Some("") {
            return Err(Error::validation("password", "password must not be empty"));
        }

        let update = update.clone();
        self.write(move |conn| {
            let hash = update.password.as_deref().map(hash_password).transpose()?;
            if let Some(qb) = query::update_account(Dialect::Sqlite, id, &update, hash.as_deref()) {
                let (sql, args) = qb.build();
                let rows = conn
                    .execute(&sql, params_from_iter(args.iter()))
                    .map_err(map_write_err)?;
                if rows == 0 {
                    return Err(Error::NotFound);
                }
            }

            conn.query_row(
                &format!("SELECT {} FROM account WHERE id = ?1", query::ACCOUNT_COLUMNS),
                params![id],
                account_from_row,
            )
            .optional()?
            .ok_or(Error::NotFound)
        })
        .await
    }

    async fn list_accounts(&self, opts: &ListAccountsOptions) -> Result<Vec<Account>> {
        let (sql, args) = query::select_accounts(Dialect::Sqlite, opts).build();
        self.read(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), account_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        self.read(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM account WHERE id = ?1", query::ACCOUNT_COLUMNS),
                params![id],
                account_from_row,
            )
            .optional()
            .map_err(Error::from)
        })
        .await
    }

    async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let username = username.to_string();
        self.read(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM account WHERE username = ?1", query::ACCOUNT_COLUMNS),
                params![username],
                account_from_row,
            )
            .optional()
            .map_err(Error::from)
        })
        .await
    }

    async fn delete_account(&self, id: i64) -> Result<()> {
        self.write(move |conn| {
            let rows = conn.execute("DELETE FROM account WHERE id = ?1", params![id])?;
            if rows == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn count_accounts(&self, owner_only: bool) -> Result<i64> {
        let sql = if owner_only {
            "SELECT COUNT(id) FROM account WHERE owner = 1"
        } else {
            "SELECT COUNT(id) FROM account"
        };
        self.read(move |conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .await
    }

    // Tags

    async fn create_tags(&self, names: &[String]) -> Result<Vec<Tag>> {
        let names = normalize_tag_names(names)?;
        self.transaction(move |tx| names.iter().map(|name| ensure_tag(tx, name)).collect())
            .await
    }

    async fn get_tags(&self, opts: &ListTagsOptions) -> Result<Vec<Tag>> {
        let (sql, args) = query::select_tags(Dialect::Sqlite, opts).build();
        let with_count = opts.with_bookmark_count;
        self.read(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    bookmark_count: if with_count { Some(row.get(2)?) } else { None },
                    ..Tag::default()
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
        .await
    }

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>> {
        self.read(move |conn| {
            conn.query_row(
                "SELECT t.id, t.name,
                     (SELECT COUNT(bt.tag_id) FROM bookmark_tag bt WHERE bt.tag_id = t.id)
                 FROM tag t WHERE t.id = ?1",
                params![id],
                |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        bookmark_count: Some(row.get(2)?),
                        ..Tag::default()
                    })
                },
            )
            .optional()
            .map_err(Error::from)
        })
        .await
    }

    async fn rename_tag(&self, id: i64, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Err(Error::validation("name", "tag name must not be empty"));
        }
        self.write(move |conn| {
            let rows = conn
                .execute("UPDATE tag SET name = ?1 WHERE id = ?2", params![name, id])
                .map_err(map_write_err)?;
            if rows == 0 {
                return Err(Error::TagNotFound);
            }
            Ok(Tag {
                id,
                name,
                ..Tag::default()
            })
        })
        .await
    }

    async fn delete_tag(&self, id: i64) -> Result<()> {
        self.write(move |conn| {
            let rows = conn.execute("DELETE FROM tag WHERE id = ?1", params![id])?;
            if rows == 0 {
                return Err(Error::TagNotFound);
            }
            Ok(())
        })
        .await
    }

    async fn tag_exists(&self, id: i64) -> Result<bool> {
        self.read(move |conn| row_exists(conn, "tag", id)).await
    }

    // Edges

    async fn add_tag_to_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        self.write(move |conn| {
            ensure_edge_ends(conn, bookmark_id, tag_id)?;
            conn.execute(
                Dialect::Sqlite.insert_edge_sql(),
                params![bookmark_id, tag_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_tag_from_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        self.write(move |conn| {
            ensure_edge_ends(conn, bookmark_id, tag_id)?;
            conn.execute(
                "DELETE FROM bookmark_tag WHERE bookmark_id = ?1 AND tag_id = ?2",
                params![bookmark_id, tag_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn bulk_update_bookmark_tags(&self, bookmark_ids: &[i64], tag_ids: &[i64]) -> Result<()> {
        let bookmark_ids = dedup_ids(bookmark_ids);
        let tag_ids = dedup_ids(tag_ids);

        self.transaction(move |tx| {
            if count_existing(tx, "bookmark", &bookmark_ids)? != bookmark_ids.len() {
                return Err(Error::BookmarkNotFound);
            }
            if count_existing(tx, "tag", &tag_ids)? != tag_ids.len() {
                return Err(Error::TagNotFound);
            }

            let mut stmt = tx.prepare(Dialect::Sqlite.insert_edge_sql())?;
            for bookmark_id in &bookmark_ids {
                for tag_id in &tag_ids {
                    stmt.execute(params![bookmark_id, tag_id])?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.write(|conn| {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                tracing::warn!("WAL checkpoint on close failed: {e}");
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::auth::verify_password;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("shiori.db"), dir.path()).unwrap();
        store.migrate().await.unwrap();
        (dir, store)
    }

    fn bookmark(url: &str, title: &str, tags: &[&str]) -> Bookmark {
        Bookmark {
            url: url.to_string(),
            title: title.to_string(),
            tags: tags.iter().map(|t| Tag::named(*t)).collect(),
            ..Bookmark::default()
        }
    }

    async fn seed(store: &SqliteStore, items: Vec<Bookmark>) -> Vec<Bookmark> {
        store.save_bookmarks(true, items).await.unwrap()
    }

    fn ids(bookmarks: &[Bookmark]) -> Vec<i64> {
        bookmarks.iter().map(|b| b.id).collect()
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let (_dir, store) = open().await;
        let first = store.schema_version().await.unwrap();
        let second = store.migrate().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second, SchemaVersion::new(0, 4, 0));
    }

    #[tokio::test]
    async fn fresh_database_reports_zero_version() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("shiori.db"), dir.path()).unwrap();
        store.init().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SchemaVersion::default());
    }

    #[tokio::test]
    async fn newer_schema_is_refused() {
        let (_dir, store) = open().await;
        store
            .set_schema_version(SchemaVersion::new(2, 0, 0))
            .await
            .unwrap();
        let err = store.migrate().await.unwrap_err();
        assert!(matches!(err, Error::MigrationRequired { .. }));
    }

    #[tokio::test]
    async fn promotes_existing_archives() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("shiori.db"), dir.path()).unwrap();
        let ladder = migrations::migrations_for(Dialect::Sqlite);
        for migration in &ladder[..3] {
            store.apply(migration).await.unwrap();
        }
        let saved = seed(
            &store,
            vec![
                bookmark("https://a.example", "A", &[]),
                bookmark("https://b.example", "B", &[]),
            ],
        )
        .await;

        std::fs::create_dir_all(dir.path().join("archive")).unwrap();
        std::fs::write(dir.path().join(format!("archive/{}", saved[1].id)), b"warc").unwrap();

        store.migrate().await.unwrap();

        let a = store.get_bookmark(saved[0].id, "").await.unwrap().unwrap();
        let b = store.get_bookmark(saved[1].id, "").await.unwrap().unwrap();
        assert_eq!(a.archiver, "");
        assert_eq!(b.archiver, "warc");
        assert_eq!(b.archive_path, format!("archive/{}", saved[1].id));
    }

    #[tokio::test]
    async fn create_assigns_ids_and_timestamps() {
        let (_dir, store) = open().await;
        let saved = seed(&store, vec![bookmark("https://example.com", "Example", &["Go"])]).await;

        let b = &saved[0];
        assert!(b.id > 0);
        assert_eq!(b.created_at, b.modified_at);
        assert_eq!(b.tags.len(), 1);
        assert_eq!(b.tags[0].name, "go");
    }

    #[tokio::test]
    async fn duplicate_url_on_create_fails() {
        let (_dir, store) = open().await;
        seed(&store, vec![bookmark("https://example.com", "One", &[])]).await;

        let err = store
            .save_bookmarks(true, vec![bookmark("https://example.com", "Two", &[])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));
        assert_eq!(
            store
                .get_bookmarks_count(&GetBookmarksOptions::default())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn failed_batch_is_rolled_back() {
        let (_dir, store) = open().await;
        let err = store
            .save_bookmarks(
                true,
                vec![
                    bookmark("https://one.example", "One", &[]),
                    bookmark("https://two.example", "", &[]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(store.get_bookmark(0, "https://one.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_preserves_id_and_created_at() {
        let (_dir, store) = open().await;
        let mut b = seed(&store, vec![bookmark("https://example.com", "Old", &[])])
            .await
            .remove(0);
        let created = b.created_at;

        b.title = "New".into();
        b.created_at = chrono::DateTime::default();
        let updated = store.save_bookmarks(false, vec![b.clone()]).await.unwrap().remove(0);

        assert_eq!(updated.id, b.id);
        assert_eq!(updated.title, "New");
        assert_eq!(updated.created_at, created);
        assert!(updated.modified_at >= updated.created_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let (_dir, store) = open().await;
        let mut b = bookmark("https://example.com", "Example", &[]);
        b.id = 42;
        let err = store.save_bookmarks(false, vec![b]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn deleted_flag_removes_only_the_edge() {
        let (_dir, store) = open().await;
        let mut b = seed(&store, vec![bookmark("https://example.com", "E", &["go", "web"])])
            .await
            .remove(0);

        b.tags = vec![Tag {
            deleted: true,
            ..Tag::named("web")
        }];
        let updated = store.save_bookmarks(false, vec![b]).await.unwrap().remove(0);

        let names: Vec<_> = updated.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["go"]);
        let all = store.get_tags(&ListTagsOptions::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn tag_filters_require_all_and_exclude_any() {
        let (_dir, store) = open().await;
        let saved = seed(
            &store,
            vec![
                bookmark("https://1.example", "One", &["go"]),
                bookmark("https://2.example", "Two", &["go", "draft"]),
                bookmark("https://3.example", "Three", &["rust"]),
                bookmark("https://4.example", "Four", &[]),
            ],
        )
        .await;

        let opts = GetBookmarksOptions {
            tags: vec!["go".into()],
            excluded_tags: vec!["draft".into()],
            ..GetBookmarksOptions::default()
        };
        assert_eq!(ids(&store.get_bookmarks(&opts).await.unwrap()), vec![saved[0].id]);

        let opts = GetBookmarksOptions {
            tags: vec!["go".into(), "draft".into()],
            ..GetBookmarksOptions::default()
        };
        assert_eq!(ids(&store.get_bookmarks(&opts).await.unwrap()), vec![saved[1].id]);

        let untagged = GetBookmarksOptions {
            excluded_tags: vec!["*".into()],
            ..GetBookmarksOptions::default()
        };
        assert_eq!(ids(&store.get_bookmarks(&untagged).await.unwrap()), vec![saved[3].id]);

        let tagged = GetBookmarksOptions {
            tags: vec!["*".into()],
            ..GetBookmarksOptions::default()
        };
        assert_eq!(store.get_bookmarks_count(&tagged).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn keyword_matches_url_or_full_text() {
        let (_dir, store) = open().await;
        let mut with_content = bookmark("https://a.example", "Alpha", &[]);
        with_content.content = "ownership and borrowing explained".into();
        let saved = seed(
            &store,
            vec![with_content, bookmark("https://borrowing.example", "Beta", &[])],
        )
        .await;

        let opts = GetBookmarksOptions {
            keyword: "borrowing".into(),
            ..GetBookmarksOptions::default()
        };
        let found = store.get_bookmarks(&opts).await.unwrap();
        assert_eq!(ids(&found), ids(&saved));
        assert!(found[0].has_content);
        assert!(found[0].content.is_empty());

        let opts = GetBookmarksOptions {
            keyword: "missing \"quote".into(),
            ..GetBookmarksOptions::default()
        };
        assert!(store.get_bookmarks(&opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_text_index_follows_updates() {
        let (_dir, store) = open().await;
        let mut b = seed(&store, vec![bookmark("https://a.example", "Alpha", &[])])
            .await
            .remove(0);
        b.title = "Zeppelin".into();
        store.save_bookmarks(false, vec![b]).await.unwrap();

        let find = |kw: &str| GetBookmarksOptions {
            keyword: kw.into(),
            ..GetBookmarksOptions::default()
        };
        assert_eq!(store.get_bookmarks_count(&find("zeppelin")).await.unwrap(), 1);
        assert_eq!(store.get_bookmarks_count(&find("alpha")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ordering_and_paging() {
        let (_dir, store) = open().await;
        let saved = seed(
            &store,
            (1..=5)
                .map(|i| bookmark(&format!("https://{i}.example"), "T", &[]))
                .collect(),
        )
        .await;
        let all = ids(&saved);

        let page = GetBookmarksOptions {
            order: BookmarkOrder::LastAdded,
            limit: 2,
            offset: 2,
            ..GetBookmarksOptions::default()
        };
        assert_eq!(ids(&store.get_bookmarks(&page).await.unwrap()), vec![all[2], all[1]]);

        let asc = store.get_bookmarks(&GetBookmarksOptions::default()).await.unwrap();
        assert_eq!(ids(&asc), all);
    }

    #[tokio::test]
    async fn delete_cascades_edges() {
        let (_dir, store) = open().await;
        let saved = seed(
            &store,
            vec![
                bookmark("https://1.example", "One", &["go"]),
                bookmark("https://2.example", "Two", &["go"]),
            ],
        )
        .await;

        let deleted = store
            .delete_bookmarks(&DeleteBookmarks::Ids(vec![saved[0].id]))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let tags = store
            .get_tags(&ListTagsOptions {
                with_bookmark_count: true,
                ..ListTagsOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(tags[0].bookmark_count, Some(1));

        let err = store
            .delete_bookmarks(&DeleteBookmarks::Ids(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        store.delete_bookmarks(&DeleteBookmarks::All).await.unwrap();
        assert_eq!(
            store
                .get_bookmarks_count(&GetBookmarksOptions::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn bulk_tagging_is_idempotent_and_checked() {
        let (_dir, store) = open().await;
        let saved = seed(
            &store,
            vec![
                bookmark("https://1.example", "One", &[]),
                bookmark("https://2.example", "Two", &[]),
            ],
        )
        .await;
        let tag = store.create_tags(&["news".into()]).await.unwrap().remove(0);
        let bookmark_ids = ids(&saved);

        let err = store
            .bulk_update_bookmark_tags(&bookmark_ids, &[tag.id + 100])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TagNotFound));
        let err = store
            .bulk_update_bookmark_tags(&[999], &[tag.id])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BookmarkNotFound));

        store.bulk_update_bookmark_tags(&bookmark_ids, &[tag.id]).await.unwrap();
        store.bulk_update_bookmark_tags(&bookmark_ids, &[tag.id]).await.unwrap();

        let counted = store.get_tag(tag.id).await.unwrap().unwrap();
        assert_eq!(counted.bookmark_count, Some(2));
    }

    #[tokio::test]
    async fn tag_registry_operations() {
        let (_dir, store) = open().await;
        let created = store
            .create_tags(&["Rust".into(), "web  dev".into()])
            .await
            .unwrap();
        let again = store.create_tags(&["rust".into()]).await.unwrap();
        assert_eq!(again[0].id, created[0].id);

        let renamed = store.rename_tag(created[0].id, " Systems ").await.unwrap();
        assert_eq!(renamed.name, "systems");

        let err = store.rename_tag(created[1].id, "systems").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists));

        let searched = store
            .get_tags(&ListTagsOptions {
                search: "SYS".into(),
                ..ListTagsOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);

        store.delete_tag(created[1].id).await.unwrap();
        assert!(!store.tag_exists(created[1].id).await.unwrap());
        assert!(matches!(
            store.delete_tag(created[1].id).await.unwrap_err(),
            Error::TagNotFound
        ));
    }

    #[tokio::test]
    async fn bookmark_tags_listing() {
        let (_dir, store) = open().await;
        let b = seed(&store, vec![bookmark("https://1.example", "One", &["b", "a"])])
            .await
            .remove(0);
        seed(&store, vec![bookmark("https://2.example", "Two", &["a"])]).await;

        let tags = store
            .get_tags(&ListTagsOptions {
                bookmark_id: b.id,
                with_bookmark_count: true,
                order_by: TagOrder::Name,
                ..ListTagsOptions::default()
            })
            .await
            .unwrap();
        let summary: Vec<_> = tags
            .iter()
            .map(|t| (t.name.as_str(), t.bookmark_count))
            .collect();
        assert_eq!(summary, vec![("a", Some(2)), ("b", Some(1))]);
    }

    #[tokio::test]
    async fn edges_can_be_added_and_removed() {
        let (_dir, store) = open().await;
        let b = seed(&store, vec![bookmark("https://1.example", "One", &[])])
            .await
            .remove(0);
        let tag = store.create_tags(&["x".into()]).await.unwrap().remove(0);

        store.add_tag_to_bookmark(b.id, tag.id).await.unwrap();
        store.add_tag_to_bookmark(b.id, tag.id).await.unwrap();
        let loaded = store.get_bookmark(b.id, "").await.unwrap().unwrap();
        assert_eq!(loaded.tags.len(), 1);

        store.remove_tag_from_bookmark(b.id, tag.id).await.unwrap();
        let loaded = store.get_bookmark(0, &b.url).await.unwrap().unwrap();
        assert!(loaded.tags.is_empty());

        assert!(matches!(
            store.add_tag_to_bookmark(b.id, 999).await.unwrap_err(),
            Error::TagNotFound
        ));
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let (_dir, store) = open().await;
        let account = store
            .create_account(&NewAccount {
                username: "alice".into(),
                password: "secret".into(),
                owner: true,
                ..NewAccount::default()
            })
            .await
            .unwrap();
        assert!(verify_password("secret", &account.password_hash));

        let duplicate = store
            .create_account(&NewAccount {
                username: "alice".into(),
                password: "other".into(),
                ..NewAccount::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(duplicate, Error::AlreadyExists));

        let updated = store
            .update_account(
                account.id,
                &AccountUpdate {
                    password: Some("changed".into()),
                    config: Some(AccountConfig {
                        theme: "dark".into(),
                        ..AccountConfig::default()
                    }),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(verify_password("changed", &updated.password_hash));
        assert!(!verify_password("secret", &updated.password_hash));
        assert_eq!(updated.config.theme, "dark");
        assert!(updated.owner);

        let owners = store
            .list_accounts(&ListAccountsOptions {
                owner_only: true,
                ..ListAccountsOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(owners.len(), 1);
        assert!(store.get_account_by_username("alice").await.unwrap().is_some());

        store.delete_account(account.id).await.unwrap();
        assert_eq!(store.count_accounts(false).await.unwrap(), 0);
        assert!(store.delete_account(account.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn connections_wait_ten_seconds_for_locks() {
        let (_dir, store) = open().await;
        let read: i64 = store
            .read(|conn| Ok(conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?))
            .await
            .unwrap();
        let write: i64 = store
            .write(|conn| Ok(conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!((read, write), (10_000, 10_000));
    }

    #[tokio::test]
    async fn count_accounts_can_filter_owners() {
        let (_dir, store) = open().await;
        store
            .create_account(&NewAccount {
                username: "visitor".into(),
                password: "pw".into(),
                ..NewAccount::default()
            })
            .await
            .unwrap();
        assert_eq!(store.count_accounts(false).await.unwrap(), 1);
        assert_eq!(store.count_accounts(true).await.unwrap(), 0);

        store
            .create_account(&NewAccount {
                username: "admin".into(),
                password: "pw".into(),
                owner: true,
                ..NewAccount::default()
            })
            .await
            .unwrap();
        assert_eq!(store.count_accounts(false).await.unwrap(), 2);
        assert_eq!(store.count_accounts(true).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn waiting_on_the_writer_does_not_block_the_runtime() {
        let (_dir, store) = open().await;
        let store = Arc::new(store);

        let conns = Arc::clone(&store.conns);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let _guard = conns.writer();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        locked_rx.recv().unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_tags(&["queued".to_string()]).await })
        };

        // Reaching this point at all means the single runtime thread was not
        // parked on the writer lock.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!writer.is_finished());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        let tags = writer.await.unwrap().unwrap();
        assert_eq!(tags[0].name, "queued");
    }

    #[tokio::test]
    async fn deleting_an_account_keeps_bookmarks() {
        let (_dir, store) = open().await;
        let account = store
            .create_account(&NewAccount {
                username: "bob".into(),
                password: "pw".into(),
                ..NewAccount::default()
            })
            .await
            .unwrap();
        seed(&store, vec![bookmark("https://1.example", "One", &[])]).await;

        store.delete_account(account.id).await.unwrap();
        assert_eq!(
            store
                .get_bookmarks_count(&GetBookmarksOptions::default())
                .await
                .unwrap(),
            1
        );
    }
}
