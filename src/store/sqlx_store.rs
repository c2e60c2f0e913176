use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::AnyConnection;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};

use super::migrations::{self, Migration, MigrationStep, MigrationTarget, PROMOTE_PAGE_SIZE};
use super::query::{self, IN_LIST_CHUNK, QueryBuilder, SqlValue};
use super::{
    Dialect, SchemaVersion, Store, format_timestamp, normalize_tag_names, now, parse_timestamp,
    validate_bookmark,
};
use crate::auth::hash_password;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::types::*;

const READER_POOL_SIZE: u32 = 8;

/// MySQL and PostgreSQL backend on sqlx's `Any` driver. A single-connection
/// writer pool serializes writes; reads go through a separate pool.
pub struct SqlxStore {
    dialect: Dialect,
    writer: AnyPool,
    reader: AnyPool,
    data_dir: PathBuf,
}

impl SqlxStore {
    pub async fn connect(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        if config.dialect == Dialect::Sqlite {
            return Err(Error::Config("sqlite is served by the rusqlite backend".into()));
        }
        sqlx::any::install_default_drivers();

        let writer = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&config.url)
            .await?;
        let reader = AnyPoolOptions::new()
            .max_connections(READER_POOL_SIZE)
            .connect(&config.url)
            .await?;

        tracing::debug!(dialect = %config.dialect, readers = READER_POOL_SIZE, "Connected to database");

        Ok(Self {
            dialect: config.dialect,
            writer,
            reader,
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn sql(&self, template: &str) -> String {
        rebind(self.dialect, template)
    }
}

/// Rewrites `?` placeholders into `$n` for PostgreSQL.
fn rebind(dialect: Dialect, template: &str) -> String {
    if dialect != Dialect::Postgres {
        return template.to_string();
    }
    let mut out = String::with_capacity(template.len() + 8);
    let mut index = 0;
    for c in template.chars() {
        if c == '?' {
            index += 1;
            out.push_str(&dialect.placeholder(index));
        } else {
            out.push(c);
        }
    }
    out
}

fn bind_all<'q>(sql: &'q str, args: &'q [SqlValue]) -> Query<'q, Any, AnyArguments<'q>> {
    args.iter().fold(sqlx::query(sql), |q, arg| match arg {
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.as_str()),
        SqlValue::Null => q.bind(Option::<String>::None),
    })
}

fn map_write_err(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Error::AlreadyExists;
        }
    }
    Error::Sql(err)
}

/// Integer columns come back as SMALLINT, INT or BIGINT depending on the
/// engine and expression.
fn int(row: &AnyRow, index: usize) -> Result<i64> {
    row.try_get::<i64, _>(index)
        .or_else(|_| row.try_get::<i32, _>(index).map(i64::from))
        .or_else(|_| row.try_get::<i16, _>(index).map(i64::from))
        .map_err(Error::from)
}

fn text(row: &AnyRow, index: usize) -> Result<String> {
    row.try_get::<String, _>(index).map_err(Error::from)
}

fn bookmark_from_row(row: &AnyRow, with_content: bool) -> Result<Bookmark> {
    let mut bookmark = Bookmark {
        id: int(row, 0)?,
        url: text(row, 1)?,
        title: text(row, 2)?,
        excerpt: text(row, 3)?,
        author: text(row, 4)?,
        public: int(row, 5)? != 0,
        created_at: parse_timestamp(&text(row, 6)?),
        modified_at: parse_timestamp(&text(row, 7)?),
        archiver: text(row, 8)?,
        archive_path: text(row, 9)?,
        has_content: int(row, 10)? != 0,
        ..Bookmark::default()
    };
    if with_content {
        bookmark.content = text(row, 11)?;
        bookmark.html = text(row, 12)?;
    }
    Ok(bookmark)
}

fn account_from_row(row: &AnyRow) -> Result<Account> {
    Ok(Account {
        id: int(row, 0)?,
        username: text(row, 1)?,
        password_hash: text(row, 2)?,
        owner: int(row, 3)? != 0,
        config: AccountConfig::from_json(&text(row, 4)?),
    })
}

async fn query_bookmarks(
    conn: &mut AnyConnection,
    dialect: Dialect,
    qb: QueryBuilder,
    with_content: bool,
) -> Result<Vec<Bookmark>> {
    let (sql, args) = qb.build();
    let rows = bind_all(&sql, &args).fetch_all(&mut *conn).await?;
    let mut bookmarks = rows
        .iter()
        .map(|row| bookmark_from_row(row, with_content))
        .collect::<Result<Vec<_>>>()?;
    attach_tags(conn, dialect, &mut bookmarks).await?;
    Ok(bookmarks)
}

async fn attach_tags(
    conn: &mut AnyConnection,
    dialect: Dialect,
    bookmarks: &mut [Bookmark],
) -> Result<()> {
    if bookmarks.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = bookmarks.iter().map(|b| b.id).collect();
    let mut edges: Vec<(i64, Tag)> = Vec::new();

    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let (sql, args) = query::select_tags_for_bookmarks(dialect, chunk).build();
        for row in bind_all(&sql, &args).fetch_all(&mut *conn).await? {
            edges.push((
                int(&row, 0)?,
                Tag {
                    id: int(&row, 1)?,
                    name: text(&row, 2)?,
                    ..Tag::default()
                },
            ));
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

/// Runs an INSERT and returns the generated id.
async fn insert_returning_id(
    conn: &mut AnyConnection,
    dialect: Dialect,
    sql: &str,
    args: &[SqlValue],
) -> Result<i64> {
    if dialect == Dialect::Postgres {
        let sql = format!("{sql}{}", dialect.returning_id());
        let row = bind_all(&sql, args)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_write_err)?;
        return int(&row, 0);
    }

    let result = bind_all(sql, args)
        .execute(&mut *conn)
        .await
        .map_err(map_write_err)?;
    result
        .last_insert_id()
        .ok_or_else(|| Error::Internal("database did not report an inserted id".into()))
}

async fn tag_id_by_name(conn: &mut AnyConnection, dialect: Dialect, name: &str) -> Result<Option<i64>> {
    let sql = rebind(dialect, "SELECT id FROM tag WHERE name = ?");
    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| int(&row, 0)).transpose()
}

async fn ensure_tag(conn: &mut AnyConnection, dialect: Dialect, name: &str) -> Result<Tag> {
    let id = match tag_id_by_name(conn, dialect, name).await? {
        Some(id) => id,
        None => {
            let sql = rebind(dialect, "INSERT INTO tag (name) VALUES (?)");
            insert_returning_id(conn, dialect, &sql, &[SqlValue::from(name)]).await?
        }
    };
    Ok(Tag {
        id,
        name: name.to_string(),
        ..Tag::default()
    })
}

async fn row_exists(conn: &mut AnyConnection, dialect: Dialect, table: &str, id: i64) -> Result<bool> {
    let sql = rebind(dialect, &format!("SELECT COUNT(id) FROM {table} WHERE id = ?"));
    let row = sqlx::query(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(int(&row, 0)? > 0)
}

async fn count_existing(
    conn: &mut AnyConnection,
    dialect: Dialect,
    table: &str,
    ids: &[i64],
) -> Result<usize> {
    let mut found = 0;
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let mut qb = QueryBuilder::new(dialect, format!("SELECT COUNT(id) FROM {table} WHERE id IN "));
        qb.push_in_list(chunk.iter().copied());
        let (sql, args) = qb.build();
        let row = bind_all(&sql, &args).fetch_one(&mut *conn).await?;
        found += usize::try_from(int(&row, 0)?).unwrap_or_default();
    }
    Ok(found)
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

async fn save_bookmark(
    conn: &mut AnyConnection,
    dialect: Dialect,
    create: bool,
    mut bookmark: Bookmark,
) -> Result<Bookmark> {
    validate_bookmark(&bookmark)?;

    let timestamp = now();
    bookmark.modified_at = timestamp;

    if create {
        bookmark.created_at = timestamp;
        let sql = rebind(
            dialect,
            "INSERT INTO bookmark (url, title, excerpt, author, public, content, html,
                 archiver, archive_path, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        );
        let args = [
            SqlValue::from(&bookmark.url),
            SqlValue::from(&bookmark.title),
            SqlValue::from(&bookmark.excerpt),
            SqlValue::from(&bookmark.author),
            SqlValue::from(bookmark.public),
            SqlValue::from(&bookmark.content),
            SqlValue::from(&bookmark.html),
            SqlValue::from(&bookmark.archiver),
            SqlValue::from(&bookmark.archive_path),
            SqlValue::from(format_timestamp(&bookmark.created_at)),
            SqlValue::from(format_timestamp(&bookmark.modified_at)),
        ];
        bookmark.id = insert_returning_id(conn, dialect, &sql, &args).await?;
    } else {
        let sql = rebind(
            dialect,
            "UPDATE bookmark SET url = ?, title = ?, excerpt = ?, author = ?,
                 public = ?, content = ?, html = ?, archiver = ?,
                 archive_path = ?, modified_at = ?
             WHERE id = ?",
        );
        let args = [
            SqlValue::from(&bookmark.url),
            SqlValue::from(&bookmark.title),
            SqlValue::from(&bookmark.excerpt),
            SqlValue::from(&bookmark.author),
            SqlValue::from(bookmark.public),
            SqlValue::from(&bookmark.content),
            SqlValue::from(&bookmark.html),
            SqlValue::from(&bookmark.archiver),
            SqlValue::from(&bookmark.archive_path),
            SqlValue::from(format_timestamp(&bookmark.modified_at)),
            SqlValue::from(bookmark.id),
        ];
        bind_all(&sql, &args)
            .execute(&mut *conn)
            .await
            .map_err(map_write_err)?;

        // MySQL reports zero affected rows for no-op updates, so existence
        // is checked by reading the row back.
        let sql = rebind(dialect, "SELECT created_at FROM bookmark WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(bookmark.id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(Error::BookmarkNotFound)?;
        bookmark.created_at = parse_timestamp(&text(&row, 0)?);
    }

    let delete_edge = rebind(dialect, "DELETE FROM bookmark_tag WHERE bookmark_id = ? AND tag_id = ?");
    for tag in std::mem::take(&mut bookmark.tags) {
        let name = normalize_tag_name(&tag.name);
        if tag.deleted {
            let tag_id = if tag.id > 0 {
                Some(tag.id)
            } else {
                tag_id_by_name(conn, dialect, &name).await?
            };
            if let Some(tag_id) = tag_id {
                sqlx::query(&delete_edge)
                    .bind(bookmark.id)
                    .bind(tag_id)
                    .execute(&mut *conn)
                    .await?;
            }
            continue;
        }
        if name.is_empty() {
            return Err(Error::validation("tags", "tag name must not be empty"));
        }
        let tag = ensure_tag(conn, dialect, &name).await?;
        sqlx::query(dialect.insert_edge_sql())
            .bind(bookmark.id)
            .bind(tag.id)
            .execute(&mut *conn)
            .await?;
    }

    bookmark.has_content = !bookmark.content.is_empty();
    let mut saved = [bookmark];
    attach_tags(conn, dialect, &mut saved).await?;
    let [bookmark] = saved;
    Ok(bookmark)
}

async fn promote_warc_archives(conn: &mut AnyConnection, dialect: Dialect, data_dir: &Path) -> Result<()> {
    let select = rebind(dialect, "SELECT id FROM bookmark WHERE id > ? ORDER BY id ASC LIMIT ?");
    let update = rebind(
        dialect,
        "UPDATE bookmark SET archiver = 'warc', archive_path = ? WHERE id = ?",
    );
    let mut last_id = 0_i64;
    let mut promoted = 0_usize;

    loop {
        let rows = sqlx::query(&select)
            .bind(last_id)
            .bind(PROMOTE_PAGE_SIZE)
            .fetch_all(&mut *conn)
            .await?;
        let ids = rows.iter().map(|row| int(row, 0)).collect::<Result<Vec<_>>>()?;

        let Some(&last) = ids.last() else {
            break;
        };
        last_id = last;

        for id in ids {
            let relative = format!("archive/{id}");
            if data_dir.join(&relative).is_file() {
                sqlx::query(&update)
                    .bind(relative)
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
                promoted += 1;
            }
        }
    }

    tracing::info!(promoted, "Promoted existing WARC archives");
    Ok(())
}

async fn read_schema_version(conn: &mut AnyConnection, dialect: Dialect) -> Result<SchemaVersion> {
    let table_check = match dialect {
        Dialect::MySql => {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = 'shiori_system'"
        }
        _ => {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = 'shiori_system'"
        }
    };
    let row = sqlx::query(table_check).fetch_one(&mut *conn).await?;
    if int(&row, 0)? == 0 {
        return Ok(SchemaVersion::default());
    }

    let row = sqlx::query("SELECT database_schema_version FROM shiori_system LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => text(&row, 0)?.parse(),
        None => Ok(SchemaVersion::default()),
    }
}

async fn write_schema_version(conn: &mut AnyConnection, dialect: Dialect, version: SchemaVersion) -> Result<()> {
    let sql = rebind(dialect, "UPDATE shiori_system SET database_schema_version = ?");
    sqlx::query(&sql)
        .bind(version.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl MigrationTarget for SqlxStore {
    async fn current_version(&self) -> Result<SchemaVersion> {
        let mut conn = self.writer.acquire().await?;
        read_schema_version(&mut conn, self.dialect).await
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        let mut tx = self.writer.begin().await?;

        match migration.step {
            MigrationStep::Script(script) => {
                for statement in query::split_statements(script) {
                    sqlx::query(&statement).execute(&mut *tx).await?;
                }
            }
            MigrationStep::PromoteWarcArchives => {
                promote_warc_archives(&mut tx, self.dialect, &self.data_dir).await?;
            }
        }
        write_schema_version(&mut tx, self.dialect, migration.to).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqlxStore {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn init(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.writer).await?;
        sqlx::query("SELECT 1").execute(&self.reader).await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<SchemaVersion> {
        migrations::run(self, migrations::migrations_for(self.dialect)).await
    }

    async fn schema_version(&self) -> Result<SchemaVersion> {
        let mut conn = self.reader.acquire().await?;
        read_schema_version(&mut conn, self.dialect).await
    }

    async fn set_schema_version(&self, version: SchemaVersion) -> Result<()> {
        let mut conn = self.writer.acquire().await?;
        write_schema_version(&mut conn, self.dialect, version).await
    }

    // Bookmarks

    async fn save_bookmarks(&self, create: bool, bookmarks: Vec<Bookmark>) -> Result<Vec<Bookmark>> {
        let mut tx = self.writer.begin().await?;
        let mut saved = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            saved.push(save_bookmark(&mut tx, self.dialect, create, bookmark).await?);
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn get_bookmarks(&self, opts: &GetBookmarksOptions) -> Result<Vec<Bookmark>> {
        let qb = query::select_bookmarks(self.dialect, opts);
        let mut conn = self.reader.acquire().await?;
        query_bookmarks(&mut conn, self.dialect, qb, opts.with_content).await
    }

    async fn get_bookmarks_count(&self, opts: &GetBookmarksOptions) -> Result<i64> {
        let (sql, args) = query::count_bookmarks(self.dialect, opts).build();
        let row = bind_all(&sql, &args).fetch_one(&self.reader).await?;
        int(&row, 0)
    }

    async fn get_bookmark(&self, id: i64, url: &str) -> Result<Option<Bookmark>> {
        let mut qb = QueryBuilder::new(
            self.dialect,
            format!(
                "SELECT {}{} FROM bookmark b WHERE b.id = ",
                query::BOOKMARK_COLUMNS,
                query::BOOKMARK_CONTENT_COLUMNS
            ),
        );
        qb.push_bind(id).push(" OR b.url = ").push_bind(url).push(" LIMIT 1");

        let mut conn = self.reader.acquire().await?;
        let bookmarks = query_bookmarks(&mut conn, self.dialect, qb, true).await?;
        Ok(bookmarks.into_iter().next())
    }

    async fn delete_bookmarks(&self, target: &DeleteBookmarks) -> Result<u64> {
        let mut tx = self.writer.begin().await?;
        let mut deleted = 0_u64;

        match target {
            DeleteBookmarks::Ids(ids) if ids.is_empty() => {
                return Err(Error::validation("ids", "ids must not be empty"));
            }
            DeleteBookmarks::Ids(ids) => {
                for chunk in ids.chunks(IN_LIST_CHUNK) {
                    let mut qb = QueryBuilder::new(self.dialect, "DELETE FROM bookmark WHERE id IN ");
                    qb.push_in_list(chunk.iter().copied());
                    let (sql, args) = qb.build();
                    deleted += bind_all(&sql, &args).execute(&mut *tx).await?.rows_affected();
                }
            }
            DeleteBookmarks::All => {
                sqlx::query("DELETE FROM bookmark_tag").execute(&mut *tx).await?;
                deleted = sqlx::query("DELETE FROM bookmark")
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn bookmark_exists(&self, id: i64) -> Result<bool> {
        let mut conn = self.reader.acquire().await?;
        row_exists(&mut conn, self.dialect, "bookmark", id).await
    }

    // Accounts

    async fn create_account(&self, account: &NewAccount) -> Result<Account> {
        if account.username.trim().is_empty() {
            return Err(Error::validation("username", "username must not be empty"));
        }
        if account.password.is_empty() {
            return Err(Error::validation("password", "password must not be empty"));
        }

        let hash = hash_password(&account.password)?;
        let sql = self.sql("INSERT INTO account (username, password, owner, config) VALUES (?, ?, ?, ?)");
        let args = [
            SqlValue::from(&account.username),
            SqlValue::from(&hash),
            SqlValue::from(account.owner),
            SqlValue::from(account.config.to_json()),
        ];
        let mut conn = self.writer.acquire().await?;
        let id = insert_returning_id(&mut conn, self.dialect, &sql, &args).await?;

        Ok(Account {
            id,
            username: account.username.clone(),
            password_hash: hash,
            owner: account.owner,
            config: account.config.clone(),
        })
    }

    async fn update_account(&self, id: i64, update: &AccountUpdate) -> Result<Account> {
        if let Some(username) = &update.username {
            if username.trim().is_empty() {
                return Err(Error::validation("username", "username must not be empty"));
            }
        }
        let hash = match update.password.as_deref() {
            Some("") => return Err(Error::validation("password", "password must not be empty")),
            Some(plain) => Some(hash_password(plain)?),
            None => None,
        };

        let mut conn = self.writer.acquire().await?;
        if let Some(qb) = query::update_account(self.dialect, id, update, hash.as_deref()) {
            let (sql, args) = qb.build();
            bind_all(&sql, &args)
                .execute(&mut *conn)
                .await
                .map_err(map_write_err)?;
        }

        let sql = self.sql(&format!("SELECT {} FROM account WHERE id = ?", query::ACCOUNT_COLUMNS));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(Error::NotFound)?;
        account_from_row(&row)
    }

    async fn list_accounts(&self, opts: &ListAccountsOptions) -> Result<Vec<Account>> {
        let (sql, args) = query::select_accounts(self.dialect, opts).build();
        let rows = bind_all(&sql, &args).fetch_all(&self.reader).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let sql = self.sql(&format!("SELECT {} FROM account WHERE id = ?", query::ACCOUNT_COLUMNS));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.reader).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let sql = self.sql(&format!(
            "SELECT {} FROM account WHERE username = ?",
            query::ACCOUNT_COLUMNS
        ));
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.reader)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn delete_account(&self, id: i64) -> Result<()> {
        let sql = self.sql("DELETE FROM account WHERE id = ?");
        let result = sqlx::query(&sql).bind(id).execute(&self.writer).await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn count_accounts(&self, owner_only: bool) -> Result<i64> {
        let sql = if owner_only {
            "SELECT COUNT(id) FROM account WHERE owner = 1"
        } else {
            "SELECT COUNT(id) FROM account"
        };
        let row = sqlx::query(sql)
            .fetch_one(&self.reader)
            .await?;
        int(&row, 0)
    }

    // Tags

    async fn create_tags(&self, names: &[String]) -> Result<Vec<Tag>> {
        let names = normalize_tag_names(names)?;
        let mut tx = self.writer.begin().await?;
        let mut tags = Vec::with_capacity(names.len());
        for name in &names {
            tags.push(ensure_tag(&mut tx, self.dialect, name).await?);
        }
        tx.commit().await?;
        Ok(tags)
    }

    async fn get_tags(&self, opts: &ListTagsOptions) -> Result<Vec<Tag>> {
        let (sql, args) = query::select_tags(self.dialect, opts).build();
        let rows = bind_all(&sql, &args).fetch_all(&self.reader).await?;
        rows.iter()
            .map(|row| {
                Ok(Tag {
                    id: int(row, 0)?,
                    name: text(row, 1)?,
                    bookmark_count: if opts.with_bookmark_count {
                        Some(int(row, 2)?)
                    } else {
                        None
                    },
                    ..Tag::default()
                })
            })
            .collect()
    }

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>> {
        let sql = self.sql(
            "SELECT t.id, t.name,
                 (SELECT COUNT(bt.tag_id) FROM bookmark_tag bt WHERE bt.tag_id = t.id)
             FROM tag t WHERE t.id = ?",
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.reader).await?;
        row.map(|row| {
            Ok(Tag {
                id: int(&row, 0)?,
                name: text(&row, 1)?,
                bookmark_count: Some(int(&row, 2)?),
                ..Tag::default()
            })
        })
        .transpose()
    }

    async fn rename_tag(&self, id: i64, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Err(Error::validation("name", "tag name must not be empty"));
        }
        let mut conn = self.writer.acquire().await?;
        if !row_exists(&mut conn, self.dialect, "tag", id).await? {
            return Err(Error::TagNotFound);
        }
        let sql = self.sql("UPDATE tag SET name = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(name.as_str())
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(map_write_err)?;
        Ok(Tag {
            id,
            name,
            ..Tag::default()
        })
    }

    async fn delete_tag(&self, id: i64) -> Result<()> {
        let sql = self.sql("DELETE FROM tag WHERE id = ?");
        let result = sqlx::query(&sql).bind(id).execute(&self.writer).await?;
        if result.rows_affected() == 0 {
            return Err(Error::TagNotFound);
        }
        Ok(())
    }

    async fn tag_exists(&self, id: i64) -> Result<bool> {
        let mut conn = self.reader.acquire().await?;
        row_exists(&mut conn, self.dialect, "tag", id).await
    }

    // Edges

    async fn add_tag_to_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        let mut conn = self.writer.acquire().await?;
        if !row_exists(&mut conn, self.dialect, "bookmark", bookmark_id).await? {
            return Err(Error::BookmarkNotFound);
        }
        if !row_exists(&mut conn, self.dialect, "tag", tag_id).await? {
            return Err(Error::TagNotFound);
        }
        sqlx::query(self.dialect.insert_edge_sql())
            .bind(bookmark_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove_tag_from_bookmark(&self, bookmark_id: i64, tag_id: i64) -> Result<()> {
        let mut conn = self.writer.acquire().await?;
        if !row_exists(&mut conn, self.dialect, "bookmark", bookmark_id).await? {
            return Err(Error::BookmarkNotFound);
        }
        if !row_exists(&mut conn, self.dialect, "tag", tag_id).await? {
            return Err(Error::TagNotFound);
        }
        let sql = self.sql("DELETE FROM bookmark_tag WHERE bookmark_id = ? AND tag_id = ?");
        sqlx::query(&sql)
            .bind(bookmark_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn bulk_update_bookmark_tags(&self, bookmark_ids: &[i64], tag_ids: &[i64]) -> Result<()> {
        let bookmark_ids = dedup_ids(bookmark_ids);
        let tag_ids = dedup_ids(tag_ids);

        let mut tx = self.writer.begin().await?;

        if count_existing(&mut tx, self.dialect, "bookmark", &bookmark_ids).await? != bookmark_ids.len() {
            return Err(Error::BookmarkNotFound);
        }
        if count_existing(&mut tx, self.dialect, "tag", &tag_ids).await? != tag_ids.len() {
            return Err(Error::TagNotFound);
        }

        for bookmark_id in &bookmark_ids {
            for tag_id in &tag_ids {
                sqlx::query(self.dialect.insert_edge_sql())
                    .bind(*bookmark_id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.writer.close().await;
        self.reader.close().await;
        Ok(())
    }
}
