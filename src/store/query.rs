//! Dialect-aware SQL construction shared by every backend.
//!
//! Builders only produce `(sql, args)` pairs; executing them is left to the
//! backend. Values are always bound, IN-lists included, never interpolated.

use std::collections::BTreeSet;

use super::Dialect;
use crate::types::{
    AccountUpdate, BookmarkOrder, GetBookmarksOptions, ListAccountsOptions, ListTagsOptions,
    TagOrder,
};

/// Maximum number of ids bound into a single IN-list.
pub(crate) const IN_LIST_CHUNK: usize = 500;

/// Columns selected for every bookmark row, in decode order.
pub(crate) const BOOKMARK_COLUMNS: &str = "b.id, b.url, b.title, b.excerpt, b.author, b.public, \
     b.created_at, b.modified_at, b.archiver, b.archive_path, \
     CASE WHEN b.content <> '' THEN 1 ELSE 0 END AS has_content";

/// Appended to [`BOOKMARK_COLUMNS`] when content is requested.
pub(crate) const BOOKMARK_CONTENT_COLUMNS: &str = ", b.content, b.html";

/// Wildcard tag meaning "any tag" (required) or "no tag" (excluded).
pub const ANY_TAG: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Null,
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Dialect,
    sql: String,
    args: Vec<SqlValue>,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect, sql: impl Into<String>) -> Self {
        Self {
            dialect,
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.args.push(value.into());
        let placeholder = self.dialect.placeholder(self.args.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Appends `(p1, p2, ...)`. An empty list renders `(NULL)`, which
    /// matches nothing.
    pub fn push_in_list<I, T>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        self.sql.push('(');
        let mut first = true;
        for value in values {
            if !first {
                self.sql.push_str(", ");
            }
            first = false;
            self.push_bind(value);
        }
        if first {
            self.sql.push_str("NULL");
        }
        self.sql.push(')');
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    #[must_use]
    pub fn build(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.args)
    }
}

/// Listing query for bookmarks, honoring every filter plus order and paging.
#[must_use]
pub fn select_bookmarks(dialect: Dialect, opts: &GetBookmarksOptions) -> QueryBuilder {
    let content = if opts.with_content {
        BOOKMARK_CONTENT_COLUMNS
    } else {
        ""
    };
    let mut qb = QueryBuilder::new(
        dialect,
        format!("SELECT {BOOKMARK_COLUMNS}{content} FROM bookmark b WHERE 1 = 1"),
    );
    push_bookmark_filters(&mut qb, opts);

    qb.push(match opts.order {
        BookmarkOrder::Default => " ORDER BY b.id ASC",
        BookmarkOrder::LastAdded => " ORDER BY b.id DESC",
        BookmarkOrder::LastModified => " ORDER BY b.modified_at DESC, b.id ASC",
    });

    if opts.limit > 0 {
        qb.push(" LIMIT ")
            .push_bind(opts.limit)
            .push(" OFFSET ")
            .push_bind(opts.offset.max(0));
    }

    qb
}

/// Same filters as [`select_bookmarks`], returning a single count.
#[must_use]
pub fn count_bookmarks(dialect: Dialect, opts: &GetBookmarksOptions) -> QueryBuilder {
    let mut qb = QueryBuilder::new(dialect, "SELECT COUNT(b.id) FROM bookmark b WHERE 1 = 1");
    push_bookmark_filters(&mut qb, opts);
    qb
}

fn push_bookmark_filters(qb: &mut QueryBuilder, opts: &GetBookmarksOptions) {
    if !opts.ids.is_empty() {
        qb.push(" AND b.id IN ").push_in_list(opts.ids.iter().copied());
    }

    let keyword = opts.keyword.trim();
    if !keyword.is_empty() {
        push_keyword_filter(qb, keyword);
    }

    let include_any = opts.tags.iter().any(|t| t == ANY_TAG);
    let exclude_any = opts.excluded_tags.iter().any(|t| t == ANY_TAG);

    if exclude_any {
        qb.push(" AND b.id NOT IN (SELECT DISTINCT bookmark_id FROM bookmark_tag)");
    } else if include_any {
        qb.push(" AND b.id IN (SELECT DISTINCT bookmark_id FROM bookmark_tag)");
    }

    let required: BTreeSet<&str> = opts
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| *t != ANY_TAG)
        .collect();
    if !required.is_empty() {
        qb.push(
            " AND b.id IN (SELECT bt.bookmark_id FROM bookmark_tag bt \
             INNER JOIN tag t ON t.id = bt.tag_id WHERE t.name IN ",
        )
        .push_in_list(required.iter().copied())
        .push(" GROUP BY bt.bookmark_id HAVING COUNT(bt.bookmark_id) = ")
        .push_bind(required.len())
        .push(")");
    }

    let excluded: BTreeSet<&str> = opts
        .excluded_tags
        .iter()
        .map(String::as_str)
        .filter(|t| *t != ANY_TAG)
        .collect();
    if !excluded.is_empty() && !exclude_any {
        qb.push(
            " AND b.id NOT IN (SELECT DISTINCT bt.bookmark_id FROM bookmark_tag bt \
             INNER JOIN tag t ON t.id = bt.tag_id WHERE t.name IN ",
        )
        .push_in_list(excluded.iter().copied())
        .push(")");
    }
}

fn push_keyword_filter(qb: &mut QueryBuilder, keyword: &str) {
    let like = format!("%{keyword}%");
    qb.push(" AND (b.url LIKE ").push_bind(like).push(" OR ");

    match qb.dialect {
        Dialect::Sqlite => {
            qb.push("b.id IN (SELECT rowid FROM bookmark_fts WHERE bookmark_fts MATCH ")
                .push_bind(fts5_phrase(keyword))
                .push(")");
        }
        Dialect::MySql => {
            qb.push("MATCH(b.title, b.excerpt, b.content) AGAINST (")
                .push_bind(mysql_boolean_phrase(keyword))
                .push(" IN BOOLEAN MODE)");
        }
        Dialect::Postgres => {
            qb.push("b.search_vector @@ plainto_tsquery('simple', ")
                .push_bind(keyword)
                .push(")");
        }
    }

    qb.push(")");
}

/// Quotes a keyword as a single FTS5 phrase so user input cannot inject
/// query syntax.
#[must_use]
pub fn fts5_phrase(keyword: &str) -> String {
    format!("\"{}\"", keyword.replace('"', "\"\""))
}

/// Quotes a keyword as a MySQL boolean-mode phrase.
#[must_use]
pub fn mysql_boolean_phrase(keyword: &str) -> String {
    format!("\"{}\"", keyword.replace('"', " "))
}

/// Tags attached to any of `bookmark_ids`, ordered by name.
#[must_use]
pub fn select_tags_for_bookmarks(dialect: Dialect, bookmark_ids: &[i64]) -> QueryBuilder {
    let mut qb = QueryBuilder::new(
        dialect,
        "SELECT bt.bookmark_id, t.id, t.name FROM bookmark_tag bt \
         INNER JOIN tag t ON t.id = bt.tag_id WHERE bt.bookmark_id IN ",
    );
    qb.push_in_list(bookmark_ids.iter().copied())
        .push(" ORDER BY t.name ASC");
    qb
}

/// Tag listing. Selected columns are `id, name` plus `bookmark_count` when
/// counting.
#[must_use]
pub fn select_tags(dialect: Dialect, opts: &ListTagsOptions) -> QueryBuilder {
    let mut qb = QueryBuilder::new(dialect, "SELECT t.id, t.name");
    let search = opts.search.trim().to_lowercase();

    if opts.bookmark_id > 0 {
        if opts.with_bookmark_count {
            qb.push(
                ", (SELECT COUNT(bt2.tag_id) FROM bookmark_tag bt2 WHERE bt2.tag_id = t.id) \
                 AS bookmark_count",
            );
        }
        qb.push(" FROM tag t INNER JOIN bookmark_tag bt ON bt.tag_id = t.id AND bt.bookmark_id = ")
            .push_bind(opts.bookmark_id);
        if !search.is_empty() {
            qb.push(" WHERE LOWER(t.name) LIKE ")
                .push_bind(format!("%{search}%"));
        }
    } else if opts.with_bookmark_count {
        qb.push(
            ", COUNT(bt.tag_id) AS bookmark_count FROM tag t \
             LEFT JOIN bookmark_tag bt ON bt.tag_id = t.id",
        );
        if !search.is_empty() {
            qb.push(" WHERE LOWER(t.name) LIKE ")
                .push_bind(format!("%{search}%"));
        }
        qb.push(" GROUP BY t.id, t.name");
    } else {
        qb.push(" FROM tag t");
        if !search.is_empty() {
            qb.push(" WHERE LOWER(t.name) LIKE ")
                .push_bind(format!("%{search}%"));
        }
    }

    if opts.order_by == TagOrder::Name {
        qb.push(" ORDER BY t.name ASC");
    } else {
        qb.push(" ORDER BY t.id ASC");
    }

    qb
}

/// Columns selected for every account row, in decode order.
pub(crate) const ACCOUNT_COLUMNS: &str = "id, username, password, owner, config";

#[must_use]
pub fn select_accounts(dialect: Dialect, opts: &ListAccountsOptions) -> QueryBuilder {
    let mut qb = QueryBuilder::new(
        dialect,
        format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE 1 = 1"),
    );

    let keyword = opts.keyword.trim();
    if !keyword.is_empty() {
        qb.push(" AND username LIKE ").push_bind(format!("%{keyword}%"));
    }
    if !opts.username.is_empty() {
        qb.push(" AND username = ").push_bind(opts.username.as_str());
    }
    if opts.owner_only {
        qb.push(" AND owner = ").push_bind(1_i64);
    }

    qb.push(" ORDER BY username ASC");
    qb
}

/// Partial update; `password_hash` replaces the stored hash when set.
/// Returns `None` when nothing would change.
#[must_use]
pub fn update_account(
    dialect: Dialect,
    id: i64,
    update: &AccountUpdate,
    password_hash: Option<&str>,
) -> Option<QueryBuilder> {
    let mut qb = QueryBuilder::new(dialect, "UPDATE account SET ");
    let mut first = true;
    let mut set = |qb: &mut QueryBuilder, column: &str, value: SqlValue| {
        if !first {
            qb.push(", ");
        }
        first = false;
        qb.push(column).push(" = ").push_bind(value);
    };

    if let Some(username) = &update.username {
        set(&mut qb, "username", username.into());
    }
    if let Some(hash) = password_hash {
        set(&mut qb, "password", hash.into());
    }
    if let Some(owner) = update.owner {
        set(&mut qb, "owner", owner.into());
    }
    if let Some(config) = &update.config {
        set(&mut qb, "config", config.to_json().into());
    }

    if first {
        return None;
    }

    qb.push(" WHERE id = ").push_bind(id);
    Some(qb)
}

/// Splits a multi-statement script into individual statements. Scripts
/// must not contain `;` inside literals.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let stripped: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
