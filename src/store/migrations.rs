//! Versioned schema migrations.
//!
//! Each dialect carries its own ladder of `from -> to` steps. The runner
//! reads the recorded version, applies the step whose `from` matches, and
//! repeats until nothing matches. A backend applies a step and records its
//! `to` version in one transaction, so a failed step leaves the recorded
//! version untouched.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use super::Dialect;
use crate::error::{Error, Result};

/// `major.minor.patch` version recorded in `shiori_system`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let mut parts = s.split('.');
        let mut next = || -> Result<u32> {
            parts
                .next()
                .ok_or_else(|| Error::Internal(format!("invalid schema version: {s:?}")))?
                .parse()
                .map_err(|_| Error::Internal(format!("invalid schema version: {s:?}")))
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(Error::Internal(format!("invalid schema version: {s:?}")));
        }
        Ok(version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// Embedded SQL, possibly several statements.
    Script(&'static str),
    /// Marks bookmarks whose `archive/<id>` file already exists as WARC
    /// archived.
    PromoteWarcArchives,
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub step: MigrationStep,
}

impl Migration {
    const fn script(from: SchemaVersion, to: SchemaVersion, sql: &'static str) -> Self {
        Self {
            from,
            to,
            step: MigrationStep::Script(sql),
        }
    }
}

const V0_0_0: SchemaVersion = SchemaVersion::new(0, 0, 0);
const V0_1_0: SchemaVersion = SchemaVersion::new(0, 1, 0);
const V0_2_0: SchemaVersion = SchemaVersion::new(0, 2, 0);
const V0_3_0: SchemaVersion = SchemaVersion::new(0, 3, 0);
const V0_4_0: SchemaVersion = SchemaVersion::new(0, 4, 0);

/// Bookmarks inspected per page by the archive promotion step.
pub(crate) const PROMOTE_PAGE_SIZE: i64 = 50;

const PROMOTE_WARC: Migration = Migration {
    from: V0_3_0,
    to: V0_4_0,
    step: MigrationStep::PromoteWarcArchives,
};

const SQLITE: [Migration; 4] = [
    Migration::script(V0_0_0, V0_1_0, include_str!("migrations/sqlite/0000_system.sql")),
    Migration::script(V0_1_0, V0_2_0, include_str!("migrations/sqlite/0001_initial.sql")),
    Migration::script(V0_2_0, V0_3_0, include_str!("migrations/sqlite/0002_fulltext.sql")),
    PROMOTE_WARC,
];

const MYSQL: [Migration; 4] = [
    Migration::script(V0_0_0, V0_1_0, include_str!("migrations/mysql/0000_system.sql")),
    Migration::script(V0_1_0, V0_2_0, include_str!("migrations/mysql/0001_initial.sql")),
    Migration::script(V0_2_0, V0_3_0, include_str!("migrations/mysql/0002_fulltext.sql")),
    PROMOTE_WARC,
];

const POSTGRES: [Migration; 4] = [
    Migration::script(V0_0_0, V0_1_0, include_str!("migrations/postgres/0000_system.sql")),
    Migration::script(V0_1_0, V0_2_0, include_str!("migrations/postgres/0001_initial.sql")),
    Migration::script(V0_2_0, V0_3_0, include_str!("migrations/postgres/0002_fulltext.sql")),
    PROMOTE_WARC,
];

#[must_use]
pub fn migrations_for(dialect: Dialect) -> &'static [Migration] {
    match dialect {
        Dialect::Sqlite => &SQLITE,
        Dialect::MySql => &MYSQL,
        Dialect::Postgres => &POSTGRES,
    }
}

/// Newest version reachable through `migrations`.
#[must_use]
pub fn latest_version(migrations: &[Migration]) -> SchemaVersion {
    migrations.iter().map(|m| m.to).max().unwrap_or_default()
}

/// A database the runner can read a version from and apply steps to.
#[async_trait]
pub(crate) trait MigrationTarget: Send + Sync {
    /// Recorded version, or `0.0.0` when the system table does not exist.
    async fn current_version(&self) -> Result<SchemaVersion>;

    /// Applies `migration.step` and records `migration.to`, atomically.
    async fn apply(&self, migration: &Migration) -> Result<()>;
}

/// Brings `target` up to the newest version in `migrations`. Running it on
/// an up-to-date database is a no-op.
pub(crate) async fn run<T>(target: &T, migrations: &[Migration]) -> Result<SchemaVersion>
where
    T: MigrationTarget + ?Sized,
{
    let latest = latest_version(migrations);
    let mut current = target.current_version().await?;

    if current > latest {
        return Err(Error::MigrationRequired {
            current,
            expected: latest,
        });
    }

    while let Some(migration) = migrations.iter().find(|m| m.from == current) {
        tracing::info!(from = %migration.from, to = %migration.to, "Applying migration");

        target
            .apply(migration)
            .await
            .map_err(|e| Error::Migration {
                from: migration.from,
                to: migration.to,
                reason: e.to_string(),
            })?;

        current = migration.to;
    }

    if current != latest {
        return Err(Error::MigrationRequired {
            current,
            expected: latest,
        });
    }

    Ok(current)
}
