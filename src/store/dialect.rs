use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// SQL engines the store can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Driver name reported by the system info endpoint.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgresql",
        }
    }

    #[must_use]
    pub fn url_scheme(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Dialect::Sqlite => 0,
            Dialect::MySql => 3306,
            Dialect::Postgres => 5432,
        }
    }

    /// Bind placeholder for the `index`-th (1-based) argument.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Idempotent insert of a bookmark/tag edge.
    #[must_use]
    pub fn insert_edge_sql(self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "INSERT OR IGNORE INTO bookmark_tag (bookmark_id, tag_id) VALUES (?, ?)"
            }
            Dialect::MySql => "INSERT IGNORE INTO bookmark_tag (bookmark_id, tag_id) VALUES (?, ?)",
            Dialect::Postgres => {
                "INSERT INTO bookmark_tag (bookmark_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
        }
    }

    /// Suffix for INSERT statements that should hand back the new id.
    #[must_use]
    pub fn returning_id(self) -> &'static str {
        match self {
            Dialect::Postgres => " RETURNING id",
            Dialect::Sqlite | Dialect::MySql => "",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(Error::Config(format!("unsupported DBMS {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("SQLite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("pg".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn placeholders_follow_the_engine() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }
}
