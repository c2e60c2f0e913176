use std::path::{Path, PathBuf};

use super::Env;
use crate::error::{Error, Result};
use crate::store::Dialect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub dialect: Dialect,
    /// Connection string. For SQLite this is `sqlite://<path>`.
    pub url: String,
}

impl DatabaseConfig {
    pub const SQLITE_FILE_NAME: &'static str = "shiori.db";

    #[must_use]
    pub fn sqlite(path: PathBuf) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            url: format!("sqlite://{}", path.display()),
        }
    }

    /// Path of the SQLite database file, if this is a SQLite configuration.
    #[must_use]
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        if self.dialect != Dialect::Sqlite {
            return None;
        }
        self.url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))
            .map(PathBuf::from)
    }

    /// Parses a full connection URL, using the scheme to pick the dialect.
    pub fn from_url(url: &str, data_dir: &Path) -> Result<Self> {
        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("database url {url:?} has no scheme")))?;

        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => {
                let path = rest.trim_start_matches("//");
                if path.is_empty() {
                    Ok(Self::sqlite(data_dir.join(Self::SQLITE_FILE_NAME)))
                } else {
                    Ok(Self::sqlite(PathBuf::from(path)))
                }
            }
            "mysql" | "mariadb" => Ok(Self {
                dialect: Dialect::MySql,
                url: format!("mysql:{rest}"),
            }),
            "postgres" | "postgresql" => Ok(Self {
                dialect: Dialect::Postgres,
                url: format!("postgres:{rest}"),
            }),
            other => Err(Error::Config(format!("unsupported database scheme {other:?}"))),
        }
    }

    pub(crate) fn from_env<F>(env: &Env<F>, data_dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env.string("DATABASE_URL") {
            return Self::from_url(&url, data_dir);
        }

        let dbms = env.string("DBMS").unwrap_or_else(|| "sqlite".to_string());
        let dialect: Dialect = dbms.parse()?;

        if dialect == Dialect::Sqlite {
            return Ok(Self::sqlite(data_dir.join(Self::SQLITE_FILE_NAME)));
        }

        let host = env.string("DB_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = env.string("DB_PORT").unwrap_or_else(|| dialect.default_port().to_string());
        let user = env
            .string("DB_USER")
            .ok_or_else(|| Error::Config("SHIORI_DB_USER is required for this DBMS".into()))?;
        let pass = env.string("DB_PASS").unwrap_or_default();
        let name = env.string("DB_NAME").unwrap_or_else(|| "shiori".to_string());

        let credentials = if pass.is_empty() {
            urlencoding::encode(&user).into_owned()
        } else {
            format!(
                "{}:{}",
                urlencoding::encode(&user),
                urlencoding::encode(&pass)
            )
        };

        let mut url = format!(
            "{}://{credentials}@{host}:{port}/{name}",
            dialect.url_scheme()
        );
        if dialect == Dialect::Postgres {
            if let Some(sslmode) = env.string("DB_SSLMODE") {
                url.push_str(&format!("?sslmode={sslmode}"));
            }
        }

        Ok(Self { dialect, url })
    }
}
