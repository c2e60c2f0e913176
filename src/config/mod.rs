//! Runtime configuration.
//!
//! Every key is read from the environment with a `SHIORI_` prefix. A `.env`
//! file in the working directory is loaded first, so values there behave
//! exactly like exported variables (already-exported variables win).

mod database;
mod server;

pub use database::DatabaseConfig;
pub use server::{HttpConfig, normalize_root_path};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "SHIORI_";
pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Failed to load .env file: {e}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Keys are passed
    /// with their `SHIORI_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let data_dir = env
            .string("DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let database = DatabaseConfig::from_env(&env, &data_dir)?;
        let http = HttpConfig::from_env(&env)?;

        Ok(Self {
            data_dir,
            database,
            http,
        })
    }

    /// A configuration suitable for tests and embedding: SQLite inside
    /// `data_dir`, defaults everywhere else, and a fixed secret.
    #[must_use]
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            database: DatabaseConfig::sqlite(data_dir.join(DatabaseConfig::SQLITE_FILE_NAME)),
            http: HttpConfig::default(),
        }
    }
}

pub(crate) struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.trim().is_empty())
    }

    pub(crate) fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!("{ENV_PREFIX}{key}: expected a boolean, got {raw:?}"))
            }),
        }
    }

    pub(crate) fn number<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_PREFIX}{key}: expected a number, got {raw:?}"))
            }),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::Dialect;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_to_sqlite_in_data_dir() {
        let config = config_from(&[("SHIORI_DIR", "/srv/shiori")]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/shiori"));
        assert_eq!(config.database.dialect, Dialect::Sqlite);
        assert_eq!(
            config.database.sqlite_path(),
            Some(PathBuf::from("/srv/shiori/shiori.db"))
        );
        assert_eq!(config.http.port, 8080);
        assert!(config.http.access_log);
        assert!(config.http.serve_web_ui);
        assert!(!config.http.sso_proxy_auth);
        assert_eq!(config.http.root_path, "/");
    }

    #[test]
    fn parses_booleans_loosely() {
        let config = config_from(&[
            ("SHIORI_HTTP_ACCESS_LOG", "False"),
            ("SHIORI_HTTP_SERVE_WEB_UI", "0"),
            ("SHIORI_HTTP_SSO_PROXY_AUTH", "yes"),
        ])
        .unwrap();
        assert!(!config.http.access_log);
        assert!(!config.http.serve_web_ui);
        assert!(config.http.sso_proxy_auth);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = config_from(&[("SHIORI_HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("SHIORI_HTTP_PORT")));

        let err = config_from(&[("SHIORI_HTTP_ACCESS_LOG", "maybe")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("SHIORI_HTTP_PORT", "  ")]).unwrap();
        assert_eq!(config.http.port, 8080);
    }
}
