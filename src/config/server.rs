use std::net::SocketAddr;

use rand::RngCore;

use super::Env;
use crate::auth::Cidr;
use crate::error::{Error, Result};

const SECRET_KEY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
    /// Bind address. Empty means all interfaces.
    pub address: String,
    /// Prefix the router is nested under, always starting and ending with `/`.
    pub root_path: String,
    pub secret_key: Vec<u8>,
    pub access_log: bool,
    pub serve_web_ui: bool,
    pub sso_proxy_auth: bool,
    pub sso_proxy_auth_header_name: String,
    pub sso_proxy_auth_trusted: Vec<Cidr>,
    /// Turns off the "empty account table accepts the default credentials" rule.
    pub disable_default_account: bool,
    pub default_username: String,
    pub default_password: String,
}

impl HttpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.address.trim().trim_end_matches(':');
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        format!("{host}:{}", self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {e}")))
    }

    pub(crate) fn from_env<F>(env: &Env<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let secret_key = match env.string("HTTP_SECRET_KEY") {
            Some(key) => key.into_bytes(),
            None => {
                tracing::warn!(
                    "SHIORI_HTTP_SECRET_KEY is not set, using a random value. Issued tokens will stop working after a restart."
                );
                random_secret()
            }
        };

        let sso_proxy_auth_trusted = match env.string("HTTP_SSO_PROXY_AUTH_TRUSTED") {
            Some(list) => Cidr::parse_list(&list)?,
            None => defaults.sso_proxy_auth_trusted,
        };

        Ok(Self {
            port: env.number("HTTP_PORT", defaults.port)?,
            address: env.string("HTTP_ADDRESS").unwrap_or(defaults.address),
            root_path: normalize_root_path(
                &env.string("HTTP_ROOT_PATH").unwrap_or(defaults.root_path),
            ),
            secret_key,
            access_log: env.bool("HTTP_ACCESS_LOG", defaults.access_log)?,
            serve_web_ui: env.bool("HTTP_SERVE_WEB_UI", defaults.serve_web_ui)?,
            sso_proxy_auth: env.bool("HTTP_SSO_PROXY_AUTH", defaults.sso_proxy_auth)?,
            sso_proxy_auth_header_name: env
                .string("HTTP_SSO_PROXY_AUTH_HEADER_NAME")
                .unwrap_or(defaults.sso_proxy_auth_header_name),
            sso_proxy_auth_trusted,
            disable_default_account: env.bool(
                "HTTP_DISABLE_DEFAULT_ACCOUNT",
                defaults.disable_default_account,
            )?,
            default_username: env
                .string("DEFAULT_USERNAME")
                .unwrap_or(defaults.default_username),
            default_password: env
                .string("DEFAULT_PASSWORD")
                .unwrap_or(defaults.default_password),
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            address: String::new(),
            root_path: "/".to_string(),
            secret_key: random_secret(),
            access_log: true,
            serve_web_ui: true,
            sso_proxy_auth: false,
            sso_proxy_auth_header_name: "Remote-User".to_string(),
            sso_proxy_auth_trusted: Cidr::private_networks(),
            disable_default_account: false,
            default_username: "shiori".to_string(),
            default_password: "gopher".to_string(),
        }
    }
}

fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; SECRET_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn normalize_root_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
