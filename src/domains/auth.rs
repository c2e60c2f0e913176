use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Dependencies;
use crate::auth::{REFRESH_LIFETIME, REMEMBER_ME_LIFETIME, SESSION_LIFETIME, verify_password};
use crate::error::{Error, Result};
use crate::types::{Account, AccountConfig};

/// Account id carried by tokens minted through the bootstrap login.
pub const BOOTSTRAP_ACCOUNT_ID: i64 = 0;

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub remember_me: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires: DateTime<Utc>,
    pub account: Account,
}

pub struct AuthDomain<'a> {
    deps: &'a Dependencies,
}

impl<'a> AuthDomain<'a> {
    pub(super) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    /// Checks the credentials and mints a token.
    ///
    /// While no owner account exists, the configured default credentials
    /// log in as a synthetic owner unless that rule is disabled.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let lifetime = if request.remember_me {
            REMEMBER_ME_LIFETIME
        } else {
            SESSION_LIFETIME
        };

        if let Some(account) = self.bootstrap_account().await? {
            let http = &self.deps.config.http;
            if request.username == http.default_username && request.password == http.default_password {
                tracing::warn!("Logged in with the default account; create a real owner account");
                return self.issue(account, lifetime);
            }
        }

        let account = self
            .deps
            .store
            .get_account_by_username(request.username.trim())
            .await?
            .ok_or(Error::InvalidCredentials)?;

        let password = request.password.clone();
        let hash = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        if !matches {
            return Err(Error::InvalidCredentials);
        }

        self.issue(account, lifetime)
    }

    /// A fresh long-lived token for an already authenticated account.
    pub fn refresh(&self, account: Account) -> Result<LoginResponse> {
        self.issue(account, REFRESH_LIFETIME)
    }

    /// Resolves a bearer token to its account.
    ///
    /// A bootstrap token stays valid until it expires, even after real
    /// owners have been created with it.
    pub async fn check_token(&self, token: &str) -> Result<Account> {
        let claims = self.deps.tokens.validate(token)?;
        if claims.account_id == BOOTSTRAP_ACCOUNT_ID {
            if self.deps.config.http.disable_default_account {
                return Err(Error::Unauthorized);
            }
            return Ok(self.synthetic_owner());
        }
        self.deps
            .store
            .get_account(claims.account_id)
            .await?
            .ok_or(Error::Unauthorized)
    }

    /// Account asserted by the SSO proxy header, if it exists.
    pub async fn sso_account(&self, username: &str) -> Result<Option<Account>> {
        self.deps.store.get_account_by_username(username).await
    }

    /// The synthetic owner, available only while no owner account exists.
    pub async fn bootstrap_account(&self) -> Result<Option<Account>> {
        if self.deps.config.http.disable_default_account
            || self.deps.store.count_accounts(true).await? > 0
        {
            return Ok(None);
        }
        Ok(Some(self.synthetic_owner()))
    }

    fn synthetic_owner(&self) -> Account {
        Account {
            id: BOOTSTRAP_ACCOUNT_ID,
            username: self.deps.config.http.default_username.clone(),
            password_hash: String::new(),
            owner: true,
            config: AccountConfig::default(),
        }
    }

    fn issue(&self, account: Account, lifetime: chrono::Duration) -> Result<LoginResponse> {
        let issued = self.deps.tokens.issue(account.id, lifetime)?;
        Ok(LoginResponse {
            token: issued.token,
            expires: issued.expires,
            account,
        })
    }
}
