use super::{BOOTSTRAP_ACCOUNT_ID, Dependencies};
use crate::auth::verify_password;
use crate::error::{Error, Result};
use crate::types::{Account, AccountConfig, AccountUpdate, ListAccountsOptions, NewAccount};

/// Changes an account may make to itself.
#[derive(Debug, Clone, Default)]
pub struct SelfUpdate {
    /// Required whenever `new_password` is set.
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub config: Option<AccountConfig>,
}

pub struct AccountsDomain<'a> {
    deps: &'a Dependencies,
}

impl<'a> AccountsDomain<'a> {
    pub(super) fn new(deps: &'a Dependencies) -> Self {
        Self { deps }
    }

    pub async fn list(&self, opts: &ListAccountsOptions) -> Result<Vec<Account>> {
        self.deps.store.list_accounts(opts).await
    }

    pub async fn get(&self, id: i64) -> Result<Account> {
        self.deps.store.get_account(id).await?.ok_or(Error::NotFound)
    }

    pub async fn create(&self, mut account: NewAccount) -> Result<Account> {
        account.username = account.username.trim().to_string();
        validate_username(&account.username)?;
        validate_password("password", &account.password)?;

        let created = self.deps.store.create_account(&account).await?;
        tracing::info!(id = created.id, username = %created.username, "Created account");
        Ok(created)
    }

    /// Admin update: any field, no old password needed.
    pub async fn update(&self, id: i64, mut update: AccountUpdate) -> Result<Account> {
        if update.is_empty() {
            return Err(Error::validation("account", "nothing to update"));
        }
        if let Some(username) = update.username.as_mut() {
            *username = username.trim().to_string();
            validate_username(username)?;
        }
        if let Some(password) = &update.password {
            validate_password("password", password)?;
        }
        self.deps.store.update_account(id, &update).await
    }

    /// Self-service update. A password change is refused unless the old
    /// password matches. The bootstrap account has no row to change.
    pub async fn update_self(&self, id: i64, change: SelfUpdate) -> Result<Account> {
        if id == BOOTSTRAP_ACCOUNT_ID {
            return Err(Error::Forbidden);
        }
        let current = self.get(id).await?;

        let mut update = AccountUpdate {
            config: change.config,
            ..AccountUpdate::default()
        };
        if let Some(new_password) = change.new_password {
            validate_password("new_password", &new_password)?;
            let old = change.old_password.unwrap_or_default();
            if old.is_empty() {
                return Err(Error::validation("old_password", "old password is required"));
            }
            let hash = current.password_hash.clone();
            let matches = tokio::task::spawn_blocking(move || verify_password(&old, &hash))
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            if !matches {
                return Err(Error::validation("old_password", "old password is incorrect"));
            }
            update.password = Some(new_password);
        }

        if update.is_empty() {
            return Ok(current);
        }
        self.deps.store.update_account(id, &update).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.deps.store.delete_account(id).await?;
        tracing::info!(id, "Deleted account");
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::validation("username", "username must not be empty"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(Error::validation("username", "username must not contain spaces"));
    }
    Ok(())
}

fn validate_password(field: &str, password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::validation(field, "password must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::testing;

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            password: "secret".into(),
            ..NewAccount::default()
        }
    }

    #[tokio::test]
    async fn create_validates_input() {
        let (_dir, deps) = testing::deps().await;
        let err = deps.accounts().create(new_account("  ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "username"));

        let err = deps
            .accounts()
            .create(NewAccount {
                password: String::new(),
                ..new_account("alice")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "password"));

        let alice = deps.accounts().create(new_account(" alice ")).await.unwrap();
        assert_eq!(alice.username, "alice");
        assert!(matches!(
            deps.accounts().create(new_account("alice")).await.unwrap_err(),
            Error::AlreadyExists
        ));
    }

    #[tokio::test]
    async fn self_update_requires_old_password() {
        let (_dir, deps) = testing::deps().await;
        let alice = deps.accounts().create(new_account("alice")).await.unwrap();

        let err = deps
            .accounts()
            .update_self(
                alice.id,
                SelfUpdate {
                    new_password: Some("next".into()),
                    ..SelfUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "old_password"));

        let err = deps
            .accounts()
            .update_self(
                alice.id,
                SelfUpdate {
                    old_password: Some("wrong".into()),
                    new_password: Some("next".into()),
                    ..SelfUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let updated = deps
            .accounts()
            .update_self(
                alice.id,
                SelfUpdate {
                    old_password: Some("secret".into()),
                    new_password: Some("next".into()),
                    config: Some(AccountConfig {
                        theme: "dark".into(),
                        ..AccountConfig::default()
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.config.theme, "dark");
        assert!(verify_password("next", &updated.password_hash));
        assert!(!verify_password("secret", &updated.password_hash));
    }

    #[tokio::test]
    async fn bootstrap_account_cannot_update_itself() {
        let (_dir, deps) = testing::deps().await;
        let err = deps
            .accounts()
            .update_self(
                BOOTSTRAP_ACCOUNT_ID,
                SelfUpdate {
                    config: Some(AccountConfig::default()),
                    ..SelfUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[tokio::test]
    async fn admin_update_and_delete() {
        let (_dir, deps) = testing::deps().await;
        let bob = deps.accounts().create(new_account("bob")).await.unwrap();

        let err = deps
            .accounts()
            .update(bob.id, AccountUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let promoted = deps
            .accounts()
            .update(
                bob.id,
                AccountUpdate {
                    owner: Some(true),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(promoted.owner);

        deps.accounts().delete(bob.id).await.unwrap();
        assert!(matches!(
            deps.accounts().get(bob.id).await.unwrap_err(),
            Error::NotFound
        ));
    }
}
