use anyhow::bail;

use super::output::confirm_action;
use crate::domains::Dependencies;
use crate::error::Error;
use crate::types::{AccountConfig, ListAccountsOptions, NewAccount};

pub async fn run_account_add(
    deps: &Dependencies,
    username: String,
    password: Option<String>,
    owner: bool,
) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => inquire::Password::new("Password:")
            .with_display_mode(inquire::PasswordDisplayMode::Masked)
            .prompt()?,
    };

    let account = NewAccount {
        username,
        password,
        owner,
        config: AccountConfig::default(),
    };
    let account = match deps.accounts().create(account).await {
        Ok(account) => account,
        Err(Error::AlreadyExists) => bail!("Username already exists"),
        Err(e) => return Err(e.into()),
    };

    println!("Created account '{}' (id {})", account.username, account.id);
    Ok(())
}

pub async fn run_account_list(deps: &Dependencies, search: Option<String>) -> anyhow::Result<()> {
    let opts = ListAccountsOptions {
        keyword: search.unwrap_or_default(),
        ..ListAccountsOptions::default()
    };
    let accounts = deps.accounts().list(&opts).await?;

    if accounts.is_empty() {
        println!("No accounts found");
        return Ok(());
    }
    for account in accounts {
        let role = if account.owner { "owner" } else { "visitor" };
        println!("{}\t{}\t{role}", account.id, account.username);
    }
    Ok(())
}

pub async fn run_account_delete(deps: &Dependencies, id: i64, yes: bool) -> anyhow::Result<()> {
    let account = match deps.accounts().get(id).await {
        Ok(account) => account,
        Err(Error::NotFound) => bail!("Account {id} not found"),
        Err(e) => return Err(e.into()),
    };

    if !confirm_action(&format!("Delete account '{}'?", account.username), yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    deps.accounts().delete(id).await?;
    println!("Deleted account '{}'", account.username);
    Ok(())
}
