mod account;
mod bookmarks;
mod commands;
mod indices;
mod open;
mod output;
mod serve;
mod transfer;

pub use account::{run_account_add, run_account_delete, run_account_list};
pub use bookmarks::{run_add, run_check, run_delete, run_print, run_update};
pub use commands::{AccountCommands, ServeArgs};
pub use indices::parse_indices;
pub use open::{OpenMode, run_open};
pub use output::confirm_action;
pub use serve::{run_migrate, run_serve, run_version};
pub use transfer::{run_export, run_import, run_pocket};

use std::sync::Arc;

use crate::config::Config;
use crate::domains::Dependencies;
use crate::store::open_store;

/// Opens the configured store, brings its schema up to date and wires the
/// domain dependencies. Every subcommand except `version` starts here.
pub async fn init_deps(config: Config) -> anyhow::Result<Dependencies> {
    let store = open_store(&config).await?;
    store.init().await?;
    let version = store.migrate().await?;
    tracing::debug!(%version, dialect = %store.dialect(), "Database ready");

    Ok(Dependencies::new(config, Arc::clone(&store))?)
}
