use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use super::commands::ServeArgs;
use super::init_deps;
use crate::config::{Config, normalize_root_path};
use crate::domains::Dependencies;
use crate::server::{AppState, BUILD_INFO, create_router};

pub async fn run_serve(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(address) = args.address {
        config.http.address = address;
    }
    if let Some(root_path) = args.root_path {
        config.http.root_path = normalize_root_path(&root_path);
    }
    config.http.access_log |= args.access_log;

    let addr = config.http.socket_addr()?;
    let deps = init_deps(config).await?;
    let store = Arc::clone(&deps.store);
    let root_path = deps.config.http.root_path.clone();

    let app = create_router(Arc::new(AppState::new(deps)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting server on http://{addr}{root_path}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    store.close().await?;
    Ok(())
}

pub(super) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutting down");
}

/// Migrations already ran while opening the store; this reports the result.
pub async fn run_migrate(deps: &Dependencies) -> anyhow::Result<()> {
    let version = deps.store.schema_version().await?;
    println!(
        "Database ({}) is at schema version {version}",
        deps.store.dialect()
    );
    Ok(())
}

pub fn run_version() {
    println!(
        "shiori {} (commit {}, built {})",
        BUILD_INFO.version, BUILD_INFO.commit, BUILD_INFO.date
    );
}
