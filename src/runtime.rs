//! Process lifecycle.
//!
//! Runs the sync engine and the read API as two independent tasks under one
//! [`ShutdownController`]. A signal or a server failure cancels both; they are
//! then awaited for at most the configured grace period and aborted after it.

use std::sync::Arc;

use chrono::Datelike;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::{Config, ConfigError};
use crate::storage::{init_storage, DelegationStore, StorageError};
use crate::sync::SyncEngine;
use crate::upstream::{DelegationSource, TzktClient, UpstreamError};
use crate::utils::shutdown::ShutdownController;

/// Errors that stop the process.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Upstream client initialization failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Task failed: {0}")]
    Task(#[from] JoinError),
}

/// Start everything from configuration and run until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<(), RuntimeError> {
    let store = init_storage(&config.storage).await?;
    let source: Arc<dyn DelegationSource> = Arc::new(TzktClient::new(&config.upstream)?);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RuntimeError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let controller = Arc::new(ShutdownController::new());
    let signals = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.wait_for_signal().await })
    };

    let result = serve_until_shutdown(listener, store, source, &config, controller).await;
    signals.abort();
    result
}

/// Run both tasks on an already bound listener until `controller` fires.
pub async fn serve_until_shutdown(
    listener: TcpListener,
    store: Arc<dyn DelegationStore>,
    source: Arc<dyn DelegationSource>,
    config: &Config,
    controller: Arc<ShutdownController>,
) -> Result<(), RuntimeError> {
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "HTTP server listening");
    }

    let engine = SyncEngine::new(source, store.clone(), config.sync.clone());
    let mut sync_task = tokio::spawn(engine.run(controller.subscribe()));

    let app = api::router(
        AppState::new(store, config.sync.genesis.year())
            .with_request_timeout(config.server.request_timeout()),
    );
    let mut server_task: JoinHandle<std::io::Result<()>> = {
        let signal = controller.subscribe();
        let controller = controller.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = &result {
                error!(error = %e, "HTTP server failed, shutting down");
            }
            controller.shutdown();
            result
        })
    };

    controller.subscribe().cancelled().await;
    info!("Shutdown requested, waiting for tasks");

    let grace = config.server.shutdown_grace();
    let joined = tokio::time::timeout(grace, async {
        tokio::join!(&mut sync_task, &mut server_task)
    })
    .await;

    match joined {
        Ok((sync_result, server_result)) => {
            if let Err(e) = sync_result {
                error!(error = %e, "Sync task panicked");
            }
            server_result?.map_err(RuntimeError::Serve)?;
            info!("Service stopped gracefully");
            Ok(())
        }
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, aborting tasks");
            sync_task.abort();
            server_task.abort();
            Ok(())
        }
    }
}
