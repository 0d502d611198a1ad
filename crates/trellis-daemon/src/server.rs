//! Server setup and lifecycle.

use crate::api::create_router;
use crate::api::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use std::sync::Arc;
use tokio::net::TcpListener;
use trellis_engine::Engine;
use trellis_store::InMemoryTrellisStore;

/// The Trellis daemon server.
pub struct Server {
    config: DaemonConfig,
    engine: Engine,
}

impl Server {
    /// Build the engine for the configured storage backend.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let engine = match &config.storage {
            StorageConfig::Memory => Engine::from_store(Arc::new(InMemoryTrellisStore::new())),
            #[cfg(feature = "postgres")]
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let store = trellis_store::postgres::PostgresTrellisStore::connect_with_options(
                    url,
                    *max_connections,
                    *connect_timeout_secs,
                )
                .await?;
                Engine::from_store(Arc::new(store))
            }
            #[cfg(not(feature = "postgres"))]
            StorageConfig::Postgres { .. } => {
                return Err(DaemonError::Config(
                    "postgres storage requires the `postgres` feature".to_string(),
                ));
            }
        };

        Ok(Self { config, engine })
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = AppState::new(self.engine);
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "trellis daemon listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("trellis daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
