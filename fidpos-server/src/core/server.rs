//! Server Implementation
//!
//! HTTP server startup and graceful shutdown

use tokio::net::TcpListener;
use tracing::info;

use crate::core::{Config, ServerState};
use crate::utils::AppError;

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (for sharing with tests)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config).await?,
        };

        state.start_background_tasks().await;

        let app = crate::api::router(state.clone());

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind {addr}: {e}")))?;
        info!("FidPOS server listening on {addr}");

        let shutdown_state = state.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down...");
            })
            .await
            .map_err(|e| AppError::Internal(format!("Server error: {e}")))?;

        shutdown_state.shutdown_background_tasks().await;

        Ok(())
    }
}
