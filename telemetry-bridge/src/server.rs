//! WebSocket server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use telemetry_core::SubscriberRegistry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::error::{Error, Result};
use crate::ws;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8081;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or IP address to bind
    pub bind_address: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// State shared by every connection.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub cancel_token: CancellationToken,
}

/// WebSocket server that turns every connection into a telemetry subscriber.
pub struct TelemetryServer {
    config: ServerConfig,
    state: AppState,
}

impl TelemetryServer {
    pub fn new(
        config: ServerConfig,
        registry: Arc<SubscriberRegistry>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: AppState {
                registry,
                cancel_token,
            },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router. Upgrades are accepted on any path.
    pub fn build_router(&self) -> Router {
        Router::new()
            .fallback(ws::telemetry_ws)
            .with_state(self.state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG)),
            )
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port))
            .await
            .map_err(|e| {
                Error::server(format!(
                    "Failed to bind {}:{}: {e}",
                    self.config.bind_address, self.config.port
                ))
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Telemetry server listening on ws://{}", addr);

        let cancel_token = self.state.cancel_token.clone();
        axum::serve(
            listener,
            self.build_router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("Telemetry server shutting down...");
        })
        .await
        .map_err(|e| Error::server(format!("Server error: {e}")))?;

        Ok(())
    }
}
