//! HTTP server for the Prometheus metrics endpoint.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::registry::SharedRegistry;

/// Liveness route, served alongside the metrics path.
pub const HEALTH_PATH: &str = "/health";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
}

/// Create the HTTP router.
pub fn create_router(registry: SharedRegistry, metrics_path: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.registry.render();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Exposition server bound to its listen address.
pub struct HttpServer {
    registry: SharedRegistry,
    listener: TcpListener,
    metrics_path: String,
}

impl HttpServer {
    /// Bind the listen address. Failing here is fatal for the exporter.
    pub async fn bind(
        registry: SharedRegistry,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", listen_addr, e))?;

        Ok(Self {
            registry,
            listener,
            metrics_path,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let addr = self.local_addr()?;
        let router = create_router(self.registry, &self.metrics_path);

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Wait for `signal`. Fails if the server task ends first, for any reason.
pub async fn supervise<F>(
    server: &mut JoinHandle<anyhow::Result<()>>,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => Ok(()),
        joined = server => {
            joined
                .context("HTTP server task panicked")?
                .context("HTTP server failed")?;
            anyhow::bail!("HTTP server stopped unexpectedly")
        }
    }
}
