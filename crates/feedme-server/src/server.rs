//! The ambient HTTP surface: an Axum router exposing `/health`, driven by
//! the same [`ShutdownCoordinator`] pattern the rest of the process uses.
//!
//! This is deliberately separate from the transport's own `start`/`stop`:
//! a host embedding this crate in deployment Modes B/C supplies its own
//! HTTP listener (which may or may not be this one), and the transport
//! core never assumes it owns the process's only HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    start_time: Instant,
    connections: Arc<AtomicUsize>,
}

/// The ambient `/health` HTTP server.
pub struct HealthServer {
    host: String,
    port: u16,
    start_time: Instant,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl HealthServer {
    /// Build a health server bound to `host:port`. `0` selects an
    /// OS-assigned ephemeral port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            host: host.into(),
            port,
            start_time: Instant::now(),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }

    /// A counter the host can update as connections join and leave, so
    /// `/health` reports a live count.
    #[must_use]
    pub fn connection_counter(&self) -> Arc<AtomicUsize> {
        self.connections.clone()
    }

    /// Build the Axum router.
    fn router(&self) -> Router {
        let state = AppState {
            start_time: self.start_time,
            connections: self.connections.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::with_status_code(
                axum::http::StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(10),
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and start serving. Returns the bound address and a join
    /// handle that resolves once the shutdown coordinator's token fires.
    #[instrument(skip_all, fields(host = %self.host, port = self.port))]
    pub async fn listen(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "health server listening");

        let router = self.router();
        let shutdown_token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                })
                .await;
            info!("health server shutdown complete");
        });

        Ok((bound_addr, handle))
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Relaxed);
    Json(health::health_check(state.start_time, connections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> HealthServer {
        HealthServer::new("127.0.0.1", 0, Arc::new(ShutdownCoordinator::new()))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn connection_counter_reflected_in_health() {
        let server = make_server();
        server.connection_counter().fetch_add(3, Ordering::Relaxed);
        let app = server.router();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["connections"], 3);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
}
