//! Status and Metrics Endpoint
//!
//! HTTP endpoint exposing connection state, the live feed, consumer refresh
//! state, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status report
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (200 only while CONNECTED)
//! - `GET /feed` - feed buffer snapshot, newest first
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ConsumerProbe, RefreshStatus, TradeFeed};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::SubscriptionStats;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::stomp::ConnectionManager;

// =============================================================================
// Response Types
// =============================================================================

/// `/health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Client version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Push transport status.
    pub connection: ConnectionInfo,
    /// Events held by the feed buffer.
    pub feed_size: usize,
    /// Registry statistics.
    pub subscriptions: SubscriptionStats,
    /// Refresh state of every consumer.
    pub consumers: Vec<RefreshStatus>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Connected.
    Healthy,
    /// Connecting or disconnected; recovers on its own.
    Degraded,
    /// Retries exhausted; needs an explicit reconnect.
    Unhealthy,
}

impl HealthStatus {
    /// Health implied by a connection state.
    #[must_use]
    pub const fn from_connection(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Failed => Self::Unhealthy,
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Error => Self::Degraded,
        }
    }
}

/// Push transport status.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Current state.
    pub state: ConnectionState,
    /// Boolean projection of `state`.
    pub connected: bool,
    /// Consecutive protocol faults.
    pub attempts: u32,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the status server.
pub struct StatusState {
    version: String,
    started_at: Instant,
    manager: Arc<ConnectionManager>,
    feed: Arc<TradeFeed>,
    consumers: Vec<Arc<dyn ConsumerProbe>>,
}

impl StatusState {
    /// Create server state.
    #[must_use]
    pub fn new(
        version: String,
        manager: Arc<ConnectionManager>,
        feed: Arc<TradeFeed>,
        consumers: Vec<Arc<dyn ConsumerProbe>>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            manager,
            feed,
            consumers,
        }
    }
}

/// Routes served by the status server.
pub fn router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/feed", get(feed_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Status Server
// =============================================================================

/// Status HTTP server.
pub struct StatusServer {
    port: u16,
    state: Arc<StatusState>,
    cancel: CancellationToken,
}

impl StatusServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<StatusState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StatusServerError` if binding fails or the server stops with
    /// an error.
    pub async fn run(self) -> Result<(), StatusServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StatusServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Status server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| StatusServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Status server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    if state.manager.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn feed_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(state.feed.snapshot())
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &StatusState) -> HealthResponse {
    let connection = state.manager.state();

    HealthResponse {
        status: HealthStatus::from_connection(connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            state: connection,
            connected: connection.is_connected(),
            attempts: state.manager.attempts(),
        },
        feed_size: state.feed.len(),
        subscriptions: state.manager.registry().stats(),
        consumers: state.consumers.iter().map(|c| c.status()).collect(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Status server errors.
#[derive(Debug, thiserror::Error)]
pub enum StatusServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
