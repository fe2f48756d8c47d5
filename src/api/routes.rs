//! HTTP surface of the sweeper
//!
//! Serves the sweep endpoint alongside health checks and Prometheus metrics
//! using Axum.

use crate::metrics::MetricsCollector;
use crate::service::health::{HealthCheck, HealthStatus, ServiceStatus};
use crate::sweeper::ExpirySweeper;
use crate::types::SweepResponse;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Path the scheduler calls; `/` is accepted too
pub const SWEEP_PATH: &str = "/cancel-expired-appointments";

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Cross-origin headers attached to every sweep endpoint response
fn cors_headers() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
    ]
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for request handlers
#[derive(Clone)]
pub struct ApiState {
    pub sweeper: ExpirySweeper,
    pub metrics: Arc<MetricsCollector>,
    pub status: Arc<ServiceStatus>,
    pub service_name: String,
}

/// Build the application router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", any(sweep_handler))
        .route(SWEEP_PATH, any(sweep_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// HTTP server hosting the sweep, health and metrics endpoints
pub struct HttpServer {
    config: HttpServerConfig,
    state: ApiState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: ApiState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Start the server and run until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid HTTP server address")?;

        let app = router(self.state.clone());
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("HTTP server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Stop the server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping HTTP server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }

        Ok(())
    }
}

/// Sweep endpoint: any method runs a sweep, OPTIONS answers the CORS pre-flight
async fn sweep_handler(State(state): State<ApiState>, method: Method) -> Response {
    if method == Method::OPTIONS {
        debug!("Answering CORS pre-flight");
        return (StatusCode::OK, cors_headers(), "ok").into_response();
    }

    debug!("Sweep requested via {}", method);

    let result = state.sweeper.sweep().await;
    state.status.record_sweep(&result).await;

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            cors_headers(),
            Json(SweepResponse::success(outcome.cancelled)),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            cors_headers(),
            Json(SweepResponse::failure(e.to_string())),
        )
            .into_response(),
    }
}

/// Liveness endpoint handler
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Health check requested");

    let health = HealthCheck::check(&state.status, &state.service_name).await;
    state.metrics.update_health_status(health.status.as_gauge());

    let code = match HealthCheck::liveness_check(&state.status).await {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (code, Json(health))
}

/// Readiness endpoint handler
async fn ready_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match HealthCheck::check(&state.status, &state.service_name)
        .await
        .status
    {
        HealthStatus::Healthy => (StatusCode::OK, "Ready"),
        HealthStatus::Degraded => (StatusCode::OK, "Degraded but ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<ApiState>) -> Response {
    debug!("Metrics endpoint requested");

    let uptime = chrono::Utc::now() - state.status.started_at();
    state
        .metrics
        .service()
        .uptime_seconds
        .set(uptime.num_seconds());

    let metric_families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to encode metrics" })),
            )
                .into_response()
        }
    }
}
