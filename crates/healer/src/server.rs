//! HTTP server for pushed alert webhooks.
//!
//! Provides REST API endpoints for:
//! - Receiving alert batches (`POST /webhook`)
//! - Health checks (`GET /health`)

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::alert::{Normalize, WebhookAlert};
use crate::policy::PolicyEngine;

/// Default webhook listen port.
pub const DEFAULT_WEBHOOK_PORT: u16 = 5000;

/// Server state shared across handlers.
pub struct ServerState {
    /// Policy engine shared with every request
    pub engine: Arc<PolicyEngine>,
}

impl ServerState {
    /// Create a new server state.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the address.
pub async fn run_server<F>(state: Arc<ServerState>, addr: &str, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;
    info!("Self-healing webhook server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Webhook server failed")?;

    Ok(())
}

// ============================================================================
// Response types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    vm_mapping_count: usize,
}

/// Webhook response.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl WebhookResponse {
    fn success(processed: usize) -> Self {
        Self {
            status: "success",
            processed: Some(processed),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            processed: None,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check handler.
async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        vm_mapping_count: state.engine.mapping().len(),
    })
}

/// Webhook handler - main entry point for pushed alerts.
///
/// The body is parsed element by element so one malformed alert cannot fail
/// the whole batch.
async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> impl IntoResponse {
    if body.iter().all(u8::is_ascii_whitespace) {
        warn!("Received empty webhook body");
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("No data received")),
        );
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Received invalid webhook JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::error(format!("Invalid JSON: {e}"))),
            );
        }
    };

    let Some(raw_alerts) = payload.get("alerts").and_then(serde_json::Value::as_array) else {
        warn!("Webhook payload has no alerts array");
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("Payload must contain an alerts array")),
        );
    };

    let alerts: Vec<_> = raw_alerts
        .iter()
        .map(|value| WebhookAlert::from_value(value).normalize())
        .filter(|alert| alert.firing)
        .collect();

    info!(
        received = raw_alerts.len(),
        firing = alerts.len(),
        "Received alert webhook"
    );

    let engine = Arc::clone(&state.engine);
    match tokio::spawn(async move { engine.handle_batch(&alerts).await }).await {
        Ok(report) => (
            StatusCode::OK,
            Json(WebhookResponse::success(report.processed)),
        ),
        Err(e) => {
            error!(error = %e, "Failed to process webhook alerts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::error(e.to_string())),
            )
        }
    }
}
