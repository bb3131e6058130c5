//! The service's HTTP health surface: `GET /`, `GET /health`, `GET /status`.
//! Grounded in `rask-log-aggregator/app/src/main.rs`'s axum `Router` +
//! graceful-shutdown wiring, and in `reliability::health`'s
//! `RwLock`-guarded-state + serialized-report pattern, simplified down to
//! the single status object C5/C6 publish into (SPEC_FULL.md §6).

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::info;

/// Mode-specific progress published by C5 (change monitor) or C6 (bulk
/// backfill). The other variant's fields are simply never set.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ModeStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub mode: String,
    #[serde(flatten)]
    pub detail: ModeStatus,
    pub updated_at: String,
}

impl HealthStatus {
    /// Initialized eagerly at startup so `/status` never returns an absent
    /// body, per SPEC_FULL.md §8 property 13.
    pub fn initial(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            detail: ModeStatus::default(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Shared handle C5/C6 hold to publish their status after each cycle.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthStatus>>,
}

impl HealthState {
    pub fn new(mode: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HealthStatus::initial(mode))),
        }
    }

    pub async fn publish(&self, detail: ModeStatus) {
        let mut guard = self.inner.write().await;
        guard.detail = detail;
        guard.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub async fn snapshot(&self) -> HealthStatus {
        self.inner.read().await.clone()
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(ok_handler))
        .route("/health", get(ok_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

async fn ok_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn status_handler(
    axum::extract::State(state): axum::extract::State<HealthState>,
) -> impl IntoResponse {
    axum::Json(state.snapshot().await)
}

/// Serves the health router until a shutdown signal arrives. Returns once
/// the listener has fully stopped.
pub async fn serve(port: u16, state: HealthState) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("health server received SIGINT"),
        _ = terminate => info!("health server received SIGTERM"),
    }
}
