//! HTTP server for health and metrics endpoints
//!
//! - GET /health  - JSON snapshot of relayer progress
//! - GET /healthz - liveness
//! - GET /readyz  - ready once a cycle has completed
//! - GET /metrics - Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::{eyre, WrapErr};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::metrics;

/// Relayer statistics shared between the relay loop and the HTTP server
#[derive(Debug, Default, Clone, Serialize)]
pub struct RelayerStats {
    pub cursor_round: u64,
    /// Last observed source head, if any lookup has succeeded
    pub head_round: Option<u64>,
    pub released: usize,
    pub receiver_ineligible: usize,
    pub consecutive_failures: u32,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub type SharedStats = Arc<RwLock<RelayerStats>>;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: RelayerStats,
}

async fn health_check(State(stats): State<SharedStats>) -> Json<HealthResponse> {
    let stats = stats.read().await.clone();
    let status = if stats.consecutive_failures == 0 {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse { status, stats })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe (ready once the loop has completed a cycle)
async fn readiness(State(stats): State<SharedStats>) -> Response {
    if stats.read().await.cycles_completed > 0 {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}

async fn prometheus_metrics() -> Response {
    match metrics::gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response(),
    }
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(stats)
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_addr: &str, stats: SharedStats) -> eyre::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}: {}", bind_addr, e))?;
    info!("Health server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(stats)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readiness_tracks_completed_cycles() {
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
        let response = readiness(State(stats.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        stats.write().await.cycles_completed = 1;
        let response = readiness(State(stats)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_degraded_after_failures() {
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats {
            cursor_round: 120,
            consecutive_failures: 2,
            ..Default::default()
        }));
        let Json(body) = health_check(State(stats)).await;
        assert_eq!(body.status, "degraded");
        assert_eq!(body.stats.cursor_round, 120);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["cursor_round"], 120);
        assert_eq!(json["status"], "degraded");
    }
}
