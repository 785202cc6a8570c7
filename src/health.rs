//! Health, metrics, PnL and drift HTTP endpoints.
//!
//! Serves the observability surface on a single axum router:
//! `/health` (liveness + breaker/risk state), `/metrics` (prometheus text),
//! `/pnl` (current book snapshot), `/drift` (model quality). All handlers
//! read only atomics, gauges and watch channels, so they never contend with
//! the pipeline worker.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::metrics;
use crate::monitoring::DriftStats;
use crate::portfolio::PnlSummary;
use crate::resilience::ExecutionBreaker;
use crate::risk::{DailyLossLimiter, RiskStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub breaker_state: String,
    pub risk_status: String,
    pub uptime_seconds: u64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct DriftResponse {
    pub evaluated_trades: u64,
    pub precision: f64,
    pub pnl_error: f64,
}

/// Read-only handles shared with the HTTP layer.
#[derive(Clone)]
pub struct HealthState {
    started_at: Instant,
    daily: Arc<DailyLossLimiter>,
    breaker: Arc<ExecutionBreaker>,
    drift: Arc<DriftStats>,
    pnl: watch::Receiver<PnlSummary>,
}

impl HealthState {
    pub fn new(
        daily: Arc<DailyLossLimiter>,
        breaker: Arc<ExecutionBreaker>,
        drift: Arc<DriftStats>,
        pnl: watch::Receiver<PnlSummary>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            daily,
            breaker,
            drift,
            pnl,
        }
    }
}

async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let risk_status = state.daily.status();
    let status = if risk_status == RiskStatus::Halted || state.breaker.is_open() {
        "critical"
    } else if risk_status == RiskStatus::Warning {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        breaker_state: state.breaker.state().to_string(),
        risk_status: risk_status.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().timestamp(),
    })
}

async fn metrics_endpoint() -> String {
    metrics::gather_metrics()
}

async fn pnl_endpoint(State(state): State<HealthState>) -> Json<PnlSummary> {
    Json(state.pnl.borrow().clone())
}

async fn drift_endpoint(State(state): State<HealthState>) -> Json<DriftResponse> {
    let (evaluated_trades, precision, pnl_error) = state.drift.snapshot();
    Json(DriftResponse {
        evaluated_trades,
        precision,
        pnl_error,
    })
}

/// Run the HTTP surface. A failed bind logs and returns; the trading
/// pipeline continues without its observability endpoints.
pub async fn run_health_server(port: u16, state: HealthState) {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/pnl", get(pnl_endpoint))
        .route("/drift", get(drift_endpoint))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("health server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(
                "health server failed to bind {}: {}. Continuing without HTTP endpoints.",
                addr,
                e
            );
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("health server failed: {}", e);
    }
}
