//! Signal generation: feature schema, score sources, and the composite
//! decision engine that fuses them.

pub mod anomaly;
pub mod cointegration;
pub mod composite;
pub mod features;
pub mod model;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::signal::features::FeatureVector;
use crate::types::OrderSide;

/// Final trade decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// One decision with every intermediate score attached for audit.
///
/// Created once per decision cycle and immutable afterwards; consumed by the
/// risk gate, the execution layer, and the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub side: Option<OrderSide>,
    /// Human-readable reason, stable across releases for audit queries.
    pub reason: &'static str,
    pub z_score: f64,
    /// Raw model class in {-1, 0, 1} (fail-open +1 when no model).
    pub model_signal: i8,
    pub confidence: f64,
    pub anomaly: f64,
    pub cointegration_stability: f64,
    /// Weighted fusion of confidence, stability and inverse anomaly.
    pub composite_score: f64,
    pub kalman_alpha: f64,
    pub kalman_beta: f64,
    pub features: FeatureVector,
}

impl Signal {
    /// True when the decision is actionable (not Hold).
    pub fn is_actionable(&self) -> bool {
        self.decision != Decision::Hold
    }
}
