//! Prometheus Metrics Module
//!
//! Pre-registered metrics for production observability. All gauges are
//! written by the pipeline worker (via the observer in `pipeline`) and read
//! by the `/metrics` endpoint; counters are monotonic and lock-free.

use lazy_static::lazy_static;
use prometheus::{
    opts, register_gauge, register_int_counter, register_int_counter_vec, Encoder, Gauge,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // --- Market / feature gauges ---

    /// Latest observed spread between the cross rate and its implied value
    pub static ref SPREAD: Gauge = register_gauge!(
        opts!("triarb_spread", "Observed minus implied cross rate")
    ).expect("FATAL: Failed to register SPREAD metric - check for duplicate registration");

    /// Latest volatility feature
    pub static ref VOLATILITY: Gauge = register_gauge!(
        opts!("triarb_volatility", "Rolling volatility feature")
    ).expect("FATAL: Failed to register VOLATILITY metric - check for duplicate registration");

    /// Latest order book imbalance feature
    pub static ref IMBALANCE: Gauge = register_gauge!(
        opts!("triarb_imbalance", "Order book imbalance feature")
    ).expect("FATAL: Failed to register IMBALANCE metric - check for duplicate registration");

    // --- Score gauges ---

    /// Model confidence of the latest decision
    pub static ref CONFIDENCE_SCORE: Gauge = register_gauge!(
        opts!("triarb_confidence_score", "Model confidence of latest decision")
    ).expect("FATAL: Failed to register CONFIDENCE_SCORE metric - check for duplicate registration");

    /// Anomaly score of the latest decision
    pub static ref ANOMALY_SCORE: Gauge = register_gauge!(
        opts!("triarb_anomaly_score", "Anomaly score of latest decision")
    ).expect("FATAL: Failed to register ANOMALY_SCORE metric - check for duplicate registration");

    /// Cointegration stability of the latest decision
    pub static ref COINTEGRATION_SCORE: Gauge = register_gauge!(
        opts!("triarb_cointegration_score", "Cointegration stability score")
    ).expect("FATAL: Failed to register COINTEGRATION_SCORE metric - check for duplicate registration");

    /// Composite score of the latest decision
    pub static ref COMPOSITE_SCORE: Gauge = register_gauge!(
        opts!("triarb_composite_score", "Weighted composite signal score")
    ).expect("FATAL: Failed to register COMPOSITE_SCORE metric - check for duplicate registration");

    // --- PnL / risk gauges ---

    /// Total PnL (realized + unrealized)
    pub static ref PNL: Gauge = register_gauge!(
        opts!("triarb_pnl", "Total PnL, realized plus unrealized")
    ).expect("FATAL: Failed to register PNL metric - check for duplicate registration");

    /// Raised to 1 while unhedged residual exposure exists (operator alert)
    pub static ref UNHEDGED_EXPOSURE: Gauge = register_gauge!(
        opts!("triarb_unhedged_exposure", "1 while unhedged residual exposure remains")
    ).expect("FATAL: Failed to register UNHEDGED_EXPOSURE metric - check for duplicate registration");

    // --- Drift gauges ---

    /// Precision of model predictions over time
    pub static ref MODEL_PRECISION: Gauge = register_gauge!(
        opts!("triarb_model_precision", "Precision of model predictions over time")
    ).expect("FATAL: Failed to register MODEL_PRECISION metric - check for duplicate registration");

    /// Prediction PnL delta vs actual
    pub static ref MODEL_PNL_ERROR: Gauge = register_gauge!(
        opts!("triarb_model_pnl_error", "Prediction PnL delta vs actual")
    ).expect("FATAL: Failed to register MODEL_PNL_ERROR metric - check for duplicate registration");

    /// Liveness heartbeat (unix seconds of last tick)
    pub static ref HEARTBEAT: Gauge = register_gauge!(
        opts!("triarb_heartbeat", "Unix timestamp of last pipeline heartbeat")
    ).expect("FATAL: Failed to register HEARTBEAT metric - check for duplicate registration");

    // --- Counters ---

    /// Decisions by outcome
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("triarb_decisions_total", "Decisions emitted"),
        &["decision"]
    ).expect("FATAL: Failed to register DECISIONS_TOTAL metric - check for duplicate registration");

    /// Orders executed (by pair, side, status)
    pub static ref ORDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("triarb_orders_total", "Orders executed"),
        &["pair", "side", "status"]
    ).expect("FATAL: Failed to register ORDERS_TOTAL metric - check for duplicate registration");

    /// Full triangle trades completed successfully
    pub static ref SUCCESSFUL_CYCLES: IntCounter = register_int_counter!(
        opts!("triarb_successful_cycles", "Full triangle trades completed successfully")
    ).expect("FATAL: Failed to register SUCCESSFUL_CYCLES metric - check for duplicate registration");

    /// Number of emergency hedge trades executed
    pub static ref HEDGE_TRADES: IntCounter = register_int_counter!(
        opts!("triarb_hedge_trades", "Number of emergency hedge trades executed")
    ).expect("FATAL: Failed to register HEDGE_TRADES metric - check for duplicate registration");

    /// Total model predictions scored
    pub static ref PREDICTIONS_TOTAL: IntCounter = register_int_counter!(
        opts!("triarb_total_predictions", "Total number of model predictions evaluated")
    ).expect("FATAL: Failed to register PREDICTIONS_TOTAL metric - check for duplicate registration");
}

/// Record an executed order outcome.
pub fn record_order(pair: &str, side: &str, success: bool) {
    let status = if success { "filled" } else { "failed" };
    ORDERS_TOTAL.with_label_values(&[pair, side, status]).inc();
}

/// Record a decision outcome.
pub fn record_decision(decision: &str) {
    DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

/// Get metrics as text for the /metrics endpoint.
///
/// Encoding errors degrade to an empty body rather than panicking.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode Prometheus metrics: {}", e);
        return String::new();
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Prometheus metrics buffer is not valid UTF-8: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_contains_registered_names() {
        record_decision("HOLD");
        record_order("BTCUSDT", "buy", true);
        SPREAD.set(0.0001);

        let output = gather_metrics();
        assert!(
            output.contains("triarb"),
            "Expected metrics output to contain 'triarb', got: {}",
            &output[..output.len().min(200)]
        );
    }
}
