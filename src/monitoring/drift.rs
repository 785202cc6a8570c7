//! Model drift monitor.
//!
//! Tracks prediction-vs-outcome precision and the absolute error between
//! predicted and realized PnL. When either degrades past its threshold the
//! pipeline emits a retraining trigger to an external collaborator; the
//! monitor itself never retrains.
//!
//! Counters are cumulative for the lifetime of the deployed model and reset
//! only on explicit model redeploy. They are mirrored into shared atomics so
//! the `/drift` endpoint can read a consistent snapshot without locking the
//! pipeline (single-writer, multi-reader).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Drift thresholds.
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Precision below this flags drift (default 0.55).
    pub precision_floor: f64,
    /// Absolute PnL estimation error above this flags drift (default 0.002).
    pub pnl_error_cap: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            precision_floor: 0.55,
            pnl_error_cap: 0.002,
        }
    }
}

/// One evaluation result.
#[derive(Debug, Clone, Copy)]
pub struct DriftReport {
    pub precision: f64,
    pub pnl_error: f64,
    pub drift_detected: bool,
}

/// Lock-free stats shared with reporting paths.
#[derive(Debug, Default)]
pub struct DriftStats {
    total: AtomicU64,
    correct: AtomicU64,
    /// Last absolute PnL error, stored as f64 bits.
    pnl_error_bits: AtomicU64,
}

impl DriftStats {
    /// Read-only snapshot: `(total, precision, last_pnl_error)`. Values may
    /// be one trade stale; that is fine for dashboards.
    pub fn snapshot(&self) -> (u64, f64, f64) {
        let total = self.total.load(Ordering::Acquire);
        let correct = self.correct.load(Ordering::Acquire);
        let precision = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        let pnl_error = f64::from_bits(self.pnl_error_bits.load(Ordering::Acquire));
        (total, precision, pnl_error)
    }
}

/// Tracks model quality over completed trades.
pub struct DriftMonitor {
    config: DriftConfig,
    stats: Arc<DriftStats>,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            stats: Arc::new(DriftStats::default()),
        }
    }

    /// Shared handle for the `/drift` endpoint.
    pub fn stats(&self) -> Arc<DriftStats> {
        Arc::clone(&self.stats)
    }

    /// Record one completed trade evaluation.
    ///
    /// `predicted_signal` and `actual_outcome` use the {-1, 0, 1} encoding;
    /// a prediction is correct when they match exactly.
    pub fn update(
        &mut self,
        predicted_signal: i8,
        actual_outcome: i8,
        predicted_pnl: f64,
        actual_pnl: f64,
    ) -> DriftReport {
        let total = self.stats.total.fetch_add(1, Ordering::AcqRel) + 1;
        let correct = if predicted_signal == actual_outcome {
            self.stats.correct.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.stats.correct.load(Ordering::Acquire)
        };

        let precision = correct as f64 / total as f64;
        let pnl_error = (actual_pnl - predicted_pnl).abs();
        self.stats
            .pnl_error_bits
            .store(pnl_error.to_bits(), Ordering::Release);

        let drift_detected =
            precision < self.config.precision_floor || pnl_error > self.config.pnl_error_cap;
        if drift_detected {
            warn!(
                precision,
                pnl_error, total, "model drift detected - retraining trigger warranted"
            );
        }

        DriftReport {
            precision,
            pnl_error,
            drift_detected,
        }
    }

    /// Reset counters. Only called on explicit model redeploy, never during
    /// normal operation.
    pub fn reset(&mut self) {
        self.stats.total.store(0, Ordering::Release);
        self.stats.correct.store(0, Ordering::Release);
        self.stats.pnl_error_bits.store(0, Ordering::Release);
        info!("drift counters reset for model redeploy");
    }
}
