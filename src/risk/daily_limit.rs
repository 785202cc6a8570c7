//! Daily loss circuit breaker.
//!
//! Tracks cumulative realized PnL for the trading day and halts all new
//! trading once the configured loss limit is breached. The halt latches
//! until an explicit daily reset; there is no automatic re-enable.
//!
//! # Precision
//!
//! PnL is stored as i64 micros (1e-6 units) so the hot path is a single
//! atomic add and reporting paths can read without locks. Reads may observe
//! a value that is one fill stale; that is acceptable for gauges and the
//! `/pnl` endpoint (single-writer, multi-reader model).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{error, info, warn};

/// Daily loss thresholds. Both values are negative.
#[derive(Debug, Clone)]
pub struct DailyLimitConfig {
    /// Halt trading at or below this realized PnL (e.g. -500).
    pub max_daily_loss: Decimal,
    /// Emit a one-shot warning at or below this PnL (e.g. -300).
    pub warning_threshold: Decimal,
}

impl Default for DailyLimitConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: Decimal::new(-500, 0),
            warning_threshold: Decimal::new(-300, 0),
        }
    }
}

/// Risk status after recording a PnL event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskStatus {
    Normal,
    Warning,
    Halted,
}

impl std::fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Lock-free daily loss limit engine.
///
/// Single writer (the pipeline worker) records PnL; any thread may read the
/// current total or trading flag.
pub struct DailyLossLimiter {
    config: DailyLimitConfig,
    /// Cumulative realized PnL in micros.
    pnl_micros: AtomicI64,
    trading_enabled: AtomicBool,
    warning_issued: AtomicBool,
}

impl DailyLossLimiter {
    pub fn new(config: DailyLimitConfig) -> Self {
        info!(
            max_daily_loss = %config.max_daily_loss,
            warning_threshold = %config.warning_threshold,
            "daily loss limiter armed"
        );
        Self {
            config,
            pnl_micros: AtomicI64::new(0),
            trading_enabled: AtomicBool::new(true),
            warning_issued: AtomicBool::new(false),
        }
    }

    /// Record a realized PnL delta and evaluate thresholds.
    pub fn record_pnl(&self, pnl: Decimal) -> RiskStatus {
        let delta = to_micros(pnl);
        let total = micros_to_decimal(self.pnl_micros.fetch_add(delta, Ordering::SeqCst) + delta);

        if total <= self.config.max_daily_loss {
            self.trading_enabled.store(false, Ordering::SeqCst);
            error!(
                daily_pnl = %total,
                limit = %self.config.max_daily_loss,
                "daily loss limit breached - trading halted"
            );
            RiskStatus::Halted
        } else if total <= self.config.warning_threshold {
            if !self.warning_issued.swap(true, Ordering::SeqCst) {
                warn!(
                    daily_pnl = %total,
                    warning_threshold = %self.config.warning_threshold,
                    "daily loss warning threshold reached"
                );
            }
            RiskStatus::Warning
        } else {
            RiskStatus::Normal
        }
    }

    #[must_use]
    pub fn is_trading_enabled(&self) -> bool {
        self.trading_enabled.load(Ordering::SeqCst)
    }

    /// Current cumulative realized PnL for the day.
    #[must_use]
    pub fn current_pnl(&self) -> Decimal {
        micros_to_decimal(self.pnl_micros.load(Ordering::SeqCst))
    }

    /// Read-only status snapshot for health reporting.
    #[must_use]
    pub fn status(&self) -> RiskStatus {
        if !self.is_trading_enabled() {
            RiskStatus::Halted
        } else if self.current_pnl() <= self.config.warning_threshold {
            RiskStatus::Warning
        } else {
            RiskStatus::Normal
        }
    }

    /// Reset counters for a new trading day and re-enable trading.
    pub fn reset_daily(&self) {
        let previous = self.current_pnl();
        self.pnl_micros.store(0, Ordering::SeqCst);
        self.trading_enabled.store(true, Ordering::SeqCst);
        self.warning_issued.store(false, Ordering::SeqCst);
        info!(previous_day_pnl = %previous, "daily risk counters reset");
    }
}

fn to_micros(d: Decimal) -> i64 {
    (d * Decimal::new(1_000_000, 0)).to_i64().unwrap_or_else(|| {
        // Saturate rather than wrap on absurd inputs; a saturated loss
        // trips the limiter, which is the safe direction.
        if d.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

fn micros_to_decimal(micros: i64) -> Decimal {
    Decimal::new(micros, 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limiter() -> DailyLossLimiter {
        DailyLossLimiter::new(DailyLimitConfig {
            max_daily_loss: dec!(-100),
            warning_threshold: dec!(-50),
        })
    }

    #[test]
    fn test_accumulates_pnl() {
        let engine = limiter();
        assert_eq!(engine.record_pnl(dec!(25)), RiskStatus::Normal);
        assert_eq!(engine.record_pnl(dec!(-30)), RiskStatus::Normal);
        assert_eq!(engine.current_pnl(), dec!(-5));
    }

    #[test]
    fn test_warning_then_halt() {
        let engine = limiter();
        assert_eq!(engine.record_pnl(dec!(-60)), RiskStatus::Warning);
        assert!(engine.is_trading_enabled());

        assert_eq!(engine.record_pnl(dec!(-50)), RiskStatus::Halted);
        assert!(!engine.is_trading_enabled());
        assert_eq!(engine.status(), RiskStatus::Halted);
    }

    #[test]
    fn test_halt_latches_until_reset() {
        let engine = limiter();
        engine.record_pnl(dec!(-150));
        assert!(!engine.is_trading_enabled());

        // Winning back the loss does not un-halt
        engine.record_pnl(dec!(200));
        assert!(!engine.is_trading_enabled());

        engine.reset_daily();
        assert!(engine.is_trading_enabled());
        assert_eq!(engine.current_pnl(), dec!(0));
    }

    #[test]
    fn test_micros_roundtrip() {
        for v in [dec!(0), dec!(100.123456), dec!(-50.5), dec!(999999.999999)] {
            let back = micros_to_decimal(to_micros(v));
            assert!((v - back).abs() < dec!(0.000001), "failed for {}", v);
        }
    }
}
