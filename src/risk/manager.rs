//! Pre-execution risk gate.
//!
//! A pure gate: reads the daily PnL state and the proposed trade's notional
//! and estimated slippage, and answers yes or no. It never mutates state and
//! never places or cancels orders.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::risk::daily_limit::DailyLossLimiter;
use crate::signal::{Decision, Signal};

/// Per-trade limits enforced before execution is attempted.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum notional value for a single arbitrage attempt.
    pub max_trade_notional: Decimal,
    /// Maximum tolerated estimated slippage (fraction, e.g. 0.002).
    pub max_slippage: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_trade_notional: Decimal::new(10_000, 0),
            max_slippage: 0.002,
        }
    }
}

/// Gates proposed trades against exposure and PnL limits.
pub struct RiskManager {
    config: RiskConfig,
    daily: Arc<DailyLossLimiter>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, daily: Arc<DailyLossLimiter>) -> Self {
        Self { config, daily }
    }

    /// Check whether a proposed trade may proceed.
    ///
    /// Enforces, in order: the daily loss circuit breaker, the per-trade
    /// notional cap, and the estimated slippage cap. Hold signals are never
    /// permitted (nothing to execute).
    pub fn check_trade_permission(
        &self,
        signal: &Signal,
        notional: Decimal,
        estimated_slippage: f64,
    ) -> bool {
        if signal.decision == Decision::Hold {
            return false;
        }

        if !self.daily.is_trading_enabled() {
            warn!(
                decision = %signal.decision,
                daily_pnl = %self.daily.current_pnl(),
                "trade blocked: daily loss limit breached"
            );
            return false;
        }

        if notional > self.config.max_trade_notional {
            warn!(
                %notional,
                cap = %self.config.max_trade_notional,
                "trade blocked: notional exceeds per-trade cap"
            );
            return false;
        }

        if estimated_slippage > self.config.max_slippage {
            warn!(
                estimated_slippage,
                cap = self.config.max_slippage,
                "trade blocked: estimated slippage above cap"
            );
            return false;
        }

        true
    }

    /// The daily limiter, shared with reporting paths.
    pub fn daily(&self) -> &Arc<DailyLossLimiter> {
        &self.daily
    }
}
