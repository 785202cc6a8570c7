//! Validated engine configuration bridging CLI arguments to domain types.
//!
//! These structs decouple the CLI parsing layer from the trading logic:
//! command handlers work with a fully validated [`EngineConfig`] instead of
//! raw flags.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::PathBuf;
use thiserror::Error;

use crate::execution::router::RouterConfig;
use crate::monitoring::DriftConfig;
use crate::pipeline::PipelineConfig;
use crate::risk::{DailyLimitConfig, RiskConfig};
use crate::signal::composite::CompositeConfig;
use crate::types::{TradingMode, TrianglePairs};

/// Errors raised while assembling the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid notional {0}: must be positive")]
    InvalidNotional(f64),

    #[error("invalid {name} {value}: must be within [0, 1]")]
    ScoreOutOfRange { name: &'static str, value: f64 },

    #[error("invalid daily loss limit {0}: must be negative")]
    InvalidLossLimit(f64),

    #[error("live mode requires an external broker; this build routes paper only")]
    LiveBrokerUnavailable,
}

/// Complete validated configuration for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: TradingMode,
    pub pairs: TrianglePairs,
    pub composite: CompositeConfig,
    pub risk: RiskConfig,
    pub daily: DailyLimitConfig,
    pub router: RouterConfig,
    pub pipeline: PipelineConfig,
    pub drift: DriftConfig,
    pub model_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub health_port: u16,
    /// Kalman estimator warm-up, in updates.
    pub estimator_warmup: u64,
}

impl EngineConfig {
    /// Build a config from the CLI-facing knobs, validating ranges.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli(
        mode: TradingMode,
        notional: f64,
        max_daily_loss: f64,
        pipeline_floor: f64,
        execution_floor: f64,
        slippage_bps: f64,
        model_path: Option<PathBuf>,
        audit_path: Option<PathBuf>,
        health_port: u16,
    ) -> Result<Self, ConfigError> {
        if mode == TradingMode::Live {
            return Err(ConfigError::LiveBrokerUnavailable);
        }
        if notional <= 0.0 || !notional.is_finite() {
            return Err(ConfigError::InvalidNotional(notional));
        }
        if max_daily_loss >= 0.0 || !max_daily_loss.is_finite() {
            return Err(ConfigError::InvalidLossLimit(max_daily_loss));
        }
        for (name, value) in [
            ("pipeline composite floor", pipeline_floor),
            ("execution composite floor", execution_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ScoreOutOfRange { name, value });
            }
        }

        let trade_notional =
            Decimal::from_f64(notional).ok_or(ConfigError::InvalidNotional(notional))?;
        let loss_limit = Decimal::from_f64(max_daily_loss)
            .ok_or(ConfigError::InvalidLossLimit(max_daily_loss))?;

        let pairs = TrianglePairs::default();
        Ok(Self {
            mode,
            pairs: pairs.clone(),
            composite: CompositeConfig::default(),
            risk: RiskConfig::default(),
            daily: DailyLimitConfig {
                max_daily_loss: loss_limit,
                warning_threshold: loss_limit * Decimal::new(6, 1), // warn at 60%
            },
            router: RouterConfig {
                slippage_bps,
                execution_composite_floor: execution_floor,
            },
            pipeline: PipelineConfig {
                pairs,
                trade_notional,
                pipeline_composite_floor: pipeline_floor,
                ..PipelineConfig::default()
            },
            drift: DriftConfig::default(),
            model_path,
            audit_path,
            health_port,
            estimator_warmup: 30,
        })
    }
}
