//! Feature vector and the versioned model input schema.
//!
//! The model artifact is trained against a fixed, ordered feature schema.
//! Any drift between training-time and inference-time ordering silently
//! corrupts every prediction, so the schema is pinned here as a constant and
//! checked loudly against the artifact at load time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Schema version shipped inside model artifacts. Bump on any change to
/// [`FEATURE_SCHEMA`].
pub const SCHEMA_VERSION: u32 = 2;

/// Fixed model input ordering. Order matters: index i of the input vector is
/// always the value of `FEATURE_SCHEMA[i]`.
pub const FEATURE_SCHEMA: [&str; 6] = [
    "btc_usd",
    "eth_usd",
    "eth_btc",
    "implied_eth_btc",
    "spread",
    "z_score",
];

/// Errors raised while validating feature input.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("non-finite price in field '{0}'")]
    NonFinite(&'static str),
    #[error("non-positive price in field '{0}'")]
    NonPositive(&'static str),
}

/// Raw per-event market snapshot delivered by the feature boundary.
///
/// Volatility and imbalance are computed upstream from raw ticks; this crate
/// only consumes them.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot {
    pub btc_usd: f64,
    pub eth_usd: f64,
    pub eth_btc: f64,
    pub volatility: f64,
    pub imbalance: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Validate that every price is a usable, positive finite number.
    ///
    /// Malformed input must never panic the pipeline; callers translate this
    /// error into a Hold decision.
    pub fn validate(&self) -> Result<(), FeatureError> {
        for (name, value) in [
            ("btc_usd", self.btc_usd),
            ("eth_usd", self.eth_usd),
            ("eth_btc", self.eth_btc),
        ] {
            if !value.is_finite() {
                return Err(FeatureError::NonFinite(name));
            }
            if value <= 0.0 {
                return Err(FeatureError::NonPositive(name));
            }
        }
        Ok(())
    }
}

/// Complete feature vector for one decision cycle.
///
/// Produced once per event by the composite engine (raw snapshot plus the
/// derived spread fields) and immutable afterwards; exactly one instance
/// flows through each decision.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeatureVector {
    pub btc_usd: f64,
    pub eth_usd: f64,
    pub eth_btc: f64,
    pub implied_eth_btc: f64,
    pub spread: f64,
    pub z_score: f64,
    pub volatility: f64,
    pub imbalance: f64,
    pub timestamp: DateTime<Utc>,
}

impl FeatureVector {
    /// Derive the full vector from a validated snapshot plus the estimator's
    /// z-score.
    pub fn derive(snapshot: &MarketSnapshot, z_score: f64) -> Self {
        let implied_eth_btc = snapshot.eth_usd / snapshot.btc_usd;
        Self {
            btc_usd: snapshot.btc_usd,
            eth_usd: snapshot.eth_usd,
            eth_btc: snapshot.eth_btc,
            implied_eth_btc,
            spread: snapshot.eth_btc - implied_eth_btc,
            z_score,
            volatility: snapshot.volatility,
            imbalance: snapshot.imbalance,
            timestamp: snapshot.timestamp,
        }
    }

    /// Extract model input in [`FEATURE_SCHEMA`] order.
    pub fn to_model_input(&self) -> [f64; 6] {
        [
            self.btc_usd,
            self.eth_usd,
            self.eth_btc,
            self.implied_eth_btc,
            self.spread,
            self.z_score,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(btc: f64, eth: f64, cross: f64) -> MarketSnapshot {
        MarketSnapshot {
            btc_usd: btc,
            eth_usd: eth,
            eth_btc: cross,
            volatility: 0.01,
            imbalance: 0.1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_validate_rejects_nan_and_nonpositive() {
        assert!(snapshot(65_000.0, 3_400.0, 0.0525).validate().is_ok());
        assert!(snapshot(f64::NAN, 3_400.0, 0.0525).validate().is_err());
        assert!(snapshot(65_000.0, f64::INFINITY, 0.0525).validate().is_err());
        assert!(snapshot(65_000.0, 3_400.0, 0.0).validate().is_err());
        assert!(snapshot(-1.0, 3_400.0, 0.0525).validate().is_err());
    }

    #[test]
    fn test_derive_computes_spread() {
        let fv = FeatureVector::derive(&snapshot(60_000.0, 3_000.0, 0.051), 1.5);
        assert!((fv.implied_eth_btc - 0.05).abs() < 1e-12);
        assert!((fv.spread - 0.001).abs() < 1e-12);
        assert_eq!(fv.z_score, 1.5);
    }

    #[test]
    fn test_model_input_order_matches_schema() {
        let fv = FeatureVector::derive(&snapshot(60_000.0, 3_000.0, 0.051), 0.0);
        let input = fv.to_model_input();
        assert_eq!(input.len(), FEATURE_SCHEMA.len());
        assert_eq!(input[0], fv.btc_usd);
        assert_eq!(input[4], fv.spread);
        assert_eq!(input[5], fv.z_score);
    }
}
