//! Composite signal engine - the decision authority.
//!
//! Fuses four independent sources into one decision per event:
//! the pretrained classifier (signal + confidence), the anomaly scorer, the
//! cointegration stability monitor, and the Kalman z-score. Veto semantics
//! are modeled as an ordered list of guard predicates so the precedence is
//! auditable and testable in isolation; the first veto wins and forces Hold.
//!
//! All intermediate scores are computed on every event - including vetoed
//! ones - so the audit trail always carries the full picture.

use tracing::{debug, info};

use crate::math::KalmanSpreadEstimator;
use crate::signal::anomaly::AnomalyScorer;
use crate::signal::cointegration::CointegrationMonitor;
use crate::signal::features::{FeatureVector, MarketSnapshot};
use crate::signal::model::ModelScorer;
use crate::signal::{Decision, Signal};
use crate::types::OrderSide;

/// Veto reasons are stable strings: the audit log and tests key off them.
pub const REASON_MODEL_VETO: &str = "model veto or low confidence";
pub const REASON_MARKET_VETO: &str = "anomaly or instability veto";
pub const REASON_MALFORMED: &str = "malformed feature input";
pub const REASON_NO_EDGE: &str = "no edge";
pub const REASON_SPREAD_SELL: &str = "spread above upper threshold";
pub const REASON_SPREAD_BUY: &str = "spread below lower threshold";

/// Outcome of a single guard predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Pass,
    Veto(&'static str),
}

/// Thresholds for the decision logic. Strict inequalities throughout:
/// values landing exactly on a threshold yield Hold.
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Model confidence below this is vetoed (default 0.90).
    pub confidence_threshold: f64,
    /// Anomaly score above this is vetoed (default 0.8).
    pub anomaly_cap: f64,
    /// Cointegration stability below this is vetoed (default 0.3).
    pub stability_floor: f64,
    /// |z| must exceed this for a directional decision (default 2.0).
    pub zscore_threshold: f64,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.90,
            anomaly_cap: 0.8,
            stability_floor: 0.3,
            zscore_threshold: 2.0,
        }
    }
}

/// The decision authority: owns the estimator and monitor state, queries the
/// injected scorers, and emits one [`Signal`] per event.
pub struct CompositeSignalEngine {
    config: CompositeConfig,
    estimator: KalmanSpreadEstimator,
    monitor: CointegrationMonitor,
    model: ModelScorer,
    anomaly: AnomalyScorer,
}

impl CompositeSignalEngine {
    /// All collaborators are constructor-injected; the engine holds no
    /// global state.
    pub fn new(
        config: CompositeConfig,
        estimator: KalmanSpreadEstimator,
        monitor: CointegrationMonitor,
        model: ModelScorer,
        anomaly: AnomalyScorer,
    ) -> Self {
        Self {
            config,
            estimator,
            monitor,
            model,
            anomaly,
        }
    }

    /// Canonical composite formula: confidence 40%, cointegration stability
    /// 40%, inverse anomaly 20%.
    pub fn composite_score(confidence: f64, stability: f64, anomaly: f64) -> f64 {
        0.4 * confidence + 0.4 * stability + 0.2 * (1.0 - anomaly)
    }

    /// Produce a decision for one market snapshot.
    ///
    /// Mutates estimator and monitor state exactly once per call, in event
    /// order. Never panics: malformed input short-circuits to Hold.
    pub fn decide(&mut self, snapshot: &MarketSnapshot) -> Signal {
        if let Err(e) = snapshot.validate() {
            debug!(error = %e, "rejecting malformed feature input");
            return self.hold_signal_for_malformed(snapshot);
        }

        // 1. Spread estimation: update the Kalman state, then derive the
        //    full feature vector with the fresh z-score.
        self.estimator.update(snapshot.btc_usd, snapshot.eth_usd);
        let z_score = self.estimator.zscore();
        let features = FeatureVector::derive(snapshot, z_score);
        self.monitor.record(features.spread);

        // 2. Query every source up front; vetoed decisions still carry the
        //    complete score set for audit.
        let (model_signal, confidence) = self.model.predict(&features).effective();
        let anomaly = self.anomaly.score(&features).value();
        let stability = self.monitor.score();
        let composite = Self::composite_score(confidence, stability, anomaly);
        let (kalman_alpha, kalman_beta) = self.estimator.params();

        // 3. Ordered guard chain; first veto wins.
        let guards = [
            self.model_guard(model_signal, confidence),
            self.market_guard(anomaly, stability),
        ];
        let veto = guards.iter().find_map(|g| match g {
            GuardOutcome::Veto(reason) => Some(*reason),
            GuardOutcome::Pass => None,
        });

        // 4. Rule confirmation on the z-score (strict inequalities).
        let (decision, side, reason) = match veto {
            Some(reason) => (Decision::Hold, None, reason),
            None => self.zscore_rule(z_score),
        };

        if decision != Decision::Hold {
            info!(
                %decision,
                z_score,
                confidence,
                anomaly,
                stability,
                composite,
                spread = features.spread,
                "trade signal"
            );
        }

        Signal {
            timestamp: snapshot.timestamp,
            decision,
            side,
            reason,
            z_score,
            model_signal,
            confidence,
            anomaly,
            cointegration_stability: stability,
            composite_score: composite,
            kalman_alpha,
            kalman_beta,
            features,
        }
    }

    /// The directional rule: strict inequalities, so a z-score landing
    /// exactly on the threshold holds.
    pub fn zscore_rule(&self, z_score: f64) -> (Decision, Option<OrderSide>, &'static str) {
        if z_score > self.config.zscore_threshold {
            (Decision::Sell, Some(OrderSide::Sell), REASON_SPREAD_SELL)
        } else if z_score < -self.config.zscore_threshold {
            (Decision::Buy, Some(OrderSide::Buy), REASON_SPREAD_BUY)
        } else {
            (Decision::Hold, None, REASON_NO_EDGE)
        }
    }

    fn model_guard(&self, signal: i8, confidence: f64) -> GuardOutcome {
        if signal == 0 || confidence < self.config.confidence_threshold {
            GuardOutcome::Veto(REASON_MODEL_VETO)
        } else {
            GuardOutcome::Pass
        }
    }

    fn market_guard(&self, anomaly: f64, stability: f64) -> GuardOutcome {
        if anomaly > self.config.anomaly_cap || stability < self.config.stability_floor {
            GuardOutcome::Veto(REASON_MARKET_VETO)
        } else {
            GuardOutcome::Pass
        }
    }

    fn hold_signal_for_malformed(&self, snapshot: &MarketSnapshot) -> Signal {
        let (kalman_alpha, kalman_beta) = self.estimator.params();
        Signal {
            timestamp: snapshot.timestamp,
            decision: Decision::Hold,
            side: None,
            reason: REASON_MALFORMED,
            z_score: 0.0,
            model_signal: 0,
            confidence: 0.0,
            anomaly: 0.0,
            cointegration_stability: 0.0,
            composite_score: 0.0,
            kalman_alpha,
            kalman_beta,
            features: FeatureVector {
                btc_usd: snapshot.btc_usd,
                eth_usd: snapshot.eth_usd,
                eth_btc: snapshot.eth_btc,
                implied_eth_btc: 0.0,
                spread: 0.0,
                z_score: 0.0,
                volatility: snapshot.volatility,
                imbalance: snapshot.imbalance,
                timestamp: snapshot.timestamp,
            },
        }
    }

    /// Estimator warm-up state, surfaced for health reporting.
    pub fn is_warmed_up(&self) -> bool {
        self.estimator.is_warmed_up()
    }
}
