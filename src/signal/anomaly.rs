//! Anomaly scorer over the per-event feature vector.
//!
//! Wraps the anomaly head of the loaded model artifact (trained offline on
//! the same fixed feature schema as the classifier). Scores are in [0, 1]
//! with 0 meaning "normal"; before a model is available the scorer is
//! fail-open and reports `Unavailable`, which the composite engine treats
//! as 0.0.

use std::sync::Arc;

use crate::signal::features::FeatureVector;
use crate::signal::model::ModelArtifact;

/// Named anomaly result, so the fail-open path is assertable by reason.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyScore {
    /// Model produced an outlier score in [0, 1].
    Scored(f64),
    /// No anomaly model loaded; treated as 0.0 (fail-open).
    Unavailable,
}

impl AnomalyScore {
    /// Collapse to the numeric score consumed by the veto guard.
    pub fn value(&self) -> f64 {
        match self {
            AnomalyScore::Scored(v) => *v,
            AnomalyScore::Unavailable => 0.0,
        }
    }
}

/// Outlier scorer backed by the artifact's anomaly head.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    artifact: Option<Arc<ModelArtifact>>,
}

impl AnomalyScorer {
    pub fn new(artifact: Option<Arc<ModelArtifact>>) -> Self {
        Self { artifact }
    }

    /// Score a feature vector.
    ///
    /// The decision function follows the IsolationForest convention (higher
    /// output = more normal), so the anomaly score is its negation, clamped
    /// to [0, 1]. Non-finite outputs degrade to `Unavailable` rather than
    /// propagating NaN into the veto logic.
    pub fn score(&self, features: &FeatureVector) -> AnomalyScore {
        let Some(artifact) = &self.artifact else {
            return AnomalyScore::Unavailable;
        };
        let Some(df) = artifact.decision_function(&features.to_model_input()) else {
            return AnomalyScore::Unavailable;
        };
        if !df.is_finite() {
            return AnomalyScore::Unavailable;
        }
        AnomalyScore::Scored((-df).clamp(0.0, 1.0))
    }

    pub fn is_available(&self) -> bool {
        self.artifact
            .as_ref()
            .map(|a| a.anomaly.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::features::{FEATURE_SCHEMA, SCHEMA_VERSION};
    use crate::signal::model::AnomalyHead;
    use chrono::Utc;

    fn artifact_with_anomaly() -> ModelArtifact {
        ModelArtifact {
            schema_version: SCHEMA_VERSION,
            feature_schema: FEATURE_SCHEMA.iter().map(|s| s.to_string()).collect(),
            weights: vec![vec![0.0; 6], vec![0.0; 6], vec![0.0; 6]],
            intercepts: vec![0.0; 3],
            feature_means: vec![0.0; 6],
            feature_scales: vec![1.0; 6],
            // Large spreads (index 4) drive the decision function negative,
            // i.e. anomalous.
            anomaly: Some(AnomalyHead {
                weights: vec![0.0, 0.0, 0.0, 0.0, -100.0, 0.0],
                intercept: 0.5,
            }),
        }
    }

    fn features_with_spread(spread: f64) -> FeatureVector {
        FeatureVector {
            btc_usd: 0.0,
            eth_usd: 0.0,
            eth_btc: 0.0,
            implied_eth_btc: 0.0,
            spread,
            z_score: 0.0,
            volatility: 0.0,
            imbalance: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_fail_open_without_model() {
        let scorer = AnomalyScorer::new(None);
        let score = scorer.score(&features_with_spread(99.0));
        assert_eq!(score, AnomalyScore::Unavailable);
        assert_eq!(score.value(), 0.0);
        assert!(!scorer.is_available());
    }

    #[test]
    fn test_normal_input_scores_low() {
        let scorer = AnomalyScorer::new(Some(Arc::new(artifact_with_anomaly())));
        assert_eq!(scorer.score(&features_with_spread(0.0)).value(), 0.0);
    }

    #[test]
    fn test_outlier_scores_high_and_clamped() {
        let scorer = AnomalyScorer::new(Some(Arc::new(artifact_with_anomaly())));
        let score = scorer.score(&features_with_spread(10.0)).value();
        assert_eq!(score, 1.0, "clamped to the unit interval");
    }

    #[test]
    fn test_artifact_without_head_is_unavailable() {
        let mut artifact = artifact_with_anomaly();
        artifact.anomaly = None;
        let scorer = AnomalyScorer::new(Some(Arc::new(artifact)));
        assert_eq!(
            scorer.score(&features_with_spread(1.0)),
            AnomalyScore::Unavailable
        );
    }
}
