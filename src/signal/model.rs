//! Pretrained classifier wrapper (the "ML filter").
//!
//! The model is an opaque scoring artifact trained offline: a linear softmax
//! head over the fixed feature schema, serialized as JSON. This crate never
//! trains it; it only loads it once at startup and scores feature vectors.
//!
//! # Fail-open contract
//!
//! A missing or unloadable model must never block trading outright: the
//! scorer degrades to [`ModelVerdict::Unavailable`], which downstream code
//! treats as `{signal: +1, confidence: 0.0}`. The zero confidence always
//! fails the composite engine's confidence threshold, so the practical
//! effect of a missing model is Hold-by-threshold, never veto-by-absence.
//!
//! # Schema safety
//!
//! Feature ordering is the wire contract with the training pipeline. An
//! artifact whose `feature_schema` or `schema_version` disagrees with
//! [`crate::signal::features::FEATURE_SCHEMA`] is rejected at load time with
//! a hard error; silently reordering features would corrupt every prediction.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::signal::features::{FeatureVector, FEATURE_SCHEMA, SCHEMA_VERSION};

/// Errors raised while loading or validating a model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("schema version mismatch: artifact has v{found}, engine expects v{expected}")]
    SchemaVersion { expected: u32, found: u32 },
    #[error("feature schema mismatch at index {index}: artifact has '{found}', engine expects '{expected}'")]
    FeatureSchema {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("malformed artifact: {0}")]
    Malformed(String),
}

/// Optional anomaly head: a linear decision function where higher output
/// means more normal (IsolationForest convention).
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyHead {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// Loadable model artifact: linear softmax classifier over classes
/// `[-1, 0, 1]` plus an optional anomaly head.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub feature_schema: Vec<String>,
    /// Per-class weight rows, one per class in `[-1, 0, 1]` order.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    /// Standardization applied before scoring (training-time fit).
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    #[serde(default)]
    pub anomaly: Option<AnomalyHead>,
}

impl ModelArtifact {
    /// Load and validate an artifact from disk.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)?;
        artifact.validate()?;
        info!(path = %path.display(), "model artifact loaded");
        Ok(artifact)
    }

    /// Reject any artifact whose schema disagrees with the engine's. Fails
    /// loudly so a training/inference skew can never score silently.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ModelError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        if self.feature_schema.len() != FEATURE_SCHEMA.len() {
            return Err(ModelError::Malformed(format!(
                "expected {} features, artifact has {}",
                FEATURE_SCHEMA.len(),
                self.feature_schema.len()
            )));
        }
        for (index, (expected, found)) in FEATURE_SCHEMA
            .iter()
            .zip(self.feature_schema.iter())
            .enumerate()
        {
            if expected != found {
                return Err(ModelError::FeatureSchema {
                    index,
                    expected: (*expected).to_string(),
                    found: found.clone(),
                });
            }
        }
        if self.weights.len() != 3 || self.intercepts.len() != 3 {
            return Err(ModelError::Malformed(
                "classifier must carry exactly 3 class rows".to_string(),
            ));
        }
        for row in &self.weights {
            if row.len() != FEATURE_SCHEMA.len() {
                return Err(ModelError::Malformed(
                    "weight row length does not match feature schema".to_string(),
                ));
            }
        }
        if self.feature_means.len() != FEATURE_SCHEMA.len()
            || self.feature_scales.len() != FEATURE_SCHEMA.len()
        {
            return Err(ModelError::Malformed(
                "standardization vectors must match feature schema".to_string(),
            ));
        }
        if let Some(head) = &self.anomaly {
            if head.weights.len() != FEATURE_SCHEMA.len() {
                return Err(ModelError::Malformed(
                    "anomaly head length does not match feature schema".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn standardize(&self, input: &[f64; 6]) -> [f64; 6] {
        let mut out = [0.0; 6];
        for i in 0..6 {
            let scale = if self.feature_scales[i].abs() < f64::EPSILON {
                1.0
            } else {
                self.feature_scales[i]
            };
            out[i] = (input[i] - self.feature_means[i]) / scale;
        }
        out
    }

    /// Per-class probabilities over `[-1, 0, 1]` via softmax.
    pub fn predict_proba(&self, input: &[f64; 6]) -> [f64; 3] {
        let x = self.standardize(input);
        let mut scores = [0.0f64; 3];
        for (c, row) in self.weights.iter().enumerate() {
            scores[c] = self.intercepts[c] + row.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>();
        }

        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut exp = [0.0f64; 3];
        let mut sum = 0.0;
        for c in 0..3 {
            exp[c] = (scores[c] - max).exp();
            sum += exp[c];
        }
        [exp[0] / sum, exp[1] / sum, exp[2] / sum]
    }

    /// Raw anomaly decision function (higher = more normal), if the artifact
    /// carries an anomaly head.
    pub fn decision_function(&self, input: &[f64; 6]) -> Option<f64> {
        let head = self.anomaly.as_ref()?;
        let x = self.standardize(input);
        Some(head.intercept + head.weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>())
    }
}

/// Named result of a model query, so callers can assert on the reason rather
/// than a bare default value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelVerdict {
    /// The model produced a prediction.
    Scored {
        /// -1 = sell, 0 = hold, +1 = buy
        signal: i8,
        /// Winning-class probability in [0, 1]
        confidence: f64,
    },
    /// No model loaded; fail-open default applies.
    Unavailable,
}

impl ModelVerdict {
    /// Collapse to the `(signal, confidence)` pair consumed by the composite
    /// engine. `Unavailable` maps to `(1, 0.0)`: allow, but with a
    /// confidence no threshold will accept.
    pub fn effective(&self) -> (i8, f64) {
        match self {
            ModelVerdict::Scored { signal, confidence } => (*signal, *confidence),
            ModelVerdict::Unavailable => (1, 0.0),
        }
    }
}

/// Classifier wrapper used by the composite engine.
///
/// Holds the shared artifact (or nothing) and is a pure function after
/// construction.
#[derive(Debug, Clone)]
pub struct ModelScorer {
    artifact: Option<Arc<ModelArtifact>>,
}

impl ModelScorer {
    pub fn new(artifact: Option<Arc<ModelArtifact>>) -> Self {
        if artifact.is_none() {
            warn!("no model artifact available - predictions degrade to fail-open defaults");
        }
        Self { artifact }
    }

    /// Score a feature vector. Never fails: absence degrades to
    /// [`ModelVerdict::Unavailable`].
    pub fn predict(&self, features: &FeatureVector) -> ModelVerdict {
        let Some(artifact) = &self.artifact else {
            return ModelVerdict::Unavailable;
        };

        let proba = artifact.predict_proba(&features.to_model_input());
        let (best, confidence) = proba
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p))
            .unwrap_or((2, 0.0));

        let signal = [-1i8, 0, 1][best];
        ModelVerdict::Scored { signal, confidence }
    }

    pub fn is_available(&self) -> bool {
        self.artifact.is_some()
    }
}
