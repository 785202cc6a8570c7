//! Shadow audit log of decisions.
//!
//! Every decision - including vetoed Holds - is recorded with its full score
//! set, and completed trades are re-recorded with their realized outcome.
//! The log is the ground truth for offline model evaluation and retraining,
//! so recording is best-effort but loud: failures are logged and never
//! propagate into the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::signal::Signal;

/// Error type for audit recording operations.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One audit entry: the decision, its scores, and (once known) the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub side: Option<String>,
    pub reason: String,
    pub z_score: f64,
    pub confidence: f64,
    pub anomaly: f64,
    pub cointegration_stability: f64,
    pub composite_score: f64,
    pub spread: f64,
    pub actual_outcome: Option<i8>,
    pub actual_pnl: Option<f64>,
}

impl AuditRecord {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            timestamp: signal.timestamp,
            decision: signal.decision.to_string(),
            side: signal.side.map(|s| s.to_string()),
            reason: signal.reason.to_string(),
            z_score: signal.z_score,
            confidence: signal.confidence,
            anomaly: signal.anomaly,
            cointegration_stability: signal.cointegration_stability,
            composite_score: signal.composite_score,
            spread: signal.features.spread,
            actual_outcome: None,
            actual_pnl: None,
        }
    }

    /// Attach the realized outcome of a completed trade.
    #[must_use]
    pub fn with_outcome(mut self, actual_outcome: i8, actual_pnl: f64) -> Self {
        self.actual_outcome = Some(actual_outcome);
        self.actual_pnl = Some(actual_pnl);
        self
    }
}

/// Pluggable audit backend.
#[async_trait]
pub trait DecisionAuditRecorder: Send + Sync {
    /// Record an entry. Implementations should be non-blocking.
    async fn record(&self, entry: &AuditRecord) -> Result<(), AuditError>;
}

/// JSON-lines file recorder.
///
/// Appends one JSON object per line. Uses `spawn_blocking` so file I/O never
/// stalls the pipeline worker.
pub struct JsonAuditLogger {
    file_path: Arc<PathBuf>,
}

impl JsonAuditLogger {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path: Arc::new(file_path),
        }
    }
}

#[async_trait]
impl DecisionAuditRecorder for JsonAuditLogger {
    async fn record(&self, entry: &AuditRecord) -> Result<(), AuditError> {
        let file_path = Arc::clone(&self.file_path);
        let line = serde_json::to_string(entry)?;

        tokio::task::spawn_blocking(move || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&*file_path)?;
            writeln!(file, "{}", line)?;
            Ok::<(), AuditError>(())
        })
        .await
        .map_err(|e| AuditError::Io(std::io::Error::other(e)))??;

        Ok(())
    }
}

/// Discards every entry; used when auditing is disabled and in tests.
pub struct NullAuditRecorder;

#[async_trait]
impl DecisionAuditRecorder for NullAuditRecorder {
    async fn record(&self, _entry: &AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::features::FeatureVector;
    use crate::signal::Decision;
    use crate::types::OrderSide;
    use tempfile::tempdir;

    fn sample_signal() -> Signal {
        let features = FeatureVector {
            btc_usd: 60_000.0,
            eth_usd: 3_000.0,
            eth_btc: 0.0495,
            implied_eth_btc: 0.05,
            spread: -0.0005,
            z_score: -2.5,
            volatility: 0.001,
            imbalance: 0.1,
            timestamp: Utc::now(),
        };
        Signal {
            timestamp: features.timestamp,
            decision: Decision::Buy,
            side: Some(OrderSide::Buy),
            reason: "spread below lower threshold",
            z_score: -2.5,
            model_signal: 1,
            confidence: 0.95,
            anomaly: 0.1,
            cointegration_stability: 0.9,
            composite_score: 0.92,
            kalman_alpha: 0.0,
            kalman_beta: 0.05,
            features,
        }
    }

    #[tokio::test]
    async fn test_json_logger_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let logger = JsonAuditLogger::new(path.clone());

        let entry = AuditRecord::from_signal(&sample_signal());
        logger.record(&entry).await.unwrap();
        logger
            .record(&entry.clone().with_outcome(1, 0.0012))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"decision\":\"BUY\""));
        assert!(lines[1].contains("\"actual_pnl\":0.0012"));

        // Each line round-trips as standalone JSON
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("confidence").is_some());
        }
    }
}
