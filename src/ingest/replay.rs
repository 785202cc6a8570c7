//! CSV replay event source.
//!
//! Drives the full decision pipeline from recorded feature rows, one row per
//! decision cycle. Each row fans out into three trade events (one per leg)
//! so replay exercises the same feature-boundary path as live ingestion.
//!
//! Expected header: `timestamp,btc_usd,eth_usd,eth_btc` with optional
//! trailing `volatility,imbalance` columns. Rows that fail to parse are
//! skipped with a warning; a malformed file must never kill the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ingest::{EventKind, EventSource, MarketEvent};

/// Replays feature rows from a CSV file.
pub struct ReplayIngestor {
    path: PathBuf,
    btc_pair: String,
    eth_pair: String,
    cross_pair: String,
    /// Delay between rows; `None` replays as fast as the pipeline drains.
    pace: Option<Duration>,
}

impl ReplayIngestor {
    pub fn new(
        path: PathBuf,
        btc_pair: String,
        eth_pair: String,
        cross_pair: String,
        pace: Option<Duration>,
    ) -> Self {
        Self {
            path,
            btc_pair,
            eth_pair,
            cross_pair,
            pace,
        }
    }

    fn parse_row(&self, line: &str, line_no: usize) -> Option<(DateTime<Utc>, f64, f64, f64)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            warn!(line_no, "replay row has too few columns, skipping");
            return None;
        }

        let timestamp = fields[0]
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                fields[0]
                    .parse::<i64>()
                    .map(|ms| DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now))
            })
            .unwrap_or_else(|_| Utc::now());

        let mut prices = [0.0f64; 3];
        for (i, raw) in fields[1..4].iter().enumerate() {
            match raw.parse::<f64>() {
                Ok(v) => prices[i] = v,
                Err(e) => {
                    warn!(line_no, column = i + 1, error = %e, "unparseable price, skipping row");
                    return None;
                }
            }
        }

        Some((timestamp, prices[0], prices[1], prices[2]))
    }
}

#[async_trait]
impl EventSource for ReplayIngestor {
    async fn run(self: Box<Self>, tx: mpsc::Sender<MarketEvent>) {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read replay file");
                return;
            }
        };

        let mut rows = 0usize;
        for (line_no, line) in contents.lines().enumerate() {
            if line_no == 0 || line.trim().is_empty() {
                continue; // header
            }
            let Some((timestamp, btc, eth, cross)) = self.parse_row(line, line_no) else {
                continue;
            };

            let events = [
                (self.btc_pair.clone(), btc),
                (self.eth_pair.clone(), eth),
                (self.cross_pair.clone(), cross),
            ];
            for (pair, price) in events {
                let event = MarketEvent {
                    kind: EventKind::Trade,
                    pair,
                    price,
                    quantity: 0.0,
                    side: None,
                    timestamp,
                };
                if tx.send(event).await.is_err() {
                    info!("pipeline closed, stopping replay");
                    return;
                }
            }
            rows += 1;

            if let Some(pace) = self.pace {
                tokio::time::sleep(pace).await;
            }
        }

        info!(rows, "replay complete");
    }
}
