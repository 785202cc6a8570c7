//! Normalized-event source reading JSON lines from stdin.
//!
//! The ingestion collaborator (exchange connector, replayer, test harness)
//! delivers events over this boundary as one JSON object per line:
//!
//! ```json
//! {"event_type":"trade","pair":"ETHBTC","price":0.05,"quantity":1.2,"side":"buy","timestamp":1700000000000}
//! ```
//!
//! Malformed lines are skipped with a warning; the stream contract is that
//! transport problems are the collaborator's to retry, so this source simply
//! reads until EOF.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ingest::{EventKind, EventSource, MarketEvent};
use crate::types::OrderSide;

/// Wire format of a normalized event.
#[derive(Debug, Deserialize)]
struct WireEvent {
    event_type: String,
    pair: String,
    price: f64,
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    side: Option<String>,
    /// Milliseconds since epoch; absent = arrival time.
    #[serde(default)]
    timestamp: Option<i64>,
}

impl WireEvent {
    fn into_event(self) -> Option<MarketEvent> {
        let kind = match self.event_type.as_str() {
            "trade" => EventKind::Trade,
            "orderbook" => EventKind::OrderBook,
            other => {
                warn!(event_type = other, "unknown event type, skipping");
                return None;
            }
        };
        let side = match self.side.as_deref() {
            Some("buy") => Some(OrderSide::Buy),
            Some("sell") => Some(OrderSide::Sell),
            _ => None,
        };
        let timestamp = self
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Some(MarketEvent {
            kind,
            pair: self.pair,
            price: self.price,
            quantity: self.quantity,
            side,
            timestamp,
        })
    }
}

/// Reads normalized events from stdin until EOF.
pub struct StdinIngestor;

#[async_trait]
impl EventSource for StdinIngestor {
    async fn run(self: Box<Self>, tx: mpsc::Sender<MarketEvent>) {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut delivered = 0u64;

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WireEvent>(trimmed) {
                        Ok(wire) => {
                            if let Some(event) = wire.into_event() {
                                if tx.send(event).await.is_err() {
                                    return;
                                }
                                delivered += 1;
                            }
                        }
                        Err(e) => warn!(error = %e, "unparseable event line, skipping"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read error, stopping ingestion");
                    break;
                }
            }
        }
        info!(delivered, "event stream ended");
    }
}
