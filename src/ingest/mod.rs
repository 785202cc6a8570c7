//! Ingestion and feature boundaries.
//!
//! Exchange connectivity and rolling feature computation live outside this
//! crate; what is modeled here is their contract. An [`EventSource`] feeds
//! normalized [`MarketEvent`]s into the pipeline channel, recovering from
//! transport failures internally (fixed 5 s reconnect backoff - transport
//! errors never surface as pipeline errors). A [`FeatureBuilder`] turns the
//! event stream into per-event [`MarketSnapshot`]s for the decision engine.

pub mod replay;
pub mod stdin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::signal::features::MarketSnapshot;
use crate::types::OrderSide;

/// Fixed reconnect delay for transport failures at the ingestion boundary.
pub const RECONNECT_BACKOFF_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Trade,
    OrderBook,
}

/// Normalized market event, as delivered by the ingestion collaborator.
#[derive(Debug, Clone)]
pub struct MarketEvent {
    pub kind: EventKind,
    pub pair: String,
    pub price: f64,
    pub quantity: f64,
    pub side: Option<OrderSide>,
    pub timestamp: DateTime<Utc>,
}

/// Source of normalized events.
///
/// Implementations own their transport: on disconnect they retry with the
/// fixed backoff and resume delivering the same event contract. Dropping the
/// sender signals end-of-stream to the pipeline.
#[async_trait]
pub trait EventSource: Send {
    async fn run(self: Box<Self>, tx: mpsc::Sender<MarketEvent>);
}

/// Feature boundary: folds events into decision-ready snapshots.
pub trait FeatureBuilder: Send {
    /// Consume one event; returns a snapshot once enough state exists for a
    /// decision (all three legs priced).
    fn update(&mut self, event: &MarketEvent) -> Option<MarketSnapshot>;
}

/// Minimal default feature builder for the three-pair triangle.
///
/// Tracks the latest price per leg and passes through ambient
/// volatility/imbalance proxies. Full rolling feature engineering is an
/// external collaborator; these proxies only feed gauges and the audit log,
/// never the model input schema.
pub struct TriangleFeatureBuilder {
    btc_pair: String,
    eth_pair: String,
    cross_pair: String,
    btc_usd: Option<f64>,
    eth_usd: Option<f64>,
    eth_btc: Option<f64>,
    /// EWMA of absolute cross-price returns
    volatility: f64,
    /// EWMA of signed trade flow on the cross pair
    imbalance: f64,
}

impl TriangleFeatureBuilder {
    pub fn new(btc_pair: String, eth_pair: String, cross_pair: String) -> Self {
        Self {
            btc_pair,
            eth_pair,
            cross_pair,
            btc_usd: None,
            eth_usd: None,
            eth_btc: None,
            volatility: 0.0,
            imbalance: 0.0,
        }
    }
}

impl FeatureBuilder for TriangleFeatureBuilder {
    fn update(&mut self, event: &MarketEvent) -> Option<MarketSnapshot> {
        const DECAY: f64 = 0.95;

        if event.pair == self.btc_pair {
            self.btc_usd = Some(event.price);
        } else if event.pair == self.eth_pair {
            self.eth_usd = Some(event.price);
        } else if event.pair == self.cross_pair {
            if let Some(previous) = self.eth_btc {
                if previous > 0.0 && event.price.is_finite() {
                    let ret = ((event.price - previous) / previous).abs();
                    self.volatility = DECAY * self.volatility + (1.0 - DECAY) * ret;
                }
            }
            if event.kind == EventKind::Trade {
                let flow = match event.side {
                    Some(OrderSide::Buy) => event.quantity,
                    Some(OrderSide::Sell) => -event.quantity,
                    None => 0.0,
                };
                self.imbalance = DECAY * self.imbalance + (1.0 - DECAY) * flow;
            }
            self.eth_btc = Some(event.price);
        } else {
            return None;
        }

        Some(MarketSnapshot {
            btc_usd: self.btc_usd?,
            eth_usd: self.eth_usd?,
            eth_btc: self.eth_btc?,
            volatility: self.volatility,
            imbalance: self.imbalance,
            timestamp: event.timestamp,
        })
    }
}
