//! Order execution: routing, the three-leg cycle state machine, and the
//! compensating hedge.

pub mod cycle;
pub mod hedge;
pub mod router;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::OrderSide;

/// Errors raised at the execution boundary.
#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("exchange error: {0}")]
    Exchange(String),
    #[error("order rejected: {0}")]
    OrderRejected(String),
    #[error("numeric conversion failed: {0}")]
    NumericConversion(String),
}

/// Terminal status of a routed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Filled,
    Failed,
}

/// One executed (or failed) order. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Fill {
    pub order_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub pair: String,
    pub side: OrderSide,
    pub requested_price: Decimal,
    pub filled_price: Decimal,
    /// Realized slippage as a signed fraction of the requested price.
    pub slippage: Decimal,
    /// Quantity in the pair's base asset.
    pub quantity: Decimal,
    /// Trade value at the filled price.
    pub notional: Decimal,
    pub status: OrderStatus,
}

impl Fill {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Quantity of the asset held after this fill: the base asset for buys,
    /// the quote proceeds for sells.
    pub fn acquired_quantity(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.quantity,
            OrderSide::Sell => self.quantity * self.filled_price,
        }
    }
}

/// One leg of an arbitrage cycle, fully specified before execution starts.
#[derive(Debug, Clone)]
pub struct LegRequest {
    pub pair: String,
    pub side: OrderSide,
    /// Quantity in the pair's base asset.
    pub quantity: Decimal,
    /// Reference price used for simulated fills and slippage accounting.
    pub base_price: Decimal,
    /// Asset held once this leg fills; the hedge target if the cycle breaks
    /// after this leg.
    pub out_asset: String,
}

/// Raw fill report from a broker.
#[derive(Debug, Clone)]
pub struct BrokerFill {
    pub filled: bool,
    pub fill_price: Decimal,
}

/// The venue boundary: place a market order, report filled/unfilled and
/// price. Both the bundled paper broker and any live implementation satisfy
/// this contract.
#[async_trait]
pub trait OrderBroker: Send + Sync {
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<BrokerFill, ExecutionError>;
}
