//! Common Types Module
//!
//! Shared types used across the codebase to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// The three-pair triangle this engine trades, plus the assets at each
/// corner. Defaults match the BTC/ETH/USDT triangle.
#[derive(Debug, Clone)]
pub struct TrianglePairs {
    pub btc_pair: String,
    pub eth_pair: String,
    pub cross_pair: String,
    pub btc_asset: String,
    pub eth_asset: String,
    /// Currency residual exposure is hedged back into.
    pub base_asset: String,
}

impl Default for TrianglePairs {
    fn default() -> Self {
        Self {
            btc_pair: "BTCUSDT".to_string(),
            eth_pair: "ETHUSDT".to_string(),
            cross_pair: "ETHBTC".to_string(),
            btc_asset: "BTC".to_string(),
            eth_asset: "ETH".to_string(),
            base_asset: "USDT".to_string(),
        }
    }
}

/// Execution environment for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Simulated fills with modeled slippage.
    Paper,
    /// Orders routed to a real broker.
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}
