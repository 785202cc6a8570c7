//! Position and PnL tracking.
//!
//! Maintains per-symbol net positions with volume-weighted entry prices.
//! Realized PnL accrues on position-reducing fills; unrealized PnL is
//! recomputed on every mark-to-market call from the latest prices.
//!
//! # Over-close convention
//!
//! Closing more than the open quantity realizes PnL on the full open
//! quantity and flips the position to the opposite side, with the fill
//! price becoming the new entry price. There is no negative-quantity error
//! state: a short is simply a negative net quantity.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::OrderSide;

/// Net position in one symbol: positive quantity = long, negative = short.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Snapshot served by the `/pnl` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PnlSummary {
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub open_positions: HashMap<String, Position>,
}

/// Tracks positions and PnL from the stream of fills.
///
/// Exclusively owned and mutated by the pipeline worker; reporting paths
/// receive cloned summaries.
#[derive(Debug, Default)]
pub struct PositionPnLTracker {
    positions: HashMap<String, Position>,
    realized_pnl: Decimal,
    unrealized_pnl: Decimal,
}

impl PositionPnLTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fill to the book.
    pub fn apply_fill(&mut self, pair: &str, side: OrderSide, fill_price: Decimal, qty: Decimal) {
        let signed = match side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        };

        let position = self.positions.entry(pair.to_string()).or_insert(Position {
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
        });

        if position.quantity.is_zero() {
            position.quantity = signed;
            position.entry_price = fill_price;
        } else if position.quantity.signum() == signed.signum() {
            // Same direction: extend at volume-weighted entry
            let total = position.quantity + signed;
            position.entry_price = (position.entry_price * position.quantity
                + fill_price * signed)
                / total;
            position.quantity = total;
        } else {
            // Reducing (possibly flipping)
            let closing = signed.abs().min(position.quantity.abs());
            let direction = position.quantity.signum();
            self.realized_pnl += (fill_price - position.entry_price) * closing * direction;

            let remaining = position.quantity + signed;
            if remaining.is_zero() {
                self.positions.remove(pair);
            } else if remaining.signum() == direction {
                // Partially closed; entry unchanged
                position.quantity = remaining;
            } else {
                // Flipped through zero: the overshoot opens a fresh position
                // at the fill price
                debug!(pair, %remaining, "position flipped to opposite side");
                position.quantity = remaining;
                position.entry_price = fill_price;
            }
        }
    }

    /// Recompute unrealized PnL from the latest prices. Symbols without a
    /// fresh price keep contributing their last computed value of zero.
    pub fn mark_to_market(&mut self, prices: &HashMap<String, Decimal>) {
        self.unrealized_pnl = self
            .positions
            .iter()
            .filter_map(|(pair, pos)| {
                prices
                    .get(pair)
                    .map(|price| (*price - pos.entry_price) * pos.quantity)
            })
            .sum();
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pnl
    }

    /// Realized plus unrealized.
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    pub fn position(&self, pair: &str) -> Option<&Position> {
        self.positions.get(pair)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn summary(&self) -> PnlSummary {
        PnlSummary {
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl,
            total_pnl: self.total_pnl(),
            open_positions: self.positions.clone(),
        }
    }
}
