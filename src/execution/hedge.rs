//! Compensating hedge for incomplete arbitrage cycles.
//!
//! When a cycle breaks after leg 1 has filled, the engine is left holding an
//! intermediate asset. The hedge flattens that residual back into the base
//! currency with a single market sell, so exposure never drifts unbounded.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::execution::{ExecutionError, Fill, OrderBroker, OrderStatus};
use crate::types::OrderSide;

/// Flattens residual exposure through the broker boundary.
pub struct HedgeHandler {
    broker: Arc<dyn OrderBroker>,
}

impl HedgeHandler {
    pub fn new(broker: Arc<dyn OrderBroker>) -> Self {
        Self { broker }
    }

    /// Market-sell `quantity` of `residual_asset` into `base_asset`.
    ///
    /// Returns the hedge fill on success. On failure the caller is left with
    /// open exposure; this is the one path with no further automatic
    /// recovery, so it must be surfaced to an operator-visible alert.
    pub async fn flatten(
        &self,
        residual_asset: &str,
        quantity: Decimal,
        base_asset: &str,
        reference_price: Decimal,
    ) -> Result<Fill, ExecutionError> {
        let pair = format!("{}{}", residual_asset, base_asset);
        warn!(
            %quantity,
            residual_asset,
            base_asset,
            "initiating hedge of residual exposure"
        );

        let report = self
            .broker
            .place_market_order(&pair, OrderSide::Sell, quantity)
            .await
            .map_err(|e| {
                error!(%pair, error = %e, "hedge order failed - residual exposure remains");
                e
            })?;

        if !report.filled {
            error!(%pair, "hedge order unfilled - residual exposure remains");
            return Err(ExecutionError::OrderRejected(format!(
                "hedge order on {} not filled",
                pair
            )));
        }

        let slippage = if reference_price.is_zero() {
            Decimal::ZERO
        } else {
            (report.fill_price - reference_price) / reference_price
        };
        let fill = Fill {
            order_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            pair,
            side: OrderSide::Sell,
            requested_price: reference_price,
            filled_price: report.fill_price,
            slippage,
            quantity,
            notional: report.fill_price * quantity,
            status: OrderStatus::Filled,
        };

        info!(
            pair = %fill.pair,
            quantity = %fill.quantity,
            filled_price = %fill.filled_price,
            "hedge executed"
        );
        Ok(fill)
    }
}
