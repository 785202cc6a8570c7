//! Order routing: paper (simulated) and live variants behind one trait.
//!
//! The router is the execution-boundary gate: Hold signals and signals whose
//! composite score sits below the execution floor are dropped here with
//! `Ok(None)`, before any order reaches a venue. This floor (default 0.85)
//! is deliberately distinct from the pipeline-level composite floor (default
//! 0.80); the two gates are separate configuration surfaces.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::execution::{BrokerFill, ExecutionError, Fill, LegRequest, OrderBroker, OrderStatus};
use crate::signal::{Decision, Signal};
use crate::types::OrderSide;

/// Router tuning knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound for simulated slippage, in basis points.
    pub slippage_bps: f64,
    /// Composite score below which the router refuses to execute.
    pub execution_composite_floor: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 5.0,
            execution_composite_floor: 0.85,
        }
    }
}

/// Polymorphic single-leg order routing.
#[async_trait]
pub trait OrderRouter: Send + Sync {
    /// Route one leg. `Ok(None)` means the order was gated (Hold signal or
    /// composite below the execution floor) and no order was placed.
    async fn send_order(
        &self,
        signal: &Signal,
        leg: &LegRequest,
    ) -> Result<Option<Fill>, ExecutionError>;
}

/// Shared gate logic: returns `false` when the signal must not execute.
fn passes_execution_gate(signal: &Signal, floor: f64) -> bool {
    if signal.decision == Decision::Hold {
        debug!("skipping hold signal at execution boundary");
        return false;
    }
    if signal.composite_score < floor {
        info!(
            composite = signal.composite_score,
            floor, "execution blocked: composite score below floor"
        );
        return false;
    }
    true
}

/// Simulated execution: every order fills at the reference price adjusted by
/// a bounded uniform slippage draw. Executed orders are retained for
/// inspection.
pub struct PaperRouter {
    config: RouterConfig,
    orders: Mutex<Vec<Fill>>,
}

impl PaperRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Most recent executed order, if any.
    pub fn last_order(&self) -> Option<Fill> {
        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn orders_executed(&self) -> usize {
        self.orders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl OrderRouter for PaperRouter {
    async fn send_order(
        &self,
        signal: &Signal,
        leg: &LegRequest,
    ) -> Result<Option<Fill>, ExecutionError> {
        if !passes_execution_gate(signal, self.config.execution_composite_floor) {
            return Ok(None);
        }

        let slip_fraction = rand::thread_rng().gen_range(0.0..=self.config.slippage_bps) / 10_000.0;
        let slip = Decimal::from_f64(slip_fraction).ok_or_else(|| {
            ExecutionError::NumericConversion(format!("slippage fraction {}", slip_fraction))
        })?;

        // Buys pay up, sells give up
        let filled_price = match leg.side {
            OrderSide::Buy => leg.base_price * (Decimal::ONE + slip),
            OrderSide::Sell => leg.base_price * (Decimal::ONE - slip),
        };

        let fill = Fill {
            order_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            pair: leg.pair.clone(),
            side: leg.side,
            requested_price: leg.base_price,
            filled_price,
            slippage: slip,
            quantity: leg.quantity,
            notional: filled_price * leg.quantity,
            status: OrderStatus::Filled,
        };

        info!(
            pair = %fill.pair,
            side = %fill.side,
            quantity = %fill.quantity,
            filled_price = %fill.filled_price,
            "simulated order executed"
        );

        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(fill.clone());
        Ok(Some(fill))
    }
}

/// Live execution: submits a real market order through the broker boundary
/// and reports the actual fill or failure.
pub struct LiveRouter {
    config: RouterConfig,
    broker: Arc<dyn OrderBroker>,
}

impl LiveRouter {
    pub fn new(config: RouterConfig, broker: Arc<dyn OrderBroker>) -> Self {
        Self { config, broker }
    }

    fn fill_from_broker(&self, leg: &LegRequest, report: BrokerFill) -> Fill {
        let slippage = if leg.base_price.is_zero() {
            Decimal::ZERO
        } else {
            (report.fill_price - leg.base_price) / leg.base_price
        };
        Fill {
            order_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            pair: leg.pair.clone(),
            side: leg.side,
            requested_price: leg.base_price,
            filled_price: report.fill_price,
            slippage,
            quantity: leg.quantity,
            notional: report.fill_price * leg.quantity,
            status: if report.filled {
                OrderStatus::Filled
            } else {
                OrderStatus::Failed
            },
        }
    }
}

#[async_trait]
impl OrderRouter for LiveRouter {
    async fn send_order(
        &self,
        signal: &Signal,
        leg: &LegRequest,
    ) -> Result<Option<Fill>, ExecutionError> {
        if !passes_execution_gate(signal, self.config.execution_composite_floor) {
            return Ok(None);
        }

        let report = self
            .broker
            .place_market_order(&leg.pair, leg.side, leg.quantity)
            .await?;
        Ok(Some(self.fill_from_broker(leg, report)))
    }
}

/// Simulated broker backing the hedge path in paper mode: every market
/// order fills at the last marked price adjusted by a bounded uniform
/// slippage draw, so paper hedges always succeed.
pub struct PaperBroker {
    slippage_bps: f64,
    last_prices: Mutex<std::collections::HashMap<String, Decimal>>,
}

impl PaperBroker {
    pub fn new(slippage_bps: f64) -> Self {
        Self {
            slippage_bps,
            last_prices: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Keep the broker's idea of fair value fresh; paper fills are struck
    /// against these marks.
    pub fn mark_price(&self, pair: &str, price: Decimal) {
        self.last_prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pair.to_string(), price);
    }
}

#[async_trait]
impl OrderBroker for PaperBroker {
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        _quantity: Decimal,
    ) -> Result<BrokerFill, ExecutionError> {
        let mark = self
            .last_prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(pair)
            .copied()
            .ok_or_else(|| {
                ExecutionError::Exchange(format!("no mark price for {} in paper broker", pair))
            })?;

        let slip_fraction = rand::thread_rng().gen_range(0.0..=self.slippage_bps) / 10_000.0;
        let slip = Decimal::from_f64(slip_fraction).ok_or_else(|| {
            ExecutionError::NumericConversion(format!("slippage fraction {}", slip_fraction))
        })?;
        let fill_price = match side {
            OrderSide::Buy => mark * (Decimal::ONE + slip),
            OrderSide::Sell => mark * (Decimal::ONE - slip),
        };

        Ok(BrokerFill {
            filled: true,
            fill_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::features::FeatureVector;
    use rust_decimal_macros::dec;

    fn signal(decision: Decision, composite: f64) -> Signal {
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
            decision,
            side: match decision {
                Decision::Buy => Some(OrderSide::Buy),
                Decision::Sell => Some(OrderSide::Sell),
                Decision::Hold => None,
            },
            reason: "test",
            z_score: -2.5,
            model_signal: 1,
            confidence: 0.95,
            anomaly: 0.1,
            cointegration_stability: 0.9,
            composite_score: composite,
            kalman_alpha: 0.0,
            kalman_beta: 0.05,
            features,
        }
    }

    fn leg() -> LegRequest {
        LegRequest {
            pair: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(0.01),
            base_price: dec!(60000),
            out_asset: "BTC".to_string(),
        }
    }

    #[tokio::test]
    async fn test_hold_signal_is_gated() {
        let router = PaperRouter::new(RouterConfig::default());
        let result = router
            .send_order(&signal(Decision::Hold, 0.95), &leg())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(router.orders_executed(), 0);
    }

    #[tokio::test]
    async fn test_low_composite_is_gated() {
        let router = PaperRouter::new(RouterConfig::default());
        let result = router
            .send_order(&signal(Decision::Buy, 0.84), &leg())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_simulated_fill_within_slippage_bounds() {
        let router = PaperRouter::new(RouterConfig {
            slippage_bps: 5.0,
            execution_composite_floor: 0.85,
        });
        for _ in 0..50 {
            let fill = router
                .send_order(&signal(Decision::Buy, 0.9), &leg())
                .await
                .unwrap()
                .expect("order should execute");
            assert!(fill.is_filled());
            assert!(fill.filled_price >= dec!(60000));
            // 5 bps cap on a 60k reference
            assert!(fill.filled_price <= dec!(60030));
            assert!(fill.slippage >= Decimal::ZERO);
        }
        assert_eq!(router.orders_executed(), 50);
    }

    #[tokio::test]
    async fn test_sell_slippage_reduces_price() {
        let router = PaperRouter::new(RouterConfig::default());
        let mut sell_leg = leg();
        sell_leg.side = OrderSide::Sell;
        let fill = router
            .send_order(&signal(Decision::Sell, 0.9), &sell_leg)
            .await
            .unwrap()
            .unwrap();
        assert!(fill.filled_price <= sell_leg.base_price);
    }

    struct FixedBroker {
        filled: bool,
        price: Decimal,
    }

    #[async_trait]
    impl OrderBroker for FixedBroker {
        async fn place_market_order(
            &self,
            _pair: &str,
            _side: OrderSide,
            _quantity: Decimal,
        ) -> Result<BrokerFill, ExecutionError> {
            Ok(BrokerFill {
                filled: self.filled,
                fill_price: self.price,
            })
        }
    }

    #[tokio::test]
    async fn test_live_router_reports_broker_outcome() {
        let broker = Arc::new(FixedBroker {
            filled: true,
            price: dec!(60012),
        });
        let router = LiveRouter::new(RouterConfig::default(), broker);
        let fill = router
            .send_order(&signal(Decision::Buy, 0.9), &leg())
            .await
            .unwrap()
            .unwrap();
        assert!(fill.is_filled());
        assert_eq!(fill.filled_price, dec!(60012));
        assert_eq!(fill.slippage, dec!(0.0002));
    }

    #[tokio::test]
    async fn test_paper_broker_fills_at_mark() {
        let broker = PaperBroker::new(0.0);
        broker.mark_price("BTCUSDT", dec!(60000));

        let fill = broker
            .place_market_order("BTCUSDT", OrderSide::Sell, dec!(0.01))
            .await
            .unwrap();
        assert!(fill.filled);
        assert_eq!(fill.fill_price, dec!(60000));
    }

    #[tokio::test]
    async fn test_paper_broker_rejects_unknown_pair() {
        let broker = PaperBroker::new(5.0);
        let result = broker
            .place_market_order("DOGEUSDT", OrderSide::Buy, dec!(1))
            .await;
        assert!(matches!(result, Err(ExecutionError::Exchange(_))));
    }

    #[tokio::test]
    async fn test_live_router_reports_unfilled() {
        let broker = Arc::new(FixedBroker {
            filled: false,
            price: Decimal::ZERO,
        });
        let router = LiveRouter::new(RouterConfig::default(), broker);
        let fill = router
            .send_order(&signal(Decision::Buy, 0.9), &leg())
            .await
            .unwrap()
            .unwrap();
        assert!(!fill.is_filled());
    }
}
