//! Three-leg execution state machine with compensating hedge.
//!
//! An arbitrage attempt is a saga: three sequential market orders that must
//! all fill, or the engine must flatten whatever intermediate asset it is
//! left holding. The machine is an explicit tagged state enum with a single
//! compensation transition, which makes the core invariant mechanically
//! checkable: every exit path either completes all three legs or invokes the
//! hedge exactly once.
//!
//! State transitions:
//!
//! ```text
//! Idle -> Leg1Pending -> Leg2Pending -> Leg3Pending -> Complete
//!                  \            \             \
//!                   \            +-> Compensating -> Compensated
//!                    +-> Idle (abort, no exposure taken)
//! ```
//!
//! Legs are strictly sequential: leg 2 is not submitted until leg 1's fill
//! status is known. This trades latency for correctness of the compensation
//! logic. A cycle past leg 1 cannot be cancelled; only pre-leg1 decisions
//! may be abandoned (gated by the router or the execution breaker).

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::execution::hedge::HedgeHandler;
use crate::execution::router::OrderRouter;
use crate::execution::{ExecutionError, Fill, LegRequest};
use crate::resilience::ExecutionBreaker;
use crate::signal::Signal;

/// Saga states for one arbitrage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Leg1Pending,
    Leg2Pending,
    Leg3Pending,
    Complete,
    Compensating,
    Compensated,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Leg1Pending => "leg1_pending",
            Self::Leg2Pending => "leg2_pending",
            Self::Leg3Pending => "leg3_pending",
            Self::Complete => "complete",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
        };
        write!(f, "{}", name)
    }
}

/// Residual exposure left by a partially executed cycle.
#[derive(Debug, Clone)]
struct Residual {
    asset: String,
    quantity: Decimal,
    reference_price: Decimal,
}

/// Per-cycle leg bookkeeping. Lives for the duration of one `execute_cycle`
/// call; reset at entry.
#[derive(Debug, Default)]
struct ExecutionCycle {
    leg_filled: [bool; 3],
    residual: Option<Residual>,
}

impl ExecutionCycle {
    fn reset(&mut self) {
        self.leg_filled = [false; 3];
        self.residual = None;
    }

    fn is_complete(&self) -> bool {
        self.leg_filled.iter().all(|f| *f)
    }

    /// The only configuration that requires a hedge: leg 1 filled but the
    /// cycle did not complete.
    fn is_incomplete(&self) -> bool {
        self.leg_filled[0] && !self.is_complete()
    }
}

/// Outcome of one `execute_cycle` call.
#[derive(Debug)]
pub enum CycleOutcome {
    /// All three legs filled.
    Complete,
    /// Nothing executed: breaker open or the router gated leg 1.
    Abandoned { reason: String },
    /// Leg 1 failed outright; no exposure was taken, no hedge needed.
    Aborted { error: ExecutionError },
    /// Partial execution; the residual was flattened by the hedge.
    Compensated { hedged_asset: String },
    /// Partial execution and the hedge itself failed. Residual exposure
    /// remains; operator intervention required.
    HedgeFailed {
        residual_asset: String,
        quantity: Decimal,
        error: ExecutionError,
    },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Complete)
    }
}

/// Full report from one cycle: the outcome plus every fill that actually
/// executed (leg fills and, when compensation ran, the hedge fill last).
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub fills: Vec<Fill>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Orchestrates the three-leg cycle atop the order router.
pub struct TradeStateMachine {
    router: Arc<dyn OrderRouter>,
    hedge: HedgeHandler,
    breaker: Arc<ExecutionBreaker>,
    state: CycleState,
    cycle: ExecutionCycle,
    successful_cycles: u64,
    hedge_activations: u64,
}

impl TradeStateMachine {
    pub fn new(
        router: Arc<dyn OrderRouter>,
        hedge: HedgeHandler,
        breaker: Arc<ExecutionBreaker>,
    ) -> Self {
        Self {
            router,
            hedge,
            breaker,
            state: CycleState::Idle,
            cycle: ExecutionCycle::default(),
            successful_cycles: 0,
            hedge_activations: 0,
        }
    }

    /// Execute one full arbitrage cycle for `signal`.
    ///
    /// `base_asset` is the currency residual exposure is hedged back into.
    pub async fn execute_cycle(
        &mut self,
        signal: &Signal,
        legs: [LegRequest; 3],
        base_asset: &str,
    ) -> CycleReport {
        self.cycle.reset();
        self.transition(CycleState::Idle);

        if self.breaker.is_open() {
            return CycleReport {
                outcome: CycleOutcome::Abandoned {
                    reason: "execution breaker open".to_string(),
                },
                fills: Vec::new(),
            };
        }

        let mut fills: Vec<Fill> = Vec::with_capacity(4);

        // --- Leg 1: failure here means no exposure, so no hedge. ---
        self.transition(CycleState::Leg1Pending);
        match self.router.send_order(signal, &legs[0]).await {
            Ok(None) => {
                self.transition(CycleState::Idle);
                return CycleReport {
                    outcome: CycleOutcome::Abandoned {
                        reason: "router gated leg 1".to_string(),
                    },
                    fills,
                };
            }
            Ok(Some(fill)) if fill.is_filled() => {
                self.cycle.leg_filled[0] = true;
                self.cycle.residual = Some(Residual {
                    asset: legs[0].out_asset.clone(),
                    quantity: fill.acquired_quantity(),
                    reference_price: legs[0].base_price,
                });
                fills.push(fill);
            }
            Ok(Some(fill)) => {
                error!(pair = %fill.pair, "leg 1 unfilled, aborting cycle");
                self.breaker.record_failure();
                self.transition(CycleState::Idle);
                return CycleReport {
                    outcome: CycleOutcome::Aborted {
                        error: ExecutionError::OrderRejected("leg 1 unfilled".to_string()),
                    },
                    fills,
                };
            }
            Err(e) => {
                error!(error = %e, "leg 1 execution failed, aborting cycle");
                self.breaker.record_failure();
                self.transition(CycleState::Idle);
                return CycleReport {
                    outcome: CycleOutcome::Aborted { error: e },
                    fills,
                };
            }
        }

        // --- Leg 2: any failure from here on requires compensation. ---
        self.transition(CycleState::Leg2Pending);
        match self.router.send_order(signal, &legs[1]).await {
            Ok(Some(fill)) if fill.is_filled() => {
                self.cycle.leg_filled[1] = true;
                self.cycle.residual = Some(Residual {
                    asset: legs[1].out_asset.clone(),
                    quantity: fill.acquired_quantity(),
                    // The leg-3 pair prices the post-leg2 asset in base terms.
                    reference_price: legs[2].base_price,
                });
                fills.push(fill);
            }
            Ok(Some(fill)) => {
                warn!(pair = %fill.pair, "leg 2 unfilled");
                fills.push(fill);
                return self.compensate(fills, base_asset).await;
            }
            Ok(None) => {
                warn!("leg 2 gated mid-cycle");
                return self.compensate(fills, base_asset).await;
            }
            Err(e) => {
                error!(error = %e, "leg 2 execution failed");
                return self.compensate(fills, base_asset).await;
            }
        }

        // --- Leg 3 ---
        self.transition(CycleState::Leg3Pending);
        match self.router.send_order(signal, &legs[2]).await {
            Ok(Some(fill)) if fill.is_filled() => {
                self.cycle.leg_filled[2] = true;
                fills.push(fill);
            }
            Ok(Some(fill)) => {
                warn!(pair = %fill.pair, "leg 3 unfilled");
                fills.push(fill);
                return self.compensate(fills, base_asset).await;
            }
            Ok(None) => {
                warn!("leg 3 gated mid-cycle");
                return self.compensate(fills, base_asset).await;
            }
            Err(e) => {
                error!(error = %e, "leg 3 execution failed");
                return self.compensate(fills, base_asset).await;
            }
        }

        // --- Final validation sweep ---
        if self.cycle.is_complete() {
            self.successful_cycles += 1;
            self.breaker.record_success();
            self.transition(CycleState::Complete);
            info!(
                cycles = self.successful_cycles,
                "arbitrage cycle completed successfully"
            );
            CycleReport {
                outcome: CycleOutcome::Complete,
                fills,
            }
        } else {
            // Unreachable through the branches above, but the invariant is
            // cheap to keep airtight: leg 1 exposure with an incomplete
            // cycle always compensates.
            warn!("incomplete cycle detected at final validation");
            self.compensate(fills, base_asset).await
        }
    }

    /// The single compensation transition. Callers return its result
    /// immediately, which is what bounds the hedge to once per cycle.
    async fn compensate(&mut self, mut fills: Vec<Fill>, base_asset: &str) -> CycleReport {
        debug_assert!(self.cycle.is_incomplete());
        self.transition(CycleState::Compensating);
        self.breaker.record_failure();

        let Some(residual) = self.cycle.residual.clone() else {
            // Residual is recorded with every filled leg; reaching here
            // without one would mean leg 1 never filled.
            error!("compensation entered without residual exposure");
            return CycleReport {
                outcome: CycleOutcome::HedgeFailed {
                    residual_asset: String::new(),
                    quantity: Decimal::ZERO,
                    error: ExecutionError::Exchange("residual unknown".to_string()),
                },
                fills,
            };
        };

        warn!(
            asset = %residual.asset,
            quantity = %residual.quantity,
            base = base_asset,
            "recovering incomplete cycle via hedge"
        );
        self.hedge_activations += 1;

        match self
            .hedge
            .flatten(
                &residual.asset,
                residual.quantity,
                base_asset,
                residual.reference_price,
            )
            .await
        {
            Ok(hedge_fill) => {
                fills.push(hedge_fill);
                self.transition(CycleState::Compensated);
                CycleReport {
                    outcome: CycleOutcome::Compensated {
                        hedged_asset: residual.asset,
                    },
                    fills,
                }
            }
            Err(e) => {
                // Terminal for this cycle: exposure remains and only an
                // operator can resolve it.
                error!(
                    asset = %residual.asset,
                    quantity = %residual.quantity,
                    error = %e,
                    "hedge failed - unhedged residual exposure remains"
                );
                CycleReport {
                    outcome: CycleOutcome::HedgeFailed {
                        residual_asset: residual.asset,
                        quantity: residual.quantity,
                        error: e,
                    },
                    fills,
                }
            }
        }
    }

    fn transition(&mut self, next: CycleState) {
        if self.state != next {
            self.state = next;
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn successful_cycles(&self) -> u64 {
        self.successful_cycles
    }

    pub fn hedge_activations(&self) -> u64 {
        self.hedge_activations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::router::RouterConfig;
    use crate::execution::{BrokerFill, OrderBroker, OrderStatus};
    use crate::signal::features::FeatureVector;
    use crate::signal::Decision;
    use crate::types::OrderSide;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    fn buy_signal() -> Signal {
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

    fn buy_legs() -> [LegRequest; 3] {
        [
            LegRequest {
                pair: "BTCUSDT".to_string(),
                side: OrderSide::Buy,
                quantity: dec!(0.01),
                base_price: dec!(60000),
                out_asset: "BTC".to_string(),
            },
            LegRequest {
                pair: "ETHBTC".to_string(),
                side: OrderSide::Buy,
                quantity: dec!(0.2),
                base_price: dec!(0.0495),
                out_asset: "ETH".to_string(),
            },
            LegRequest {
                pair: "ETHUSDT".to_string(),
                side: OrderSide::Sell,
                quantity: dec!(0.2),
                base_price: dec!(3000),
                out_asset: "USDT".to_string(),
            },
        ]
    }

    /// Router whose nth order follows a scripted outcome.
    struct ScriptedRouter {
        script: Vec<Result<Option<OrderStatus>, ExecutionError>>,
        calls: AtomicUsize,
    }

    impl ScriptedRouter {
        fn new(script: Vec<Result<Option<OrderStatus>, ExecutionError>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderRouter for ScriptedRouter {
        async fn send_order(
            &self,
            _signal: &Signal,
            leg: &LegRequest,
        ) -> Result<Option<Fill>, ExecutionError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(idx).cloned().unwrap_or(Ok(None)) {
                Ok(Some(status)) => Ok(Some(Fill {
                    order_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    pair: leg.pair.clone(),
                    side: leg.side,
                    requested_price: leg.base_price,
                    filled_price: leg.base_price,
                    slippage: Decimal::ZERO,
                    quantity: leg.quantity,
                    notional: leg.base_price * leg.quantity,
                    status,
                })),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }

    /// Broker backing the hedge; records hedge orders.
    struct HedgeBroker {
        orders: Mutex<Vec<(String, Decimal)>>,
        fail: bool,
    }

    impl HedgeBroker {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                orders: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl OrderBroker for HedgeBroker {
        async fn place_market_order(
            &self,
            pair: &str,
            _side: OrderSide,
            quantity: Decimal,
        ) -> Result<BrokerFill, ExecutionError> {
            self.orders.lock().unwrap().push((pair.to_string(), quantity));
            if self.fail {
                Err(ExecutionError::Network("venue down".to_string()))
            } else {
                Ok(BrokerFill {
                    filled: true,
                    fill_price: dec!(59990),
                })
            }
        }
    }

    fn machine(
        script: Vec<Result<Option<OrderStatus>, ExecutionError>>,
        hedge_broker: Arc<HedgeBroker>,
    ) -> TradeStateMachine {
        TradeStateMachine::new(
            Arc::new(ScriptedRouter::new(script)),
            HedgeHandler::new(hedge_broker),
            Arc::new(ExecutionBreaker::new(5, Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn test_complete_cycle_never_hedges() {
        let broker = HedgeBroker::new(false);
        let mut sm = machine(
            vec![
                Ok(Some(OrderStatus::Filled)),
                Ok(Some(OrderStatus::Filled)),
                Ok(Some(OrderStatus::Filled)),
            ],
            broker.clone(),
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(report.is_success());
        assert_eq!(sm.state(), CycleState::Complete);
        assert_eq!(sm.successful_cycles(), 1);
        assert_eq!(sm.hedge_activations(), 0);
        assert_eq!(report.fills.len(), 3);
        assert!(broker.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leg1_error_aborts_without_hedge() {
        let broker = HedgeBroker::new(false);
        let mut sm = machine(
            vec![Err(ExecutionError::Network("timeout".to_string()))],
            broker.clone(),
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(matches!(report.outcome, CycleOutcome::Aborted { .. }));
        assert_eq!(sm.state(), CycleState::Idle);
        assert_eq!(sm.hedge_activations(), 0);
        assert!(broker.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leg2_failure_hedges_leg1_residual_exactly_once() {
        let broker = HedgeBroker::new(false);
        let mut sm = machine(
            vec![
                Ok(Some(OrderStatus::Filled)),
                Err(ExecutionError::Exchange("rejected".to_string())),
            ],
            broker.clone(),
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(!report.is_success());
        assert!(
            matches!(&report.outcome, CycleOutcome::Compensated { hedged_asset } if hedged_asset == "BTC")
        );
        assert_eq!(sm.state(), CycleState::Compensated);
        assert_eq!(sm.hedge_activations(), 1);
        assert_eq!(sm.successful_cycles(), 0);

        // Hedge sold exactly leg 1's residual back to base
        let orders = broker.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].0, "BTCUSDT");
        assert_eq!(orders[0].1, dec!(0.01));

        // Leg 1 fill + hedge fill
        assert_eq!(report.fills.len(), 2);
    }

    #[tokio::test]
    async fn test_leg3_unfilled_hedges_leg2_residual() {
        let broker = HedgeBroker::new(false);
        let mut sm = machine(
            vec![
                Ok(Some(OrderStatus::Filled)),
                Ok(Some(OrderStatus::Filled)),
                Ok(Some(OrderStatus::Failed)),
            ],
            broker.clone(),
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(
            matches!(&report.outcome, CycleOutcome::Compensated { hedged_asset } if hedged_asset == "ETH")
        );

        let orders = broker.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].0, "ETHUSDT");
        // Leg 2 was a buy of 0.2 ETH, so that is the residual
        assert_eq!(orders[0].1, dec!(0.2));
    }

    #[tokio::test]
    async fn test_hedge_failure_is_terminal_for_cycle() {
        let broker = HedgeBroker::new(true);
        let mut sm = machine(
            vec![
                Ok(Some(OrderStatus::Filled)),
                Err(ExecutionError::Exchange("rejected".to_string())),
            ],
            broker,
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        match &report.outcome {
            CycleOutcome::HedgeFailed {
                residual_asset,
                quantity,
                ..
            } => {
                assert_eq!(residual_asset, "BTC");
                assert_eq!(*quantity, dec!(0.01));
            }
            other => panic!("expected HedgeFailed, got {:?}", other),
        }
        assert_eq!(sm.state(), CycleState::Compensating);
    }

    #[tokio::test]
    async fn test_gated_leg1_abandons_cleanly() {
        let broker = HedgeBroker::new(false);
        let mut sm = machine(vec![Ok(None)], broker.clone());

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(matches!(report.outcome, CycleOutcome::Abandoned { .. }));
        assert_eq!(sm.state(), CycleState::Idle);
        assert!(report.fills.is_empty());
    }

    #[tokio::test]
    async fn test_open_breaker_blocks_new_cycles() {
        let broker = HedgeBroker::new(false);
        let breaker = Arc::new(ExecutionBreaker::new(1, Duration::from_secs(600)));
        breaker.record_failure();

        let mut sm = TradeStateMachine::new(
            Arc::new(ScriptedRouter::new(vec![Ok(Some(OrderStatus::Filled))])),
            HedgeHandler::new(broker),
            breaker,
        );

        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(
            matches!(&report.outcome, CycleOutcome::Abandoned { reason } if reason.contains("breaker"))
        );
    }

    #[tokio::test]
    async fn test_consecutive_failures_trip_breaker() {
        let broker = HedgeBroker::new(false);
        let breaker = Arc::new(ExecutionBreaker::new(2, Duration::from_secs(600)));
        let mut sm = TradeStateMachine::new(
            Arc::new(ScriptedRouter::new(vec![
                Err(ExecutionError::Network("down".to_string())),
                Err(ExecutionError::Network("down".to_string())),
                Ok(Some(OrderStatus::Filled)),
            ])),
            HedgeHandler::new(broker),
            breaker,
        );

        let _ = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        let _ = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;

        // Third attempt is pre-leg1 abandoned by the tripped breaker
        let report = sm.execute_cycle(&buy_signal(), buy_legs(), "USDT").await;
        assert!(matches!(report.outcome, CycleOutcome::Abandoned { .. }));
    }
}
