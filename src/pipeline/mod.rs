//! The decision-to-execution pipeline worker.
//!
//! A single task owns every piece of mutable decision state (estimator,
//! monitors, positions, drift counters) and processes events one at a time:
//! no two decision cycles overlap, which is what makes the in-place mutation
//! of `EstimatorState`, `Position` and the execution cycle safe. Reporting
//! paths see only atomic snapshots and gauges.
//!
//! Per event: feature build -> decide -> audit -> pipeline composite floor ->
//! risk gate -> leg planning -> cycle execution -> PnL, risk and drift
//! updates. No error from any stage may kill the worker; every failure
//! degrades to a skipped event or a Hold.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::execution::cycle::{CycleOutcome, TradeStateMachine};
use crate::execution::{Fill, LegRequest};
use crate::ingest::{FeatureBuilder, MarketEvent};
use crate::logging::{AuditRecord, DecisionAuditRecorder, PipelineLogThrottler};
use crate::metrics;
use crate::monitoring::{DriftMonitor, DriftReport};
use crate::portfolio::{PnlSummary, PositionPnLTracker};
use crate::risk::RiskManager;
use crate::signal::composite::CompositeSignalEngine;
use crate::signal::{Decision, Signal};
use crate::types::{OrderSide, TrianglePairs};

/// Observer boundary for numeric gauges and counters.
///
/// Injected rather than called as process-wide state so tests can assert on
/// emitted observations; the production implementation writes prometheus.
pub trait EngineObserver: Send + Sync {
    fn on_decision(&self, signal: &Signal);
    fn on_order(&self, fill: &Fill);
    fn on_cycle_complete(&self);
    fn on_hedge(&self);
    fn on_hedge_failure(&self);
    fn on_pnl(&self, total_pnl: Decimal);
    fn on_drift(&self, report: &DriftReport);
}

/// Prometheus-backed observer.
pub struct PrometheusObserver;

impl EngineObserver for PrometheusObserver {
    fn on_decision(&self, signal: &Signal) {
        metrics::SPREAD.set(signal.features.spread);
        metrics::VOLATILITY.set(signal.features.volatility);
        metrics::IMBALANCE.set(signal.features.imbalance);
        metrics::CONFIDENCE_SCORE.set(signal.confidence);
        metrics::ANOMALY_SCORE.set(signal.anomaly);
        metrics::COINTEGRATION_SCORE.set(signal.cointegration_stability);
        metrics::COMPOSITE_SCORE.set(signal.composite_score);
        metrics::record_decision(&signal.decision.to_string());
    }

    fn on_order(&self, fill: &Fill) {
        metrics::record_order(&fill.pair, &fill.side.to_string(), fill.is_filled());
    }

    fn on_cycle_complete(&self) {
        metrics::SUCCESSFUL_CYCLES.inc();
    }

    fn on_hedge(&self) {
        metrics::HEDGE_TRADES.inc();
    }

    fn on_hedge_failure(&self) {
        metrics::UNHEDGED_EXPOSURE.set(1.0);
    }

    fn on_pnl(&self, total_pnl: Decimal) {
        metrics::PNL.set(total_pnl.to_f64().unwrap_or(0.0));
    }

    fn on_drift(&self, report: &DriftReport) {
        metrics::PREDICTIONS_TOTAL.inc();
        metrics::MODEL_PRECISION.set(report.precision);
        metrics::MODEL_PNL_ERROR.set(report.pnl_error);
    }
}

/// Observer that ignores everything; for tests.
pub struct NullObserver;

impl EngineObserver for NullObserver {
    fn on_decision(&self, _signal: &Signal) {}
    fn on_order(&self, _fill: &Fill) {}
    fn on_cycle_complete(&self) {}
    fn on_hedge(&self) {}
    fn on_hedge_failure(&self) {}
    fn on_pnl(&self, _total_pnl: Decimal) {}
    fn on_drift(&self, _report: &DriftReport) {}
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pairs: TrianglePairs,
    /// Notional per arbitrage attempt, in base currency.
    pub trade_notional: Decimal,
    /// A-priori slippage estimate handed to the risk gate.
    pub estimated_slippage: f64,
    /// Composite floor applied before the risk gate. Deliberately distinct
    /// from the router's execution floor; see DESIGN.md.
    pub pipeline_composite_floor: f64,
    /// Heuristic mapping confidence to an expected per-trade PnL, used for
    /// drift evaluation.
    pub predicted_pnl_factor: f64,
    pub throttle_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pairs: TrianglePairs::default(),
            trade_notional: Decimal::new(1_000, 0),
            estimated_slippage: 0.0005,
            pipeline_composite_floor: 0.80,
            predicted_pnl_factor: 0.001,
            throttle_interval_secs: 5,
        }
    }
}

/// Plan the three legs of an arbitrage cycle from a directional signal.
///
/// Buy cycle:  base -> BTC -> ETH -> base (buy the cheap cross).
/// Sell cycle: base -> ETH -> BTC -> base (sell the rich cross).
///
/// Returns `None` when a price fails Decimal conversion; the caller skips
/// the cycle rather than trading on a corrupted quantity.
pub fn plan_legs(
    signal: &Signal,
    notional: Decimal,
    pairs: &TrianglePairs,
) -> Option<[LegRequest; 3]> {
    let btc_usd = Decimal::from_f64(signal.features.btc_usd)?;
    let eth_usd = Decimal::from_f64(signal.features.eth_usd)?;
    let eth_btc = Decimal::from_f64(signal.features.eth_btc)?;
    if btc_usd.is_zero() || eth_usd.is_zero() || eth_btc.is_zero() {
        return None;
    }

    let legs = match signal.decision {
        Decision::Buy => {
            let btc_qty = notional / btc_usd;
            let eth_qty = btc_qty / eth_btc;
            [
                LegRequest {
                    pair: pairs.btc_pair.clone(),
                    side: OrderSide::Buy,
                    quantity: btc_qty,
                    base_price: btc_usd,
                    out_asset: pairs.btc_asset.clone(),
                },
                LegRequest {
                    pair: pairs.cross_pair.clone(),
                    side: OrderSide::Buy,
                    quantity: eth_qty,
                    base_price: eth_btc,
                    out_asset: pairs.eth_asset.clone(),
                },
                LegRequest {
                    pair: pairs.eth_pair.clone(),
                    side: OrderSide::Sell,
                    quantity: eth_qty,
                    base_price: eth_usd,
                    out_asset: pairs.base_asset.clone(),
                },
            ]
        }
        Decision::Sell => {
            let eth_qty = notional / eth_usd;
            let btc_qty = eth_qty * eth_btc;
            [
                LegRequest {
                    pair: pairs.eth_pair.clone(),
                    side: OrderSide::Buy,
                    quantity: eth_qty,
                    base_price: eth_usd,
                    out_asset: pairs.eth_asset.clone(),
                },
                LegRequest {
                    pair: pairs.cross_pair.clone(),
                    side: OrderSide::Sell,
                    quantity: eth_qty,
                    base_price: eth_btc,
                    out_asset: pairs.btc_asset.clone(),
                },
                LegRequest {
                    pair: pairs.btc_pair.clone(),
                    side: OrderSide::Sell,
                    quantity: btc_qty,
                    base_price: btc_usd,
                    out_asset: pairs.base_asset.clone(),
                },
            ]
        }
        Decision::Hold => return None,
    };
    Some(legs)
}

/// The single-writer pipeline worker.
pub struct PipelineWorker {
    config: PipelineConfig,
    feature_builder: Box<dyn FeatureBuilder>,
    engine: CompositeSignalEngine,
    risk: RiskManager,
    state_machine: TradeStateMachine,
    tracker: PositionPnLTracker,
    drift: DriftMonitor,
    audit: Arc<dyn DecisionAuditRecorder>,
    observer: Arc<dyn EngineObserver>,
    /// Out-of-process retraining trigger; the pipeline only emits.
    retrain_tx: Option<mpsc::Sender<DriftReport>>,
    /// Snapshot feed for the `/pnl` endpoint.
    pnl_watch: Option<tokio::sync::watch::Sender<PnlSummary>>,
    throttler: PipelineLogThrottler,
    latest_prices: HashMap<String, Decimal>,
    last_reported_pnl: Decimal,
    events_processed: u64,
}

impl PipelineWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        feature_builder: Box<dyn FeatureBuilder>,
        engine: CompositeSignalEngine,
        risk: RiskManager,
        state_machine: TradeStateMachine,
        tracker: PositionPnLTracker,
        drift: DriftMonitor,
        audit: Arc<dyn DecisionAuditRecorder>,
        observer: Arc<dyn EngineObserver>,
        retrain_tx: Option<mpsc::Sender<DriftReport>>,
        pnl_watch: Option<tokio::sync::watch::Sender<PnlSummary>>,
    ) -> Self {
        let throttler = PipelineLogThrottler::new(config.throttle_interval_secs);
        Self {
            config,
            feature_builder,
            engine,
            risk,
            state_machine,
            tracker,
            drift,
            audit,
            observer,
            retrain_tx,
            pnl_watch,
            throttler,
            latest_prices: HashMap::new(),
            last_reported_pnl: Decimal::ZERO,
            events_processed: 0,
        }
    }

    /// Consume events until the source closes the channel.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MarketEvent>) {
        info!("pipeline worker started");
        while let Some(event) = rx.recv().await {
            self.process_event(event).await;
        }
        info!(
            events = self.events_processed,
            cycles = self.state_machine.successful_cycles(),
            hedges = self.state_machine.hedge_activations(),
            total_pnl = %self.tracker.total_pnl(),
            "event stream closed, pipeline stopped"
        );
    }

    /// Read-only view of the book, for end-of-run reporting.
    pub fn tracker(&self) -> &PositionPnLTracker {
        &self.tracker
    }

    /// Read-only view of the saga state machine.
    pub fn state_machine(&self) -> &TradeStateMachine {
        &self.state_machine
    }

    async fn process_event(&mut self, event: MarketEvent) {
        self.events_processed += 1;

        if let Some(price) = Decimal::from_f64(event.price) {
            self.latest_prices.insert(event.pair.clone(), price);
        } else if self.throttler.malformed_input.should_log() {
            warn!(pair = %event.pair, price = event.price, "unconvertible event price");
        }

        let Some(snapshot) = self.feature_builder.update(&event) else {
            return;
        };

        let signal = self.engine.decide(&snapshot);
        self.observer.on_decision(&signal);
        if let Err(e) = self.audit.record(&AuditRecord::from_signal(&signal)).await {
            error!(error = %e, "audit record failed");
        }

        if !signal.is_actionable() {
            if self.throttler.hold_decision.should_log() {
                let suppressed = self.throttler.hold_decision.get_and_reset_suppressed_count();
                debug!(reason = signal.reason, suppressed, "holding");
            }
            return;
        }

        if signal.composite_score < self.config.pipeline_composite_floor {
            info!(
                composite = signal.composite_score,
                floor = self.config.pipeline_composite_floor,
                "signal blocked at pipeline composite floor"
            );
            return;
        }

        let notional = self.config.trade_notional;
        if !self
            .risk
            .check_trade_permission(&signal, notional, self.config.estimated_slippage)
        {
            if self.throttler.risk_block.should_log() {
                warn!(decision = %signal.decision, "trade blocked by risk gate");
            }
            return;
        }

        let Some(legs) = plan_legs(&signal, notional, &self.config.pairs) else {
            error!("leg planning failed, skipping cycle");
            return;
        };

        let base_asset = self.config.pairs.base_asset.clone();
        let report = self
            .state_machine
            .execute_cycle(&signal, legs, &base_asset)
            .await;

        for fill in &report.fills {
            self.observer.on_order(fill);
            if fill.is_filled() {
                self.tracker
                    .apply_fill(&fill.pair, fill.side, fill.filled_price, fill.quantity);
            }
        }
        self.tracker.mark_to_market(&self.latest_prices);

        let trade_executed = match &report.outcome {
            CycleOutcome::Complete => {
                self.observer.on_cycle_complete();
                true
            }
            CycleOutcome::Compensated { hedged_asset } => {
                info!(asset = %hedged_asset, "cycle recovered via hedge");
                self.observer.on_hedge();
                true
            }
            CycleOutcome::HedgeFailed {
                residual_asset,
                quantity,
                error,
            } => {
                error!(
                    asset = %residual_asset,
                    %quantity,
                    %error,
                    "OPERATOR ALERT: unhedged residual exposure"
                );
                self.observer.on_hedge();
                self.observer.on_hedge_failure();
                true
            }
            CycleOutcome::Aborted { error } => {
                warn!(%error, "cycle aborted before exposure");
                false
            }
            CycleOutcome::Abandoned { reason } => {
                debug!(reason, "cycle abandoned");
                false
            }
        };

        let total_pnl = self.tracker.total_pnl();
        let pnl_delta = total_pnl - self.last_reported_pnl;
        if !pnl_delta.is_zero() {
            self.risk.daily().record_pnl(pnl_delta);
            self.last_reported_pnl = total_pnl;
        }
        self.observer.on_pnl(total_pnl);
        if let Some(watch) = &self.pnl_watch {
            let _ = watch.send(self.tracker.summary());
        }

        if trade_executed {
            self.evaluate_drift(&signal, pnl_delta).await;
        }
    }

    /// Score the model against this trade's realized outcome and, when
    /// drift is detected, notify the external retraining collaborator.
    async fn evaluate_drift(&mut self, signal: &Signal, pnl_delta: Decimal) {
        let actual_pnl = pnl_delta.to_f64().unwrap_or(0.0);
        let predicted_signal: i8 = match signal.decision {
            Decision::Buy => 1,
            Decision::Sell => -1,
            Decision::Hold => 0,
        };
        // Outcome is directional: a profitable cycle confirms the predicted
        // direction, a losing one contradicts it.
        let actual_outcome: i8 = if actual_pnl >= 0.0 {
            predicted_signal
        } else {
            -predicted_signal
        };

        let predicted_pnl = signal.confidence * self.config.predicted_pnl_factor;
        let drift = self
            .drift
            .update(predicted_signal, actual_outcome, predicted_pnl, actual_pnl);
        self.observer.on_drift(&drift);

        let entry = AuditRecord::from_signal(signal).with_outcome(actual_outcome, actual_pnl);
        if let Err(e) = self.audit.record(&entry).await {
            error!(error = %e, "audit outcome record failed");
        }

        if drift.drift_detected {
            if let Some(tx) = &self.retrain_tx {
                if let Err(e) = tx.try_send(drift) {
                    warn!(error = %e, "retraining trigger channel full or closed");
                }
            }
        }
    }
}
