use clap::Parser;
use dotenv::dotenv;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triarb::cli::{Cli, Commands, EngineConfig};
use triarb::execution::cycle::TradeStateMachine;
use triarb::execution::hedge::HedgeHandler;
use triarb::execution::router::{PaperBroker, PaperRouter};
use triarb::health::{run_health_server, HealthState};
use triarb::ingest::replay::ReplayIngestor;
use triarb::ingest::stdin::StdinIngestor;
use triarb::ingest::{EventSource, TriangleFeatureBuilder};
use triarb::logging::{DecisionAuditRecorder, JsonAuditLogger, NullAuditRecorder};
use triarb::math::KalmanSpreadEstimator;
use triarb::metrics;
use triarb::monitoring::DriftMonitor;
use triarb::pipeline::{PipelineWorker, PrometheusObserver};
use triarb::portfolio::PositionPnLTracker;
use triarb::resilience::ExecutionBreaker;
use triarb::risk::{DailyLossLimiter, RiskManager};
use triarb::signal::anomaly::AnomalyScorer;
use triarb::signal::cointegration::CointegrationMonitor;
use triarb::signal::composite::CompositeSignalEngine;
use triarb::signal::model::{ModelArtifact, ModelScorer};
use triarb::types::TradingMode;

/// Consecutive failed cycles before the execution breaker opens.
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
/// Cooldown before a probe cycle is allowed through an open breaker.
const BREAKER_COOLDOWN_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.verbose)),
        )
        .init();

    match cli.command {
        Commands::Run {
            live,
            notional,
            max_daily_loss,
            pipeline_floor,
            execution_floor,
            slippage_bps,
            model,
            audit,
            port,
        } => {
            let mode = if live {
                TradingMode::Live
            } else {
                TradingMode::Paper
            };
            let config = EngineConfig::from_cli(
                mode,
                notional,
                max_daily_loss,
                pipeline_floor,
                execution_floor,
                slippage_bps,
                model,
                audit,
                port,
            )?;
            run_engine(config, None).await;
        }
        Commands::Replay {
            csv,
            pace_ms,
            notional,
            model,
            audit,
            port,
        } => {
            let config = EngineConfig::from_cli(
                TradingMode::Paper,
                notional,
                -500.0,
                0.80,
                0.85,
                5.0,
                model,
                audit,
                port,
            )?;
            run_engine(config, Some((csv, pace_ms))).await;
        }
    }

    Ok(())
}

/// Wire the engine and run it to stream exhaustion.
///
/// Every component is constructed here and injected explicitly; nothing in
/// the pipeline reaches for process-wide singletons.
async fn run_engine(config: EngineConfig, replay: Option<(PathBuf, u64)>) {
    info!(mode = %config.mode, "starting triangular arbitrage engine");

    // --- Model artifact (absence is non-fatal: fail-open defaults) ---
    let artifact = match &config.model_path {
        Some(path) => match ModelArtifact::load(path) {
            Ok(a) => Some(Arc::new(a)),
            Err(e) => {
                warn!(error = %e, "model artifact unusable, continuing fail-open");
                None
            }
        },
        None => None,
    };

    // --- Decision stack ---
    let engine = CompositeSignalEngine::new(
        config.composite.clone(),
        KalmanSpreadEstimator::new(1e-5, 1e-3, config.estimator_warmup),
        CointegrationMonitor::with_defaults(),
        ModelScorer::new(artifact.clone()),
        AnomalyScorer::new(artifact),
    );

    // --- Risk ---
    let daily = Arc::new(DailyLossLimiter::new(config.daily.clone()));
    let risk = RiskManager::new(config.risk.clone(), daily.clone());

    // --- Execution (paper) ---
    let breaker = Arc::new(ExecutionBreaker::new(
        BREAKER_FAILURE_THRESHOLD,
        Duration::from_secs(BREAKER_COOLDOWN_SECS),
    ));
    let broker = Arc::new(PaperBroker::new(config.router.slippage_bps));
    let router = Arc::new(PaperRouter::new(config.router.clone()));
    let state_machine =
        TradeStateMachine::new(router, HedgeHandler::new(broker.clone()), breaker.clone());

    // --- Monitoring / audit ---
    let drift = DriftMonitor::new(config.drift.clone());
    let drift_stats = drift.stats();
    let audit: Arc<dyn DecisionAuditRecorder> = match &config.audit_path {
        Some(path) => Arc::new(JsonAuditLogger::new(path.clone())),
        None => Arc::new(NullAuditRecorder),
    };

    let (pnl_tx, pnl_rx) = watch::channel(PositionPnLTracker::new().summary());
    let (retrain_tx, mut retrain_rx) = mpsc::channel::<triarb::monitoring::DriftReport>(8);

    // Retraining is an out-of-process collaborator; the engine only emits
    // the trigger.
    tokio::spawn(async move {
        while let Some(report) = retrain_rx.recv().await {
            warn!(
                precision = report.precision,
                pnl_error = report.pnl_error,
                "drift detected - emitting retraining trigger"
            );
        }
    });

    // --- HTTP surface + heartbeat ---
    let health_state = HealthState::new(daily, breaker, drift_stats, pnl_rx);
    tokio::spawn(run_health_server(config.health_port, health_state));
    tokio::spawn(async {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            metrics::HEARTBEAT.set(chrono::Utc::now().timestamp() as f64);
        }
    });

    // --- Pipeline worker ---
    let pairs = config.pairs.clone();
    let feature_builder = Box::new(TriangleFeatureBuilder::new(
        pairs.btc_pair.clone(),
        pairs.eth_pair.clone(),
        pairs.cross_pair.clone(),
    ));
    let mut worker = PipelineWorker::new(
        config.pipeline.clone(),
        feature_builder,
        engine,
        risk,
        state_machine,
        PositionPnLTracker::new(),
        drift,
        audit,
        Arc::new(PrometheusObserver),
        Some(retrain_tx),
        Some(pnl_tx),
    );

    // --- Event plumbing ---
    // The mark forwarder keeps the paper broker's fair values fresh so
    // simulated hedges fill against current prices.
    let (source_tx, mut source_rx) = mpsc::channel::<triarb::ingest::MarketEvent>(1024);
    let (pipeline_tx, pipeline_rx) = mpsc::channel(1024);
    tokio::spawn(async move {
        while let Some(event) = source_rx.recv().await {
            if let Some(price) = Decimal::from_f64(event.price) {
                broker.mark_price(&event.pair, price);
            }
            if pipeline_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let source: Box<dyn EventSource> = match replay {
        Some((csv, pace_ms)) => {
            info!(path = %csv.display(), "replay mode");
            Box::new(ReplayIngestor::new(
                csv,
                pairs.btc_pair.clone(),
                pairs.eth_pair.clone(),
                pairs.cross_pair.clone(),
                (pace_ms > 0).then(|| Duration::from_millis(pace_ms)),
            ))
        }
        None => {
            info!("reading normalized events from stdin");
            Box::new(StdinIngestor)
        }
    };
    tokio::spawn(source.run(source_tx));

    worker.run(pipeline_rx).await;
}
