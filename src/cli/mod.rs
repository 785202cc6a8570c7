//! CLI argument parsing.

pub mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use config::{ConfigError, EngineConfig};

#[derive(Parser)]
#[command(author, version, about = "Triangular-arbitrage decision and execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub verbose: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the trading engine against a live event stream
    Run {
        /// Route real orders instead of simulated fills (requires an
        /// external broker implementation)
        #[arg(long, default_value_t = false)]
        live: bool,

        /// Notional per arbitrage attempt, in base currency
        #[arg(long, default_value_t = 1000.0)]
        notional: f64,

        /// Daily loss limit (negative) that halts trading
        #[arg(long, default_value_t = -500.0)]
        max_daily_loss: f64,

        /// Composite floor applied in the pipeline before the risk gate
        #[arg(long, default_value_t = 0.80)]
        pipeline_floor: f64,

        /// Composite floor applied at the execution boundary
        #[arg(long, default_value_t = 0.85)]
        execution_floor: f64,

        /// Simulated slippage bound in basis points
        #[arg(long, default_value_t = 5.0)]
        slippage_bps: f64,

        /// Path to the model artifact (JSON); absent = fail-open defaults
        #[arg(long)]
        model: Option<PathBuf>,

        /// Path for the JSON-lines decision audit log
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Port for the health/metrics HTTP server
        #[arg(long, default_value_t = 9100)]
        port: u16,
    },
    /// Replay recorded feature rows through the full pipeline
    Replay {
        /// CSV file with header timestamp,btc_usd,eth_usd,eth_btc
        #[arg(long)]
        csv: PathBuf,

        /// Pacing delay between rows in milliseconds (0 = flat out)
        #[arg(long, default_value_t = 0)]
        pace_ms: u64,

        /// Notional per arbitrage attempt, in base currency
        #[arg(long, default_value_t = 1000.0)]
        notional: f64,

        /// Path to the model artifact (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Path for the JSON-lines decision audit log
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Port for the health/metrics HTTP server
        #[arg(long, default_value_t = 9100)]
        port: u16,
    },
}
