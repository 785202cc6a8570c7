//! Risk management: daily loss circuit breaker and the pre-execution gate.

pub mod daily_limit;
pub mod manager;

pub use daily_limit::{DailyLimitConfig, DailyLossLimiter, RiskStatus};
pub use manager::{RiskConfig, RiskManager};
