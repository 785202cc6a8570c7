//! Decision audit recording and log rate limiting.

pub mod audit;
pub mod throttle;

pub use audit::{AuditRecord, DecisionAuditRecorder, JsonAuditLogger, NullAuditRecorder};
pub use throttle::{LogThrottle, PipelineLogThrottler};
