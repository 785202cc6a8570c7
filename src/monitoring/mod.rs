//! Runtime model-quality monitoring.

pub mod drift;

pub use drift::{DriftConfig, DriftMonitor, DriftReport, DriftStats};
