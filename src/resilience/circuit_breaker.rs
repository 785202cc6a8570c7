//! Execution circuit breaker.
//!
//! Blocks the start of new arbitrage cycles after a run of consecutive
//! execution failures, giving the venue (or the simulated broker) time to
//! recover instead of burning capital on a degraded connection.
//!
//! States: **Closed** (normal) → **Open** after `failure_threshold`
//! consecutive failures → **HalfOpen** once `cooldown` elapses, letting a
//! single probe cycle through. A success from any state closes the breaker.
//!
//! Only pre-leg1 decisions consult the breaker: a cycle that has already
//! taken exposure always runs to completion or compensation regardless of
//! breaker state.
//!
//! The hot path (`is_open`) is lock-free: a single atomic load plus, at most,
//! one CAS when transitioning Open → HalfOpen.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;
const HALF_OPEN: u32 = 2;

/// Public view of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Consecutive-failure breaker for the execution boundary.
pub struct ExecutionBreaker {
    state: AtomicU32,
    consecutive_failures: AtomicU32,
    /// Last failure time, nanoseconds since `epoch`.
    last_failure_nanos: AtomicU64,
    epoch: Instant,
    failure_threshold: u32,
    cooldown_nanos: u64,
}

impl ExecutionBreaker {
    /// `failure_threshold` consecutive cycle failures trip the breaker;
    /// after `cooldown` a single probe cycle is allowed through.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: AtomicU32::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            last_failure_nanos: AtomicU64::new(0),
            epoch: Instant::now(),
            failure_threshold,
            cooldown_nanos: cooldown.as_nanos() as u64,
        }
    }

    #[inline]
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            OPEN => BreakerState::Open,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// A completed cycle: close the breaker and clear the failure run.
    pub fn record_success(&self) {
        self.state.store(CLOSED, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// A failed or compensated cycle. Trips the breaker once the run of
    /// failures reaches the threshold.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_failure_nanos.store(self.now_nanos(), Ordering::Release);

        if failures >= self.failure_threshold {
            let previous = self.state.swap(OPEN, Ordering::AcqRel);
            if previous != OPEN {
                warn!(failures, "execution breaker tripped open");
            }
        }
    }

    /// Whether new cycles are currently blocked.
    ///
    /// Transitions Open → HalfOpen automatically once the cooldown elapses;
    /// the winning thread's probe cycle is allowed through.
    #[inline]
    pub fn is_open(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            CLOSED | HALF_OPEN => false,
            _ => {
                let since_failure = self
                    .now_nanos()
                    .saturating_sub(self.last_failure_nanos.load(Ordering::Acquire));
                if since_failure > self.cooldown_nanos {
                    if self
                        .state
                        .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.consecutive_failures.store(0, Ordering::Release);
                    }
                    false
                } else {
                    true
                }
            }
        }
    }
}
