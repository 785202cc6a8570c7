//! Rate-limited logging utilities.
//!
//! Provides `LogThrottle` to prevent log storms while still tracking suppressed messages.

use std::time::{Duration, Instant};

/// A lightweight rate limiter for logging to prevent log storms.
#[derive(Debug)]
pub struct LogThrottle {
    last_log_time: Option<Instant>,
    suppressed_count: u64,
    interval: Duration,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_log_time: None,
            suppressed_count: 0,
            interval,
        }
    }

    /// Checks if a log should be emitted.
    /// Returns true if the interval has passed since the last log.
    /// If false, increments the suppressed counter.
    pub fn should_log(&mut self) -> bool {
        let now = Instant::now();
        match self.last_log_time {
            Some(last) => {
                if now.duration_since(last) >= self.interval {
                    self.last_log_time = Some(now);
                    true
                } else {
                    self.suppressed_count += 1;
                    false
                }
            }
            None => {
                self.last_log_time = Some(now);
                true
            }
        }
    }

    /// Returns the number of suppressed logs since the last successful log, and resets the counter.
    pub fn get_and_reset_suppressed_count(&mut self) -> u64 {
        let count = self.suppressed_count;
        self.suppressed_count = 0;
        count
    }
}

/// Container for the throttlers used by the pipeline worker.
///
/// Hold decisions and veto reasons repeat on nearly every event under
/// continuous pressure, so each noisy log site gets its own throttle.
#[derive(Debug)]
pub struct PipelineLogThrottler {
    pub hold_decision: LogThrottle,
    pub malformed_input: LogThrottle,
    pub risk_block: LogThrottle,
}

impl PipelineLogThrottler {
    pub fn new(interval_secs: u64) -> Self {
        let interval = Duration::from_secs(interval_secs);
        Self {
            hold_decision: LogThrottle::new(interval),
            malformed_input: LogThrottle::new(interval),
            risk_block: LogThrottle::new(interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_log_passes() {
        let mut throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
        assert_eq!(throttle.get_and_reset_suppressed_count(), 1);
    }

    #[test]
    fn test_interval_elapses() {
        let mut throttle = LogThrottle::new(Duration::from_millis(1));
        assert!(throttle.should_log());
        std::thread::sleep(Duration::from_millis(5));
        assert!(throttle.should_log());
    }
}
