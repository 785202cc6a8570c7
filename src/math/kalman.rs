//! Kalman Filter for dynamic spread estimation.
//!
//! Implements a two-state Kalman Filter that tracks the linear relationship
//! `price_b ≈ alpha + beta * price_a` between two cointegrated assets, along
//! with an exponentially-weighted estimate of the residual variance. The
//! standardized residual (z-score) is the primary mean-reversion signal for
//! the triangular-arbitrage decision engine.
//!
//! # Mathematical Model
//!
//! **State equation** (random walk):
//! ```text
//! [alpha, beta][t] = [alpha, beta][t-1] + w,  where w ~ N(0, Q·I)
//! ```
//!
//! **Observation equation**:
//! ```text
//! b[t] = alpha[t] + beta[t] * a[t] + v,  where v ~ N(0, R)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use triarb::math::KalmanSpreadEstimator;
//!
//! let mut kalman = KalmanSpreadEstimator::with_defaults();
//! kalman.update(65_000.0, 3_400.0);
//! let z = kalman.zscore();
//! # let _ = z;
//! ```
//!
//! # References
//!
//! - Avellaneda, M. & Lee, J.H. (2010). "Statistical Arbitrage in the US Equities Market"
//! - Chan, E. (2013). "Algorithmic Trading: Winning Strategies and Their Rationale"

/// Variance floor preventing zero-division in the z-score denominator.
const RESIDUAL_VAR_FLOOR: f64 = 1e-9;

/// Two-state Kalman Filter estimating `alpha` and `beta` of a price pair.
///
/// # Performance
///
/// - O(1) per update (constant time, no historical data storage)
/// - Suitable for tick-by-tick updates from the event pipeline
#[derive(Debug, Clone)]
pub struct KalmanSpreadEstimator {
    /// Intercept estimate
    alpha: f64,
    /// Hedge ratio estimate
    beta: f64,
    /// State covariance matrix P (2x2, row-major)
    cov: [f64; 4],
    /// Process noise covariance (Q) - how fast alpha/beta may drift
    process_noise: f64,
    /// Observation noise covariance (R)
    obs_noise: f64,
    /// EWMA of squared residuals
    residual_var: f64,
    /// EWMA decay for the residual variance
    var_decay: f64,
    /// Last observed residual
    last_residual: f64,
    /// Number of updates received
    update_count: u64,
    /// Updates required before the z-score is considered meaningful
    warmup: u64,
}

impl KalmanSpreadEstimator {
    /// Create a new estimator.
    ///
    /// # Arguments
    ///
    /// * `process_noise` - Q parameter. Typical range: 1e-6 to 1e-4.
    /// * `obs_noise` - R parameter. Typical range: 1e-4 to 1e-2.
    /// * `warmup` - update count below which `zscore()` returns 0.
    pub fn new(process_noise: f64, obs_noise: f64, warmup: u64) -> Self {
        Self {
            alpha: 0.0,
            beta: 1.0,
            // High initial uncertainty for rapid early convergence
            cov: [1.0, 0.0, 0.0, 1.0],
            process_noise,
            obs_noise,
            residual_var: 0.0,
            var_decay: 0.97,
            last_residual: 0.0,
            update_count: 0,
            warmup,
        }
    }

    /// Defaults tuned for intraday crypto pairs (`Q = 1e-5`, `R = 1e-3`,
    /// 30-update warm-up).
    pub fn with_defaults() -> Self {
        Self::new(1e-5, 1e-3, 30)
    }

    /// Update the estimate with a new price observation pair.
    ///
    /// # Arguments
    ///
    /// * `a` - Independent leg price (e.g. BTC/USD)
    /// * `b` - Dependent leg price (e.g. ETH/USD)
    ///
    /// # Numerical Stability
    ///
    /// - NaN/Inf/non-positive inputs leave the state unchanged
    /// - Beta clamped to [-10, 10] to survive regime breaks
    /// - Covariance diagonal floored at 1e-12
    pub fn update(&mut self, a: f64, b: f64) {
        if !a.is_finite() || !b.is_finite() || a <= 0.0 || b <= 0.0 {
            return;
        }

        self.update_count += 1;

        // Predict: P = P + Q·I (state itself is a random walk)
        let p00 = self.cov[0] + self.process_noise;
        let p01 = self.cov[1];
        let p10 = self.cov[2];
        let p11 = self.cov[3] + self.process_noise;

        // Innovation with H = [1, a]
        let predicted = self.alpha + self.beta * a;
        let innovation = b - predicted;

        // S = H·P·H' + R
        let s = p00 + a * (p01 + p10) + a * a * p11 + self.obs_noise;
        if s.abs() < f64::EPSILON {
            return;
        }

        // K = P·H' / S
        let k0 = (p00 + a * p01) / s;
        let k1 = (p10 + a * p11) / s;

        self.alpha += k0 * innovation;
        self.beta = (self.beta + k1 * innovation).clamp(-10.0, 10.0);

        // P = (I - K·H)·P, diagonal floored to stay positive definite
        self.cov[0] = ((1.0 - k0) * p00 - k0 * a * p10).max(1e-12);
        self.cov[1] = (1.0 - k0) * p01 - k0 * a * p11;
        self.cov[2] = -k1 * p00 + (1.0 - k1 * a) * p10;
        self.cov[3] = (-k1 * p01 + (1.0 - k1 * a) * p11).max(1e-12);

        self.last_residual = innovation;
        self.residual_var = (self.var_decay * self.residual_var
            + (1.0 - self.var_decay) * innovation * innovation)
            .max(RESIDUAL_VAR_FLOOR);
    }

    /// Standardized residual of the most recent observation.
    ///
    /// Returns `0.0` until `warmup` updates have been observed, and is
    /// guaranteed finite: the residual std is floored so the division can
    /// never produce NaN or infinity.
    pub fn zscore(&self) -> f64 {
        if self.update_count < self.warmup {
            return 0.0;
        }
        self.last_residual / (self.residual_var.sqrt() + RESIDUAL_VAR_FLOOR)
    }

    /// Current `(alpha, beta)` estimates, carried on signals for audit.
    #[inline]
    pub fn params(&self) -> (f64, f64) {
        (self.alpha, self.beta)
    }

    /// Number of updates processed.
    #[inline]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// True once the warm-up count has been reached.
    pub fn is_warmed_up(&self) -> bool {
        self.update_count >= self.warmup
    }

    /// Reset to initial state. Only used on explicit restart; the estimator
    /// is otherwise mutated monotonically in event order.
    pub fn reset(&mut self) {
        self.alpha = 0.0;
        self.beta = 1.0;
        self.cov = [1.0, 0.0, 0.0, 1.0];
        self.residual_var = 0.0;
        self.last_residual = 0.0;
        self.update_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_linear(kalman: &mut KalmanSpreadEstimator, alpha: f64, beta: f64, n: usize) {
        for i in 0..n {
            let a = 100.0 + (i as f64 * 0.1);
            let noise = ((i * 17) % 11) as f64 / 100.0 - 0.05;
            let b = alpha + beta * a + noise;
            kalman.update(a, b);
        }
    }

    #[test]
    fn test_converges_to_true_beta() {
        let mut kalman = KalmanSpreadEstimator::new(1e-5, 1e-3, 30);
        feed_linear(&mut kalman, 2.0, 0.8, 2000);

        let (_, beta) = kalman.params();
        assert!(
            (beta - 0.8).abs() < 0.1,
            "Kalman should converge to true beta. Expected ~0.8, got {}",
            beta
        );
    }

    #[test]
    fn test_zscore_zero_before_warmup() {
        let mut kalman = KalmanSpreadEstimator::new(1e-5, 1e-3, 30);
        for _ in 0..29 {
            kalman.update(100.0, 80.0);
        }
        assert_eq!(kalman.zscore(), 0.0);
        assert!(!kalman.is_warmed_up());

        kalman.update(100.0, 80.0);
        assert!(kalman.is_warmed_up());
    }

    #[test]
    fn test_zscore_always_finite() {
        let mut kalman = KalmanSpreadEstimator::new(1e-5, 1e-3, 1);
        // Constant inputs drive residual variance toward the floor
        for _ in 0..500 {
            kalman.update(100.0, 100.0);
        }
        assert!(kalman.zscore().is_finite());
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let mut kalman = KalmanSpreadEstimator::with_defaults();
        let (alpha0, beta0) = kalman.params();

        kalman.update(f64::NAN, 100.0);
        kalman.update(100.0, f64::INFINITY);
        kalman.update(0.0, 100.0);
        kalman.update(-5.0, 100.0);

        assert_eq!(kalman.params(), (alpha0, beta0));
        assert_eq!(kalman.update_count(), 0);
    }

    #[test]
    fn test_tracks_regime_shift() {
        let mut kalman = KalmanSpreadEstimator::new(1e-4, 1e-3, 10);
        feed_linear(&mut kalman, 0.0, 1.0, 800);
        feed_linear(&mut kalman, 0.0, 1.5, 800);

        let (_, beta) = kalman.params();
        assert!(
            (beta - 1.5).abs() < 0.15,
            "Should adapt to beta=1.5, got {}",
            beta
        );
    }

    #[test]
    fn test_large_deviation_yields_large_zscore() {
        let mut kalman = KalmanSpreadEstimator::new(1e-6, 1e-3, 10);
        feed_linear(&mut kalman, 0.0, 1.0, 500);

        // A 10% dislocation after a stable regime
        kalman.update(200.0, 220.0);
        assert!(
            kalman.zscore() > 2.0,
            "Dislocation should produce a large z-score, got {}",
            kalman.zscore()
        );
    }

    #[test]
    fn test_reset() {
        let mut kalman = KalmanSpreadEstimator::with_defaults();
        feed_linear(&mut kalman, 1.0, 0.9, 100);

        kalman.reset();
        assert_eq!(kalman.params(), (0.0, 1.0));
        assert_eq!(kalman.update_count(), 0);
        assert_eq!(kalman.zscore(), 0.0);
    }
}
