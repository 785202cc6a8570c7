//! Mathematical primitives for the decision engine.
//!
//! Currently hosts the recursive Kalman spread estimator used for
//! dynamic alpha/beta tracking and z-score computation.

pub mod kalman;

pub use kalman::KalmanSpreadEstimator;
