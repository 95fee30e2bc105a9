//! Linear clock-to-clock alignment.
//!
//! Independent clocks in the capture chain (device/pipeline clock, host
//! clock, radio clock) drift linearly against each other over recording-length
//! windows, so a least-squares line fit between paired readings is enough to
//! map times from one domain into another.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("clock columns differ in length ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },

    #[error("need at least 2 paired readings, got {0}")]
    TooFewPoints(usize),

    /// All x readings identical: the slope is unconstrained.
    #[error("degenerate fit: x column has zero variance")]
    Degenerate,
}

/// Least-squares line `y = slope * x + intercept` between two clock columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClockFit {
    pub slope: f64,
    pub intercept: f64,
}

impl ClockFit {
    /// Fit the line minimizing squared residuals over paired readings.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self, FitError> {
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(FitError::TooFewPoints(x.len()));
        }

        // Mean-centered accumulation keeps the sums small for large absolute
        // clock values (epoch seconds).
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (xi, yi) in x.iter().zip(y) {
            let dx = xi - mean_x;
            sxx += dx * dx;
            sxy += dx * (yi - mean_y);
        }

        if sxx == 0.0 {
            return Err(FitError::Degenerate);
        }

        let slope = sxy / sxx;
        Ok(ClockFit {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    /// Map a single time value into the target clock domain.
    pub fn apply(&self, t: f64) -> f64 {
        self.slope * t + self.intercept
    }

    /// Map a slice of time values into the target clock domain.
    pub fn apply_all(&self, ts: &[f64]) -> Vec<f64> {
        ts.iter().map(|&t| self.apply(t)).collect()
    }
}
