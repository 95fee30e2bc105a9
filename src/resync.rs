//! Timestamp-to-Frame-Index Resynchronization
//!
//! This module recovers the regular acquisition grid behind a noisy,
//! irregularly-delivered stream of sensor timestamps.
//!
//! ## The Problem
//! Frame timestamps recorded on the host carry jitter from:
//! - Driver/pipeline buffering and delivery delays
//! - OS scheduler preemption
//! - Occasional dropped frames and near-duplicate deliveries
//!
//! A naive consecutive-difference period estimate is swamped by this jitter,
//! and rounding jittered times to frame slots produces colliding or inverted
//! frame indices.
//!
//! ## The Solution
//! 1. Estimate the true period from every n-th sample: decimating by `n`
//!    amplifies the period signal n-fold relative to per-sample jitter, and
//!    a tolerance band around the nominal decimated period rejects intervals
//!    spanning an undetected gap.
//! 2. Take the median grid residual as the phase offset. The median is robust
//!    to the asymmetric residual distribution of delayed (never early) frame
//!    arrivals.
//! 3. Snap each sample to its nearest grid line for an integer frame id.
//! 4. Repair id collisions/inversions by pulling earlier samples down one
//!    slot below their successor, repeating up to a bounded iteration count.
//! 5. Report runs of missing ids as gaps with lost-frame counts.

use log::debug;
use thiserror::Error;

use crate::config::AnalysisConfig;

/// Failure conditions of the resynchronization core.
///
/// Each variant implies a different diagnosis: bad input size, a bad
/// nominal-rate seed, or a pathological jitter/duplicate pattern. Callers are
/// expected to match on them rather than treat analysis failure generically.
#[derive(Debug, Error)]
pub enum ResyncError {
    /// Coarse period estimation needs samples at indices `stride` and
    /// `2 * stride`.
    #[error("insufficient samples for stride {stride}: got {actual}, need at least {required}")]
    InsufficientData {
        stride: usize,
        required: usize,
        actual: usize,
    },

    /// Every decimated interval fell outside the tolerance band around the
    /// nominal decimated period, so no period average could be formed.
    #[error("no stable period found: 0 of {candidates} decimated intervals within the tolerance band")]
    UnstablePeriodEstimate { candidates: usize },

    /// The monotonicity-repair loop hit its iteration cap with violations
    /// remaining.
    #[error("frame-id repair did not converge after {iterations} iterations ({violations} violations remain)")]
    RepairNonConvergence {
        iterations: usize,
        violations: usize,
    },

    /// Timestamps must be finite reals.
    #[error("timestamp {index} is not finite ({value})")]
    NonFiniteSample { index: usize, value: f64 },

    /// The nominal rate seeds the decimated reference period and must be a
    /// positive finite number.
    #[error("nominal rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    /// A decimation stride of zero cannot select any samples.
    #[error("decimation stride must be at least 1")]
    InvalidStride,
}

/// A run of missing frame ids between two observed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Index (into the id sequence) of the sample before the gap.
    pub position: usize,
    /// Number of frames lost in the gap: `ids[position+1] - ids[position] - 1`.
    pub lost: u64,
}

/// Result of resynchronizing one timestamp series onto its acquisition grid.
///
/// All times are relative to `origin` (the minimum input timestamp); add
/// `origin` back to return to the caller's clock.
#[derive(Debug, Clone)]
pub struct FrameTimeline {
    /// Estimated true frame period (seconds).
    pub period: f64,
    /// Estimated phase offset (seconds), `|offset| < period`.
    pub offset: f64,
    /// Minimum input timestamp, subtracted before grid fitting.
    pub origin: f64,
    /// Strictly increasing frame id per input sample.
    pub ids: Vec<i64>,
    /// Corrected frame time per sample: `ids[i] * period`.
    pub times: Vec<f64>,
    /// Gaps detected after repair, in ascending position order.
    pub gaps: Vec<Gap>,
}

impl FrameTimeline {
    /// Total number of lost frames across all gaps.
    pub fn total_lost(&self) -> u64 {
        self.gaps.iter().map(|g| g.lost).sum()
    }
}

/// Fit a regular grid to `ts` and assign every sample an integer frame id.
///
/// `ts` is the raw timestamp series in arrival order (seconds, any clock
/// origin); `nominal_rate` is the advertised frame rate in frames/second,
/// used only to seed the decimated period filter. The series must contain
/// samples at indices `cfg.decimation` and `2 * cfg.decimation`.
pub fn analyze_timestamps(
    ts: &[f64],
    nominal_rate: f64,
    cfg: &AnalysisConfig,
) -> Result<FrameTimeline, ResyncError> {
    if !(nominal_rate.is_finite() && nominal_rate > 0.0) {
        return Err(ResyncError::InvalidRate(nominal_rate));
    }
    if cfg.decimation == 0 {
        return Err(ResyncError::InvalidStride);
    }
    if let Some(index) = ts.iter().position(|t| !t.is_finite()) {
        return Err(ResyncError::NonFiniteSample {
            index,
            value: ts[index],
        });
    }

    // Work with relative values; the absolute clock origin is irrelevant to
    // grid fitting.
    let origin = ts.iter().cloned().fold(f64::INFINITY, f64::min);
    let rel: Vec<f64> = ts.iter().map(|t| t - origin).collect();

    let period = estimate_period(&rel, nominal_rate, cfg)?;
    let offset = estimate_offset(&rel, period);
    debug!(
        "grid fit: period {:.3} ms, offset {:.3} ms",
        period * 1e3,
        offset * 1e3
    );

    let mut ids = assign_ids(&rel, period, offset);
    repair_monotonicity(&mut ids, cfg.max_repair_iterations)?;

    let gaps = find_gaps(&ids);
    if !gaps.is_empty() {
        debug!(
            "{} gaps, {} frames lost",
            gaps.len(),
            gaps.iter().map(|g| g.lost).sum::<u64>()
        );
    }

    let times = ids.iter().map(|&id| id as f64 * period).collect();

    Ok(FrameTimeline {
        period,
        offset,
        origin,
        ids,
        times,
        gaps,
    })
}

/// Coarse period estimation over every n-th sample.
///
/// Consecutive differences of the decimated series are kept only when they
/// fall inside the tolerance band around `n / nominal_rate`; the mean of the
/// survivors divided by `n` is the period estimate.
fn estimate_period(
    rel: &[f64],
    nominal_rate: f64,
    cfg: &AnalysisConfig,
) -> Result<f64, ResyncError> {
    let n = cfg.decimation;
    let required = 2 * n + 1;
    if rel.len() < required {
        return Err(ResyncError::InsufficientData {
            stride: n,
            required,
            actual: rel.len(),
        });
    }

    let decimated: Vec<f64> = rel.iter().skip(n).step_by(n).cloned().collect();
    let p_ref_n = n as f64 / nominal_rate;
    let lo = (1.0 - cfg.tolerance_band) * p_ref_n;
    let hi = (1.0 + cfg.tolerance_band) * p_ref_n;

    let mut sum = 0.0;
    let mut kept = 0usize;
    let candidates = decimated.len() - 1;
    for w in decimated.windows(2) {
        let dt = w[1] - w[0];
        if dt > lo && dt < hi {
            sum += dt;
            kept += 1;
        }
    }

    if kept == 0 {
        return Err(ResyncError::UnstablePeriodEstimate { candidates });
    }

    Ok(sum / kept as f64 / n as f64)
}

/// Phase offset as the median distance to the nearest grid line.
fn estimate_offset(rel: &[f64], period: f64) -> f64 {
    let mut residuals: Vec<f64> = rel
        .iter()
        .map(|t| t - (t / period).round() * period)
        .collect();
    median(&mut residuals)
}

/// Nearest-integer grid snap.
///
/// Half-integer ties round half-away-from-zero (`f64::round`); real jitter
/// never produces exact ties, so the choice only pins down the contract.
fn assign_ids(rel: &[f64], period: f64, offset: f64) -> Vec<i64> {
    rel.iter()
        .map(|t| ((t - offset) / period).round() as i64)
        .collect()
}

/// Enforce strictly increasing frame ids.
///
/// Each pass finds every position whose successor id does not exceed it and,
/// in descending index order, pulls the earlier sample one slot below its
/// successor. Descending order keeps a correction at a later position from
/// invalidating the index of an earlier one scheduled in the same pass, and
/// pulling earlier samples down (rather than pushing later ones up) preserves
/// the right edge of the sequence. Returns the total number of corrections.
fn repair_monotonicity(ids: &mut [i64], max_iterations: usize) -> Result<usize, ResyncError> {
    let mut corrections = 0usize;
    let mut iterations = 0usize;

    loop {
        let violations: Vec<usize> = (0..ids.len().saturating_sub(1))
            .filter(|&i| ids[i + 1] - ids[i] <= 0)
            .collect();

        if violations.is_empty() {
            return Ok(corrections);
        }
        if iterations >= max_iterations {
            return Err(ResyncError::RepairNonConvergence {
                iterations,
                violations: violations.len(),
            });
        }

        for &i in violations.iter().rev() {
            ids[i] = ids[i + 1] - 1;
            corrections += 1;
        }
        iterations += 1;
    }
}

/// Scan consecutive id differences for runs of missing frames.
fn find_gaps(ids: &[i64]) -> Vec<Gap> {
    ids.windows(2)
        .enumerate()
        .filter(|(_, w)| w[1] - w[0] > 1)
        .map(|(position, w)| Gap {
            position,
            lost: (w[1] - w[0] - 1) as u64,
        })
        .collect()
}

/// Median of a sample buffer (averages the middle pair on even length).
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

// ============================================================================
// TESTS
// ============================================================================
