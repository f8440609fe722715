// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::piecewise::PiecewisePoissonLoss;
use peakseg_core::{ConsistencyCheck, LogMeanDomain, PeakSegError};

/// Margin below the lowest finite breakpoint (or below `max_log_mean` when
/// there is none) sampled when the domain is unbounded below.
const SAMPLE_TAIL: f64 = 8.0;

/// Settings for the consistency checks run after every algebra step.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelfCheckConfig {
    /// Random points per check, in addition to every piece midpoint of the
    /// result and of the operands.
    ///
    /// Points are uniform over the domain. When a zero count leaves the domain
    /// unbounded below, they are drawn from 8 units under the
    /// lowest finite breakpoint of any operand up to `max_log_mean`. Below that
    /// window each operand is a single exp-affine piece.
    pub samples: usize,
    pub rel_tol: f64,
    pub seed: u64,
}

impl Default for SelfCheckConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            rel_tol: 1e-9,
            seed: 0,
        }
    }
}

impl SelfCheckConfig {
    pub fn validate(&self) -> Result<(), PeakSegError> {
        if !self.rel_tol.is_finite() || self.rel_tol <= 0.0 {
            return Err(PeakSegError::invalid_input(format!(
                "self_check.rel_tol must be finite and > 0.0; got {}",
                self.rel_tol
            )));
        }
        Ok(())
    }

    fn tolerance(&self, reference: f64) -> f64 {
        self.rel_tol * reference.abs().max(1.0)
    }
}

#[derive(Clone, Debug)]
struct StableRng {
    state: u64,
}

impl StableRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9e3779b97f4a7c15),
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

fn sample_points(
    domain: LogMeanDomain,
    operands: &[&PiecewisePoissonLoss],
    cfg: &SelfCheckConfig,
) -> Vec<f64> {
    let lower = if domain.min_log_mean.is_finite() {
        domain.min_log_mean
    } else {
        let lowest_break = operands
            .iter()
            .flat_map(|loss| loss.pieces())
            .flat_map(|piece| [piece.lower, piece.upper])
            .filter(|u| u.is_finite())
            .fold(domain.max_log_mean, f64::min);
        domain.finite_lower(SAMPLE_TAIL).min(lowest_break - SAMPLE_TAIL)
    };
    let span = domain.max_log_mean - lower;
    let mut rng = StableRng::new(cfg.seed);

    let midpoints = operands
        .iter()
        .flat_map(|loss| loss.pieces())
        .map(|piece| piece.interior_point());
    let mut points: Vec<f64> = (0..cfg.samples)
        .map(|_| lower + rng.next_f64() * span)
        .collect();
    points.extend(midpoints);
    points
}

fn violation(check: ConsistencyCheck, detail: String) -> PeakSegError {
    tracing::error!(check = check.as_str(), %detail, "self-check failed");
    PeakSegError::consistency(check, detail)
}

/// Verifies `result` is the constant minimum of `input` over the whole domain.
///
/// Returns the number of points evaluated.
pub fn check_unconstrained_min(
    result: &PiecewisePoissonLoss,
    input: &PiecewisePoissonLoss,
    cfg: &SelfCheckConfig,
) -> Result<usize, PeakSegError> {
    let check = ConsistencyCheck::UnconstrainedMin;
    let domain = input.domain();
    if result.domain() != domain {
        return Err(violation(
            check,
            format!(
                "domain changed: {:?} -> {:?}",
                domain,
                result.domain()
            ),
        ));
    }

    let [piece] = result.pieces() else {
        return Err(violation(
            check,
            format!("expected exactly one piece, found {}", result.len()),
        ));
    };
    if piece.exp_coef != 0.0 || piece.lin_coef != 0.0 {
        return Err(violation(
            check,
            format!(
                "minimum must be constant; got exp_coef={} lin_coef={}",
                piece.exp_coef, piece.lin_coef
            ),
        ));
    }
    if piece.lower != domain.min_log_mean || piece.upper != domain.max_log_mean {
        return Err(violation(
            check,
            format!(
                "minimum covers [{}, {}] instead of the full domain",
                piece.lower, piece.upper
            ),
        ));
    }

    let expected = input.minimize()?.cost;
    if (piece.constant - expected).abs() > cfg.tolerance(expected) {
        return Err(violation(
            check,
            format!("constant {} differs from minimum {expected}", piece.constant),
        ));
    }

    let points = sample_points(domain, &[result, input], cfg);
    for &u in &points {
        let Some(value) = input.value_at(u) else {
            return Err(violation(check, format!("input undefined at log_mean={u}")));
        };
        if piece.constant > value + cfg.tolerance(value) {
            return Err(violation(
                check,
                format!(
                    "minimum {} exceeds input {value} at log_mean={u}",
                    piece.constant
                ),
            ));
        }
    }
    Ok(points.len())
}

/// Verifies `result` equals `min(new_segment, continue_segment)` pointwise and
/// carries the provenance of the strictly smaller side.
///
/// Returns the number of points evaluated.
pub fn check_min_envelope(
    result: &PiecewisePoissonLoss,
    new_segment: &PiecewisePoissonLoss,
    continue_segment: &PiecewisePoissonLoss,
    cfg: &SelfCheckConfig,
) -> Result<usize, PeakSegError> {
    let check = ConsistencyCheck::MinEnvelope;
    result.validate()?;
    let domain = continue_segment.domain();
    if result.domain() != domain || new_segment.domain() != domain {
        return Err(violation(check, "operand domains differ".to_string()));
    }

    let points = sample_points(
        domain,
        &[result, new_segment, continue_segment],
        cfg,
    );
    for &u in &points {
        let (Some(out), Some(a), Some(b)) = (
            result.piece_at(u),
            new_segment.piece_at(u),
            continue_segment.piece_at(u),
        ) else {
            return Err(violation(check, format!("operand undefined at log_mean={u}")));
        };

        let (out_value, a_value, b_value) = (out.value_at(u), a.value_at(u), b.value_at(u));
        let expected = a_value.min(b_value);
        let tol = cfg.tolerance(expected);
        if (out_value - expected).abs() > tol {
            return Err(violation(
                check,
                format!(
                    "envelope {out_value} != min({a_value}, {b_value}) at log_mean={u}"
                ),
            ));
        }

        let winner = if a_value < b_value - tol {
            Some(a)
        } else if b_value < a_value - tol {
            Some(b)
        } else {
            None
        };
        if let Some(winner) = winner
            && winner.provenance != out.provenance
        {
            return Err(violation(
                check,
                format!(
                    "provenance {:?} at log_mean={u} should be {:?}",
                    out.provenance, winner.provenance
                ),
            ));
        }
    }
    Ok(points.len())
}
