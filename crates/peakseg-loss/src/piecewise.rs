// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::piece::{Piece, Provenance};
use peakseg_core::{ConsistencyCheck, LogMeanDomain, PeakSegError};

/// Relative gap below which the two sides of a min-envelope count as tied.
/// Ties go to the continue-segment side.
const TIE_REL_TOL: f64 = 1e-12;

/// Global minimum of a piecewise loss and the provenance stored there.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinimumSummary {
    pub cost: f64,
    pub log_mean: f64,
    pub provenance: Option<Provenance>,
}

/// Optimal cost-to-go as a function of the final segment's log-mean.
///
/// Pieces are sorted by `lower`, tile the domain exactly, and no two
/// neighbours share both coefficients and provenance.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewisePoissonLoss {
    domain: LogMeanDomain,
    pieces: Vec<Piece>,
}

fn structure_err(detail: impl Into<String>) -> PeakSegError {
    PeakSegError::consistency(ConsistencyCheck::Structure, detail)
}

/// Appends `piece`, merging it into the last piece when they join and share
/// coefficients and provenance.
fn push_merged(out: &mut Vec<Piece>, piece: Piece) {
    if let Some(last) = out.last_mut()
        && last.upper == piece.lower
        && last.same_shape(&piece)
    {
        last.upper = piece.upper;
        return;
    }
    out.push(piece);
}

/// Min-envelope of two pieces over their shared sub-interval `[lower, upper]`.
fn envelope_overlap(
    new_segment: &Piece,
    continue_segment: &Piece,
    lower: f64,
    upper: f64,
    out: &mut Vec<Piece>,
) {
    let diff = new_segment.difference(continue_segment);
    if diff.is_zero() {
        push_merged(out, continue_segment.restricted(lower, upper));
        return;
    }

    // A tangent contact has no sign change, so the stationary point is a split
    // too. Every sub-interval then sits inside one monotone branch.
    let roots = diff.roots_in(lower, upper);
    let mut cuts: Vec<f64> = roots.as_slice().to_vec();
    if let Some(s) = diff.stationary_point().filter(|&s| lower < s && s < upper) {
        let at = cuts.partition_point(|&c| c < s);
        cuts.insert(at, s);
    }
    cuts.push(upper);

    let mut left = lower;
    for &right in &cuts {
        if right <= left {
            continue;
        }
        let at = crate::piece::interior_point(left, right);
        let gap = diff.value_at(at);
        let scale = continue_segment.value_at(at).abs().max(1.0);
        let winner = if gap < -TIE_REL_TOL * scale {
            new_segment
        } else {
            continue_segment
        };
        push_merged(out, winner.restricted(left, right));
        left = right;
    }
}

impl PiecewisePoissonLoss {
    /// Cost at the first position: `e^u - count * u`, no predecessor.
    pub fn initial(domain: LogMeanDomain, count: f64) -> Self {
        Self {
            domain,
            pieces: vec![Piece::new(
                1.0,
                -count,
                0.0,
                domain.min_log_mean,
                domain.max_log_mean,
                None,
            )],
        }
    }

    /// Builds a function from explicit pieces, validating the structure.
    pub fn from_pieces(domain: LogMeanDomain, pieces: Vec<Piece>) -> Result<Self, PeakSegError> {
        let loss = Self { domain, pieces };
        loss.validate()?;
        Ok(loss)
    }

    pub fn domain(&self) -> LogMeanDomain {
        self.domain
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// First piece whose closed interval contains `u`.
    pub fn piece_at(&self, u: f64) -> Option<&Piece> {
        if !self.domain.contains(u) {
            return None;
        }
        let idx = self.pieces.partition_point(|piece| piece.upper < u);
        self.pieces.get(idx).filter(|piece| piece.contains(u))
    }

    pub fn value_at(&self, u: f64) -> Option<f64> {
        self.piece_at(u).map(|piece| piece.value_at(u))
    }

    /// Adds `exp_coef * e^u + lin_coef * u + constant` to every piece.
    pub fn add(&mut self, exp_coef: f64, lin_coef: f64, constant: f64) {
        for piece in &mut self.pieces {
            piece.add(exp_coef, lin_coef, constant);
        }
    }

    /// Scales every coefficient of every piece.
    pub fn multiply(&mut self, factor: f64) {
        for piece in &mut self.pieces {
            piece.multiply(factor);
        }
    }

    /// Global minimum; the leftmost piece wins ties.
    pub fn minimize(&self) -> Result<MinimumSummary, PeakSegError> {
        let mut best: Option<MinimumSummary> = None;
        for piece in &self.pieces {
            let (cost, log_mean) = piece.min_value();
            if best.is_none_or(|current| cost < current.cost) {
                best = Some(MinimumSummary {
                    cost,
                    log_mean,
                    provenance: piece.provenance,
                });
            }
        }

        let best = best.ok_or_else(|| structure_err("cannot minimize an empty piece list"))?;
        if !best.cost.is_finite() {
            return Err(PeakSegError::numerical_issue(format!(
                "non-finite minimum cost {} at log_mean={}",
                best.cost, best.log_mean
            )));
        }
        Ok(best)
    }

    /// Constant function equal to this function's global minimum, tagged with
    /// the provenance of a new segment starting after `prev_end`.
    ///
    /// When a new segment starts, only the best achievable cost of the previous
    /// segments survives, not the shape of their cost in the new mean.
    pub fn unconstrained_min(&self, prev_end: usize) -> Result<Self, PeakSegError> {
        let best = self.minimize()?;
        Ok(Self {
            domain: self.domain,
            pieces: vec![Piece::new(
                0.0,
                0.0,
                best.cost,
                self.domain.min_log_mean,
                self.domain.max_log_mean,
                Some(Provenance {
                    prev_end,
                    prev_log_mean: best.log_mean,
                }),
            )],
        })
    }

    /// Pointwise minimum of the new-segment and continue-segment functions,
    /// keeping the provenance of whichever side wins on each sub-interval.
    ///
    /// Linear in the combined piece count.
    pub fn min_envelope(new_segment: &Self, continue_segment: &Self) -> Result<Self, PeakSegError> {
        if new_segment.domain != continue_segment.domain {
            return Err(structure_err(format!(
                "min_envelope domains differ: {:?} vs {:?}",
                new_segment.domain, continue_segment.domain
            )));
        }
        if new_segment.is_empty() || continue_segment.is_empty() {
            return Err(structure_err("min_envelope requires non-empty inputs"));
        }

        let a = &new_segment.pieces;
        let b = &continue_segment.pieces;
        let mut out = Vec::with_capacity(a.len() + b.len() + 2);
        let (mut i, mut j) = (0usize, 0usize);
        let mut lower = new_segment.domain.min_log_mean;

        while i < a.len() && j < b.len() {
            let upper = a[i].upper.min(b[j].upper);
            if upper > lower {
                envelope_overlap(&a[i], &b[j], lower, upper, &mut out);
            }
            if a[i].upper <= upper {
                i += 1;
            }
            if b[j].upper <= upper {
                j += 1;
            }
            lower = upper;
        }

        Ok(Self {
            domain: new_segment.domain,
            pieces: out,
        })
    }

    /// Provenance of the first piece containing `log_mean`.
    pub fn provenance_at(&self, log_mean: f64) -> Result<Option<Provenance>, PeakSegError> {
        self.pieces
            .iter()
            .find(|piece| piece.contains(log_mean))
            .map(|piece| piece.provenance)
            .ok_or_else(|| {
                PeakSegError::consistency(
                    ConsistencyCheck::Backtrace,
                    format!(
                        "no piece contains log_mean={log_mean} in [{}, {}]",
                        self.domain.min_log_mean, self.domain.max_log_mean
                    ),
                )
            })
    }

    /// Checks ordering, exact tiling of the domain, finite coefficients and
    /// that no mergeable neighbours remain.
    pub fn validate(&self) -> Result<(), PeakSegError> {
        let (Some(first), Some(last)) = (self.pieces.first(), self.pieces.last()) else {
            return Err(structure_err("piece list is empty"));
        };
        if first.lower != self.domain.min_log_mean || last.upper != self.domain.max_log_mean {
            return Err(structure_err(format!(
                "pieces cover [{}, {}] but domain is [{}, {}]",
                first.lower, last.upper, self.domain.min_log_mean, self.domain.max_log_mean
            )));
        }

        for (idx, piece) in self.pieces.iter().enumerate() {
            if !(piece.lower < piece.upper) {
                return Err(structure_err(format!(
                    "piece {idx} has empty interval [{}, {}]",
                    piece.lower, piece.upper
                )));
            }
            if !piece.coefficients().is_finite() {
                return Err(structure_err(format!(
                    "piece {idx} has non-finite coefficients {:?}",
                    piece.coefficients()
                )));
            }
        }

        for (idx, pair) in self.pieces.windows(2).enumerate() {
            if pair[0].upper != pair[1].lower {
                return Err(structure_err(format!(
                    "pieces {idx} and {} do not meet: upper={} lower={}",
                    idx + 1,
                    pair[0].upper,
                    pair[1].lower
                )));
            }
            if pair[0].same_shape(&pair[1]) {
                return Err(structure_err(format!(
                    "pieces {idx} and {} are identical and should have been merged",
                    idx + 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MinimumSummary, PiecewisePoissonLoss};
    use crate::piece::{Piece, Provenance};
    use peakseg_core::{ConsistencyCheck, LogMeanDomain, PeakSegError};

    fn domain(lo: f64, hi: f64) -> LogMeanDomain {
        LogMeanDomain::new(lo, hi).expect("test domain should be valid")
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual}, |diff|={diff}, tol={tol}"
        );
    }

    fn provenance(prev_end: usize, prev_log_mean: f64) -> Option<Provenance> {
        Some(Provenance {
            prev_end,
            prev_log_mean,
        })
    }

    #[test]
    fn initial_function_is_single_poisson_piece() {
        let d = domain(10.0_f64.ln(), 50.0_f64.ln());
        let loss = PiecewisePoissonLoss::initial(d, 10.0);
        assert_eq!(loss.len(), 1);
        let best = loss.minimize().expect("minimize should succeed");
        assert_close(best.log_mean, 10.0_f64.ln(), 1e-12);
        assert_close(best.cost, 10.0 - 10.0 * 10.0_f64.ln(), 1e-12);
        assert_eq!(best.provenance, None);
    }

    #[test]
    fn unconstrained_min_is_constant_with_argmin_provenance() {
        let d = domain(0.0, 3.0);
        let loss = PiecewisePoissonLoss::initial(d, 4.0);
        let min = loss.unconstrained_min(0).expect("min should succeed");
        assert_eq!(min.len(), 1);
        let piece = min.pieces()[0];
        assert_eq!((piece.exp_coef, piece.lin_coef), (0.0, 0.0));
        assert_close(piece.constant, 4.0 - 4.0 * 4.0_f64.ln(), 1e-12);
        let prov = piece.provenance.expect("provenance should be set");
        assert_eq!(prov.prev_end, 0);
        assert_close(prov.prev_log_mean, 4.0_f64.ln(), 1e-12);
    }

    #[test]
    fn add_and_multiply_keep_intervals() {
        let d = domain(0.0, 2.0);
        let mut loss = PiecewisePoissonLoss::initial(d, 3.0);
        loss.multiply(2.0);
        loss.add(1.0, -4.0, 0.5);
        let piece = loss.pieces()[0];
        assert_eq!((piece.exp_coef, piece.lin_coef, piece.constant), (3.0, -10.0, 0.5));
        assert_eq!((piece.lower, piece.upper), (0.0, 2.0));
        assert_close(
            loss.value_at(1.0).expect("inside domain"),
            3.0 * 1.0_f64.exp() - 10.0 + 0.5,
            1e-12,
        );
        assert!(loss.value_at(2.5).is_none());
    }

    #[test]
    fn min_envelope_splits_at_both_crossings() {
        let d = domain(0.0, 4.0);
        // B = e^u - 10u has minimum 10 - 10 ln 10 ~= -13.03 at ln 10 ~= 2.30.
        let continue_segment = PiecewisePoissonLoss::initial(d, 10.0);
        let new_segment = PiecewisePoissonLoss::from_pieces(
            d,
            vec![Piece::new(0.0, 0.0, -10.0, 0.0, 4.0, provenance(0, 1.0))],
        )
        .expect("constant piece should be valid");

        let env = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
            .expect("envelope should succeed");
        env.validate().expect("envelope should be well formed");
        assert_eq!(env.len(), 3);

        let pieces = env.pieces();
        assert_eq!(pieces[0].provenance, provenance(0, 1.0));
        assert_eq!(pieces[1].provenance, None);
        assert_eq!(pieces[2].provenance, provenance(0, 1.0));
        for &u in &[0.5_f64, 2.3, 3.9] {
            let expected = (-10.0_f64).min(u.exp() - 10.0 * u);
            assert_close(env.value_at(u).expect("inside"), expected, 1e-12);
        }
        // Breakpoints are the crossings e^u - 10u = -10.
        for piece in &pieces[..2] {
            assert_close(piece.upper.exp() - 10.0 * piece.upper, -10.0, 1e-9);
        }
    }

    #[test]
    fn min_envelope_takes_constant_that_touches_at_argmin() {
        // B = e^u - 4u is minimized at ln 4, the exact middle of [0, ln 16].
        let d = domain(0.0, 16.0_f64.ln());
        let continue_segment = PiecewisePoissonLoss::initial(d, 4.0);
        let new_segment = continue_segment
            .unconstrained_min(0)
            .expect("min should succeed");

        let env = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
            .expect("envelope should succeed");
        env.validate().expect("envelope should be well formed");
        assert_eq!(env.len(), 1, "constant is below B everywhere except ln 4");
        let prov = env.pieces()[0].provenance.expect("new segment should win");
        assert_eq!(prov.prev_end, 0);
        assert_close(prov.prev_log_mean, 4.0_f64.ln(), 1e-12);
        for &u in &[0.1_f64, 1.0, 1.8, 2.7] {
            assert_close(
                env.value_at(u).expect("inside"),
                4.0 - 4.0 * 4.0_f64.ln(),
                1e-12,
            );
        }

        let cfg = crate::check::SelfCheckConfig::default();
        crate::check::check_min_envelope(&env, &new_segment, &continue_segment, &cfg)
            .expect("tangent envelope should pass the self-check");
    }

    #[test]
    fn min_envelope_prefers_continue_segment_on_ties() {
        let d = domain(0.0, 1.0);
        let continue_segment = PiecewisePoissonLoss::from_pieces(
            d,
            vec![Piece::new(0.0, 0.0, 2.0, 0.0, 1.0, provenance(3, 0.5))],
        )
        .expect("valid");
        let new_segment = PiecewisePoissonLoss::from_pieces(
            d,
            vec![Piece::new(0.0, 0.0, 2.0, 0.0, 1.0, provenance(4, 0.7))],
        )
        .expect("valid");
        let env = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
            .expect("envelope should succeed");
        assert_eq!(env.len(), 1);
        assert_eq!(env.pieces()[0].provenance, provenance(3, 0.5));
    }

    #[test]
    fn min_envelope_merges_pieces_split_only_by_input_breakpoints() {
        let d = domain(0.0, 2.0);
        let continue_segment = PiecewisePoissonLoss::from_pieces(
            d,
            vec![
                Piece::new(0.0, 1.0, 0.0, 0.0, 1.0, None),
                Piece::new(0.0, 1.0, 0.0, 1.0, 2.0, provenance(1, 0.0)),
            ],
        )
        .expect("valid");
        let new_segment = PiecewisePoissonLoss::from_pieces(
            d,
            vec![Piece::new(0.0, 0.0, -1.0, 0.0, 2.0, provenance(2, 0.0))],
        )
        .expect("valid");
        let env = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
            .expect("envelope should succeed");
        assert_eq!(env.len(), 1, "new segment wins everywhere and must merge");
        assert_eq!(env.pieces()[0].provenance, provenance(2, 0.0));
    }

    #[test]
    fn min_envelope_handles_unbounded_lower_domain() {
        let d = domain(f64::NEG_INFINITY, 2.0_f64.ln());
        let continue_segment = PiecewisePoissonLoss::initial(d, 2.0);
        let new_segment = continue_segment
            .unconstrained_min(0)
            .map(|mut min| {
                min.add(0.0, 0.0, 0.5);
                min
            })
            .expect("min should succeed");
        let env = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
            .expect("envelope should succeed");
        env.validate().expect("envelope should be well formed");
        assert_eq!(env.pieces()[0].lower, f64::NEG_INFINITY);
        // The continue side tends to +inf at -inf, so the constant wins there.
        assert_eq!(env.pieces()[0].provenance.map(|p| p.prev_end), Some(0));
        assert_eq!(env.pieces().last().and_then(|p| p.provenance), None);
    }

    #[test]
    fn min_envelope_rejects_mismatched_domains() {
        let a = PiecewisePoissonLoss::initial(domain(0.0, 1.0), 1.0);
        let b = PiecewisePoissonLoss::initial(domain(0.0, 2.0), 1.0);
        let err = PiecewisePoissonLoss::min_envelope(&a, &b).expect_err("must fail");
        assert!(matches!(
            err,
            PeakSegError::ConsistencyViolation {
                check: ConsistencyCheck::Structure,
                ..
            }
        ));
    }

    #[test]
    fn provenance_at_returns_first_containing_piece() {
        let d = domain(0.0, 2.0);
        let loss = PiecewisePoissonLoss::from_pieces(
            d,
            vec![
                Piece::new(1.0, -1.0, 0.0, 0.0, 1.0, None),
                Piece::new(0.0, 0.0, 0.0, 1.0, 2.0, provenance(5, 0.3)),
            ],
        )
        .expect("valid");
        assert_eq!(loss.provenance_at(0.5).expect("inside"), None);
        assert_eq!(loss.provenance_at(1.0).expect("boundary"), None);
        assert_eq!(loss.provenance_at(1.5).expect("inside"), provenance(5, 0.3));
        let err = loss.provenance_at(3.0).expect_err("outside domain");
        assert!(err.is_consistency_violation());
    }

    #[test]
    fn validate_rejects_gaps_unmerged_neighbours_and_bad_coverage() {
        let d = domain(0.0, 2.0);
        let gap = PiecewisePoissonLoss::from_pieces(
            d,
            vec![
                Piece::new(1.0, 0.0, 0.0, 0.0, 0.9, None),
                Piece::new(1.0, 1.0, 0.0, 1.0, 2.0, None),
            ],
        );
        assert!(gap.is_err());

        let unmerged = PiecewisePoissonLoss::from_pieces(
            d,
            vec![
                Piece::new(1.0, 0.0, 0.0, 0.0, 1.0, None),
                Piece::new(1.0, 0.0, 0.0, 1.0, 2.0, None),
            ],
        );
        assert!(unmerged.is_err());

        let short = PiecewisePoissonLoss::from_pieces(
            d,
            vec![Piece::new(1.0, 0.0, 0.0, 0.0, 1.5, None)],
        );
        assert!(short.is_err());

        assert!(PiecewisePoissonLoss::from_pieces(d, vec![]).is_err());
    }

    #[test]
    fn minimize_picks_leftmost_on_ties() {
        let d = domain(0.0, 2.0);
        let loss = PiecewisePoissonLoss::from_pieces(
            d,
            vec![
                Piece::new(0.0, 0.0, 1.0, 0.0, 1.0, provenance(1, 0.1)),
                Piece::new(0.0, 0.0, 1.0, 1.0, 2.0, provenance(2, 0.2)),
            ],
        )
        .expect("valid");
        let best = loss.minimize().expect("minimize should succeed");
        assert_eq!(
            best,
            MinimumSummary {
                cost: 1.0,
                log_mean: 0.0,
                provenance: provenance(1, 0.1),
            }
        );
    }
}
