// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::ops::Sub;

const NEWTON_MAX_STEPS: usize = 100;
const ROOT_REL_TOL: f64 = 1e-12;
const BRACKET_MAX_DOUBLINGS: usize = 1100;

/// `exp_coef * e^u + lin_coef * u + constant`, the Poisson loss shape in
/// log-mean space.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExpAffine {
    pub exp_coef: f64,
    pub lin_coef: f64,
    pub constant: f64,
}

impl Sub for ExpAffine {
    type Output = ExpAffine;

    fn sub(self, rhs: Self) -> Self::Output {
        ExpAffine::new(
            self.exp_coef - rhs.exp_coef,
            self.lin_coef - rhs.lin_coef,
            self.constant - rhs.constant,
        )
    }
}

/// Up to two sorted roots of an [`ExpAffine`] inside an open interval.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Roots {
    values: [f64; 2],
    len: usize,
}

impl Roots {
    fn push(&mut self, root: f64) {
        debug_assert!(self.len < 2, "exp-affine functions have at most two roots");
        if self.len < 2 {
            self.values[self.len] = root;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ExpAffine {
    pub const fn new(exp_coef: f64, lin_coef: f64, constant: f64) -> Self {
        Self {
            exp_coef,
            lin_coef,
            constant,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.exp_coef.is_finite() && self.lin_coef.is_finite() && self.constant.is_finite()
    }

    pub fn is_zero(&self) -> bool {
        self.exp_coef == 0.0 && self.lin_coef == 0.0 && self.constant == 0.0
    }

    /// Value at `u`, taking the limit when `u = -inf`.
    pub fn value_at(&self, u: f64) -> f64 {
        if u == f64::NEG_INFINITY {
            return if self.lin_coef > 0.0 {
                f64::NEG_INFINITY
            } else if self.lin_coef < 0.0 {
                f64::INFINITY
            } else {
                self.constant
            };
        }
        self.exp_coef * u.exp() + self.lin_coef * u + self.constant
    }

    pub fn derivative_at(&self, u: f64) -> f64 {
        if u == f64::NEG_INFINITY {
            return self.lin_coef;
        }
        self.exp_coef * u.exp() + self.lin_coef
    }

    /// Point where the derivative vanishes, when the coefficients allow one.
    pub fn stationary_point(&self) -> Option<f64> {
        let ratio = -self.lin_coef / self.exp_coef;
        if self.exp_coef != 0.0 && ratio > 0.0 && ratio.is_finite() {
            Some(ratio.ln())
        } else {
            None
        }
    }

    /// Minimizer over the closed interval `[lower, upper]`; ties go to `lower`.
    pub fn argmin_on(&self, lower: f64, upper: f64) -> f64 {
        if self.exp_coef > 0.0
            && let Some(stationary) = self.stationary_point()
        {
            return stationary.clamp(lower, upper);
        }
        if self.value_at(upper) < self.value_at(lower) {
            upper
        } else {
            lower
        }
    }

    /// Roots strictly inside `(lower, upper)`, ascending.
    ///
    /// `upper` must be finite; `lower` may be `-inf`. Roots touching zero
    /// without a sign change (tangencies) are not reported.
    pub fn roots_in(&self, lower: f64, upper: f64) -> Roots {
        let mut roots = Roots::default();
        if !(lower < upper) || !upper.is_finite() {
            return roots;
        }

        if self.exp_coef == 0.0 {
            if self.lin_coef != 0.0 {
                let root = -self.constant / self.lin_coef;
                if lower < root && root < upper {
                    roots.push(root);
                }
            }
            return roots;
        }

        if self.lin_coef == 0.0 {
            let ratio = -self.constant / self.exp_coef;
            if ratio > 0.0 {
                let root = ratio.ln();
                if lower < root && root < upper {
                    roots.push(root);
                }
            }
            return roots;
        }

        match self.stationary_point() {
            Some(stationary) if lower < stationary && stationary < upper => {
                if let Some(root) = self.monotone_root(lower, stationary) {
                    roots.push(root);
                }
                if let Some(root) = self.monotone_root(stationary, upper) {
                    roots.push(root);
                }
            }
            _ => {
                if let Some(root) = self.monotone_root(lower, upper) {
                    roots.push(root);
                }
            }
        }
        roots
    }

    /// Finite left end with the same sign as the `-inf` limit, found by
    /// stepping left from `upper` with doubling steps.
    fn finite_bracket_below(&self, upper: f64, limit_positive: bool) -> Option<f64> {
        let mut step = 1.0_f64;
        for _ in 0..BRACKET_MAX_DOUBLINGS {
            let candidate = upper - step;
            if !candidate.is_finite() {
                return None;
            }
            let value = self.value_at(candidate);
            if (value > 0.0) == limit_positive && value != 0.0 {
                return Some(candidate);
            }
            step *= 2.0;
        }
        None
    }

    /// Single sign-changing root of a function monotone on `(lower, upper)`.
    fn monotone_root(&self, lower: f64, upper: f64) -> Option<f64> {
        let f_upper = self.value_at(upper);
        let f_lower_limit = self.value_at(lower);
        if f_upper == 0.0 || f_lower_limit == 0.0 || f_upper.is_nan() || f_lower_limit.is_nan() {
            return None;
        }
        if (f_upper > 0.0) == (f_lower_limit > 0.0) {
            return None;
        }

        let lower = if lower.is_finite() {
            lower
        } else {
            self.finite_bracket_below(upper, f_lower_limit > 0.0)?
        };
        let f_lower = self.value_at(lower);

        let (mut neg, mut pos) = if f_lower < 0.0 {
            (lower, upper)
        } else {
            (upper, lower)
        };
        let mut x = 0.5 * (lower + upper);

        for _ in 0..NEWTON_MAX_STEPS {
            let fx = self.value_at(x);
            if fx == 0.0 {
                return Some(x);
            }
            if fx < 0.0 {
                neg = x;
            } else {
                pos = x;
            }

            let (lo, hi) = if neg < pos { (neg, pos) } else { (pos, neg) };
            let tol = ROOT_REL_TOL * (1.0 + x.abs());
            if hi - lo <= tol {
                return Some(0.5 * (lo + hi));
            }

            let slope = self.derivative_at(x);
            let newton = x - fx / slope;
            let next = if slope != 0.0 && newton.is_finite() && lo < newton && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
            if (next - x).abs() <= tol {
                return Some(next);
            }
            x = next;
        }
        Some(x)
    }
}
