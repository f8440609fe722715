// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::exp_affine::ExpAffine;

/// Backpointer to the optimal previous segment.
///
/// `prev_end` is the last data index of the previous segment (an index into
/// the per-position arena) and `prev_log_mean` is where that position's cost
/// function attained its minimum.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Provenance {
    pub prev_end: usize,
    pub prev_log_mean: f64,
}

/// One closed-form fragment `exp_coef * e^u + lin_coef * u + constant` of a
/// piecewise loss, valid on `[lower, upper]`.
///
/// `provenance` is `None` for pieces of the first segment.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Piece {
    pub exp_coef: f64,
    pub lin_coef: f64,
    pub constant: f64,
    pub lower: f64,
    pub upper: f64,
    pub provenance: Option<Provenance>,
}

impl Piece {
    pub fn new(
        exp_coef: f64,
        lin_coef: f64,
        constant: f64,
        lower: f64,
        upper: f64,
        provenance: Option<Provenance>,
    ) -> Self {
        Self {
            exp_coef,
            lin_coef,
            constant,
            lower,
            upper,
            provenance,
        }
    }

    pub fn coefficients(&self) -> ExpAffine {
        ExpAffine::new(self.exp_coef, self.lin_coef, self.constant)
    }

    pub fn value_at(&self, u: f64) -> f64 {
        self.coefficients().value_at(u)
    }

    pub fn derivative_at(&self, u: f64) -> f64 {
        self.coefficients().derivative_at(u)
    }

    pub fn argmin(&self) -> f64 {
        self.coefficients().argmin_on(self.lower, self.upper)
    }

    /// Minimum over the piece's interval and where it is attained.
    pub fn min_value(&self) -> (f64, f64) {
        let log_mean = self.argmin();
        (self.value_at(log_mean), log_mean)
    }

    pub fn contains(&self, u: f64) -> bool {
        self.lower <= u && u <= self.upper
    }

    /// Coefficient-wise `self - other`, ignoring intervals.
    pub fn difference(&self, other: &Self) -> ExpAffine {
        self.coefficients() - other.coefficients()
    }

    /// Same coefficients and same provenance; adjacent pieces like this merge.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.coefficients() == other.coefficients() && self.provenance == other.provenance
    }

    /// Copy of this piece with its interval replaced.
    pub fn restricted(&self, lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            ..*self
        }
    }

    /// A point strictly inside the interval, finite even for `lower = -inf`.
    pub fn interior_point(&self) -> f64 {
        interior_point(self.lower, self.upper)
    }

    pub fn add(&mut self, exp_coef: f64, lin_coef: f64, constant: f64) {
        self.exp_coef += exp_coef;
        self.lin_coef += lin_coef;
        self.constant += constant;
    }

    pub fn multiply(&mut self, factor: f64) {
        self.exp_coef *= factor;
        self.lin_coef *= factor;
        self.constant *= factor;
    }
}

pub(crate) fn interior_point(lower: f64, upper: f64) -> f64 {
    if lower == f64::NEG_INFINITY {
        upper - 1.0
    } else {
        0.5 * (lower + upper)
    }
}
