// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod check;
pub mod exp_affine;
pub mod piece;
pub mod piecewise;

pub use check::{SelfCheckConfig, check_min_envelope, check_unconstrained_min};
pub use exp_affine::{ExpAffine, Roots};
pub use piece::{Piece, Provenance};
pub use piecewise::{MinimumSummary, PiecewisePoissonLoss};

/// Piecewise Poisson loss algebra for peakseg.
pub fn crate_name() -> &'static str {
    "peakseg-loss"
}
