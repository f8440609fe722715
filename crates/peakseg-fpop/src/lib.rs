// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod fpop;

pub use fpop::{FpopConfig, ForwardPass, PoissonFpop, backtrace, forward_pass};
pub use peakseg_loss::SelfCheckConfig;

/// Offline Poisson segmentation detectors for peakseg.
pub fn crate_name() -> &'static str {
    "peakseg-fpop"
}
