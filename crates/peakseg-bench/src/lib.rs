// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Deterministic count series shared by the peakseg benchmarks.

/// Piecewise-constant Poisson-like counts with `regimes` equal-length blocks
/// alternating between a low and a high rate, plus small deterministic noise.
pub fn step_counts(n: usize, regimes: usize, seed: u64) -> Vec<u64> {
    let regime_len = (n / regimes.max(1)).max(1);
    let mut state = seed ^ 0x2545_f491_4f6c_dd1d;
    (0..n)
        .map(|i| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let base = if (i / regime_len) % 2 == 0 { 4 } else { 40 };
            let noise = state >> 60;
            base + noise
        })
        .collect()
}

/// Sparse counts where most positions are zero, so the log-mean domain is
/// unbounded below.
pub fn sparse_counts(n: usize, seed: u64) -> Vec<u64> {
    let mut state = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            if (state >> 61) == 0 {
                (state >> 58) & 0x7
            } else {
                0
            }
        })
        .collect()
}
