// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use peakseg_core::{
    CountSeries, ExecutionContext, OfflineDetector, PeakSegError, SegmentationResult,
    validate_breakpoints,
};
use peakseg_fpop::{FpopConfig, PoissonFpop};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

const MIN_PROPTEST_CASES: u32 = 1000;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn detect(
    counts: &[u64],
    weights: Option<&[f64]>,
    penalty: f64,
) -> Result<SegmentationResult, PeakSegError> {
    let series = CountSeries::new(counts, weights)?;
    let detector = PoissonFpop::new(FpopConfig {
        penalty,
        ..FpopConfig::default()
    })?;
    detector.detect(&series, &ExecutionContext::new())
}

fn is_degenerate(counts: &[u64]) -> bool {
    counts.iter().all(|&c| c == counts[0])
}

/// Weighted Poisson loss of `counts[start..end]` at its optimal mean.
fn segment_loss(counts: &[u64], weights: &[f64], start: usize, end: usize) -> f64 {
    let w: f64 = weights[start..end].iter().sum();
    let mean = (start..end)
        .map(|i| counts[i] as f64 * weights[i])
        .sum::<f64>()
        / w;
    (start..end)
        .map(|i| {
            let log_term = if counts[i] == 0 {
                0.0
            } else {
                counts[i] as f64 * mean.ln()
            };
            weights[i] * (mean - log_term)
        })
        .sum()
}

/// Optimal penalized cost of every prefix by exhaustive optimal partitioning,
/// normalized by the prefix weight like the detector's `cost` vector.
fn brute_force_prefix_costs(counts: &[u64], weights: &[f64], penalty: f64) -> Vec<f64> {
    let n = counts.len();
    let mut best = vec![f64::INFINITY; n + 1];
    best[0] = -penalty;
    for end in 1..=n {
        for start in 0..end {
            let candidate = best[start] + penalty + segment_loss(counts, weights, start, end);
            if candidate < best[end] {
                best[end] = candidate;
            }
        }
    }
    let mut cum_weight = 0.0;
    (0..n)
        .map(|i| {
            cum_weight += weights[i];
            best[i + 1] / cum_weight
        })
        .collect()
}

fn assert_close(actual: f64, expected: f64, rel_tol: f64) -> Result<(), TestCaseError> {
    let tol = rel_tol * expected.abs().max(1.0);
    prop_assert!(
        (actual - expected).abs() <= tol,
        "expected {}, got {}, tol={}",
        expected,
        actual,
        tol
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn prefix_costs_match_brute_force(
        counts in prop::collection::vec(0u64..30, 2..=8),
        weights in prop::option::of(prop::collection::vec(0.5f64..3.0, 8)),
        penalty in prop_oneof![Just(0.0), 0.0f64..25.0],
    ) {
        prop_assume!(!is_degenerate(&counts));
        let n = counts.len();
        let weights = weights.map(|w| w[..n].to_vec());

        let result = detect(&counts, weights.as_deref(), penalty)
            .expect("detect should succeed for non-degenerate input");
        let unit = vec![1.0; n];
        let expected = brute_force_prefix_costs(&counts, weights.as_deref().unwrap_or(&unit[..]), penalty);

        prop_assert_eq!(result.cost.len(), n);
        for (actual, expected) in result.cost.iter().zip(&expected) {
            assert_close(*actual, *expected, 1e-8)?;
        }
    }

    #[test]
    fn optimal_objective_is_non_decreasing_in_penalty(
        counts in prop::collection::vec(0u64..40, 2..32),
        low in prop_oneof![Just(0.0), 0.0f64..20.0],
        extra in 0.0f64..20.0,
    ) {
        prop_assume!(!is_degenerate(&counts));
        let cheap = detect(&counts, None, low).expect("detect should succeed");
        let dear = detect(&counts, None, low + extra).expect("detect should succeed");
        prop_assert!(
            cheap.objective <= dear.objective + 1e-9 * dear.objective.abs().max(1.0),
            "objective {} at penalty {} exceeds {} at penalty {}",
            cheap.objective,
            low,
            dear.objective,
            low + extra
        );
        prop_assert!(cheap.change_count() >= dear.change_count());
    }

    #[test]
    fn backtrace_partitions_input_and_reproduces_objective(
        counts in prop::collection::vec(0u64..50, 2..48),
        penalty in prop_oneof![Just(0.0), 0.0f64..30.0],
    ) {
        prop_assume!(!is_degenerate(&counts));
        let n = counts.len();
        let result = detect(&counts, None, penalty).expect("detect should succeed");
        let unit = vec![1.0; n];

        validate_breakpoints(n, &result.breakpoints).expect("breakpoint contract must hold");
        prop_assert_eq!(result.segments.len(), result.change_count() + 1);
        prop_assert!(result.intervals.iter().all(|&k| k >= 1));

        let mut recomputed = penalty * result.change_count() as f64;
        let mut expected_start = 0;
        for segment in result.segments_in_order() {
            prop_assert_eq!(segment.start, expected_start);
            prop_assert!(segment.start < segment.end);
            expected_start = segment.end;

            recomputed += segment_loss(&counts, &unit, segment.start, segment.end);
            let sum: u64 = counts[segment.start..segment.end].iter().sum();
            let mean = sum as f64 / segment.len() as f64;
            prop_assert!(
                (segment.mean - mean).abs() <= 1e-6 * mean.max(1.0),
                "segment [{}, {}) mean {} != {}",
                segment.start,
                segment.end,
                segment.mean,
                mean
            );
        }
        prop_assert_eq!(expected_start, n);
        assert_close(result.objective, recomputed, 1e-8)?;
    }
}

#[test]
fn degenerate_inputs_are_rejected() {
    for counts in [vec![5u64; 6], vec![0; 4], vec![12]] {
        let err = detect(&counts, None, 1.0).expect_err("degenerate input must fail");
        assert!(matches!(err, PeakSegError::DegenerateInput(_)), "{err:?}");
    }
}

#[test]
fn zero_penalty_matches_brute_force_on_every_small_series() {
    const LEN: usize = 6;
    const LEVELS: u64 = 5;
    let unit = [1.0; LEN];
    let mut checked = 0;
    for code in 0..LEVELS.pow(LEN as u32) {
        let counts: Vec<u64> = (0..LEN)
            .map(|i| (code / LEVELS.pow(i as u32)) % LEVELS)
            .collect();
        if is_degenerate(&counts) {
            continue;
        }
        let result = detect(&counts, None, 0.0)
            .unwrap_or_else(|err| panic!("detect failed for {counts:?}: {err}"));
        let expected = brute_force_prefix_costs(&counts, &unit, 0.0);
        for (i, (actual, expected)) in result.cost.iter().zip(&expected).enumerate() {
            let tol = 1e-8 * expected.abs().max(1.0);
            assert!(
                (actual - expected).abs() <= tol,
                "{counts:?} prefix {i}: expected {expected}, got {actual}"
            );
        }
        checked += 1;
    }
    assert_eq!(checked, LEVELS.pow(LEN as u32) - LEVELS);
}
