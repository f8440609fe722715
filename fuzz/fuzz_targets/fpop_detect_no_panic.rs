// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use libfuzzer_sys::fuzz_target;
use peakseg_core::{CountSeries, ExecutionContext, OfflineDetector, PeakSegError};
use peakseg_fpop::{FpopConfig, PoissonFpop, SelfCheckConfig};

fn build_count(cursor: &mut common::ByteCursor<'_>) -> u64 {
    match cursor.next_u8() % 8 {
        0 => 0,
        1 => u64::from(cursor.next_u16()),
        _ => u64::from(cursor.next_u8() % 64),
    }
}

fn build_penalty(seed: u8, value: u16) -> f64 {
    match seed % 6 {
        0 => 0.0,
        1 => -1.0,
        2 => f64::NAN,
        _ => f64::from(value) / 64.0,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let penalty = build_penalty(cursor.next_u8(), cursor.next_u16());
    let samples = common::bounded(cursor.next_u8(), 0, 16);
    let weighted = cursor.next_u8() & 1 == 1;
    let n = common::bounded(cursor.next_u8(), 1, 96);

    let counts: Vec<u64> = (0..n).map(|_| build_count(&mut cursor)).collect();
    let weights: Vec<f64> = (0..n)
        .map(|_| match cursor.next_u8() {
            0 => 0.0,
            1 => f64::INFINITY,
            raw => f64::from(raw) / 32.0,
        })
        .collect();

    let Ok(series) = CountSeries::new(&counts, weighted.then_some(weights.as_slice())) else {
        return;
    };
    let Ok(detector) = PoissonFpop::new(FpopConfig {
        penalty,
        self_check: SelfCheckConfig {
            samples,
            seed: u64::from(cursor.next_u8()),
            ..SelfCheckConfig::default()
        },
        ..FpopConfig::default()
    }) else {
        return;
    };

    match detector.detect(&series, &ExecutionContext::new()) {
        Ok(result) => {
            assert_eq!(result.cost.len(), n);
            assert_eq!(result.breakpoints.last().copied(), Some(n));
            assert!(result.intervals.iter().all(|&k| k >= 1));
        }
        Err(PeakSegError::DegenerateInput(_)) | Err(PeakSegError::InvalidInput(_)) => {}
        Err(err) => panic!("unexpected detector failure: {err}"),
    }
});
