// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

#[path = "common.rs"]
mod common;

use libfuzzer_sys::fuzz_target;
use peakseg_core::LogMeanDomain;
use peakseg_loss::{Piece, PiecewisePoissonLoss, Provenance, SelfCheckConfig, check_min_envelope};

fn coefficient(cursor: &mut common::ByteCursor<'_>, scale: f64) -> f64 {
    (f64::from(cursor.next_u8()) - 128.0) / 128.0 * scale
}

/// Random tiling of `domain` into up to eight pieces with positive `e^u` terms.
fn build_loss(cursor: &mut common::ByteCursor<'_>, domain: LogMeanDomain, tag: usize) -> PiecewisePoissonLoss {
    let pieces = common::bounded(cursor.next_u8(), 1, 8);
    let lower = domain.finite_lower(8.0);
    let span = domain.max_log_mean - lower;

    let mut cuts: Vec<f64> = (1..pieces)
        .map(|_| lower + span * (f64::from(cursor.next_u8()) + 0.5) / 256.0)
        .collect();
    cuts.sort_by(f64::total_cmp);
    cuts.dedup();

    let mut bounds = vec![domain.min_log_mean];
    bounds.extend(cuts);
    bounds.push(domain.max_log_mean);

    let mut out = Vec::with_capacity(bounds.len());
    for (idx, pair) in bounds.windows(2).enumerate() {
        out.push(Piece::new(
            0.05 + f64::from(cursor.next_u8()) / 64.0,
            coefficient(cursor, 40.0),
            coefficient(cursor, 40.0),
            pair[0],
            pair[1],
            Some(Provenance {
                prev_end: tag * 16 + idx,
                prev_log_mean: pair[0].max(lower),
            }),
        ));
    }
    PiecewisePoissonLoss::from_pieces(domain, out).unwrap_or_else(|err| panic!("{err}"))
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = common::ByteCursor::new(data);

    let max_log_mean = f64::from(cursor.next_u8() % 64) / 8.0 + 0.25;
    let min_log_mean = if cursor.next_u8() % 4 == 0 {
        f64::NEG_INFINITY
    } else {
        max_log_mean - 0.25 - f64::from(cursor.next_u8() % 64) / 8.0
    };
    let Ok(domain) = LogMeanDomain::new(min_log_mean, max_log_mean) else {
        return;
    };

    let new_segment = build_loss(&mut cursor, domain, 0);
    let continue_segment = build_loss(&mut cursor, domain, 1);

    let envelope = PiecewisePoissonLoss::min_envelope(&new_segment, &continue_segment)
        .unwrap_or_else(|err| panic!("envelope failed: {err}"));
    assert!(envelope.len() <= 3 * (new_segment.len() + continue_segment.len()));
    check_min_envelope(
        &envelope,
        &new_segment,
        &continue_segment,
        &SelfCheckConfig::default(),
    )
    .unwrap_or_else(|err| panic!("envelope check failed: {err}"));
});
