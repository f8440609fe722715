// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::borrow::Cow;

/// Diagnostics schema version for segmentation run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Piece-count summary over all position cost functions of a run.
///
/// The number of pieces is the complexity measure of functional pruning: the
/// work per position is linear in it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalStats {
    pub max_intervals: usize,
    pub mean_intervals: f64,
    pub total_intervals: usize,
}

impl IntervalStats {
    /// Summarizes per-position interval counts; `None` for an empty slice.
    pub fn from_counts(intervals: &[usize]) -> Option<Self> {
        if intervals.is_empty() {
            return None;
        }
        let total_intervals: usize = intervals.iter().sum();
        Some(Self {
            max_intervals: intervals.iter().copied().max().unwrap_or(0),
            mean_intervals: total_intervals as f64 / intervals.len() as f64,
            total_intervals,
        })
    }
}

/// Structured diagnostics captured from a detector execution.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub algorithm: Cow<'static, str>,
    pub cost_model: Cow<'static, str>,
    pub interval_stats: Option<IntervalStats>,
    pub self_checks_run: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            algorithm: Cow::Borrowed(""),
            cost_model: Cow::Borrowed(""),
            interval_stats: None,
            self_checks_run: 0,
        }
    }
}
