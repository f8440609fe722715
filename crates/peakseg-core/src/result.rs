// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{Diagnostics, PeakSegError};

/// One segment of the optimal partition, half-open `[start, end)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentSummary {
    pub start: usize,
    pub end: usize,
    pub mean: f64,
    /// `ln(mean)`, `-inf` for an all-zero segment. Serialized as `null` in that
    /// case since JSON has no infinities.
    #[cfg_attr(feature = "serde", serde(with = "log_mean_serde"))]
    pub log_mean: f64,
}

#[cfg(feature = "serde")]
mod log_mean_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if *value == f64::NEG_INFINITY {
            serializer.serialize_none()
        } else {
            value.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}

impl SegmentSummary {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Output of one segmentation run.
///
/// `cost[i]` is the optimal penalized cost of the prefix `0..=i` divided by the
/// cumulative weight through `i`; `intervals[i]` is the piece count of the cost
/// function at position `i`. `segments` is ordered last segment first.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationResult {
    pub n: usize,
    pub penalty: f64,
    pub cost: Vec<f64>,
    pub intervals: Vec<usize>,
    pub objective: f64,
    pub segments: Vec<SegmentSummary>,
    pub breakpoints: Vec<usize>,
    pub change_points: Vec<usize>,
    pub diagnostics: Diagnostics,
}

impl SegmentationResult {
    /// Assembles a result from most-recent-first segments, deriving
    /// breakpoints and change points and validating the partition.
    pub fn new(
        n: usize,
        penalty: f64,
        cost: Vec<f64>,
        intervals: Vec<usize>,
        objective: f64,
        segments: Vec<SegmentSummary>,
        diagnostics: Diagnostics,
    ) -> Result<Self, PeakSegError> {
        if cost.len() != n || intervals.len() != n {
            return Err(PeakSegError::invalid_input(format!(
                "per-position outputs must have length n={n}; got cost={}, intervals={}",
                cost.len(),
                intervals.len()
            )));
        }

        let mut breakpoints: Vec<usize> = segments.iter().map(|segment| segment.end).collect();
        breakpoints.reverse();
        validate_breakpoints(n, &breakpoints)?;

        let mut expected_start = 0usize;
        for segment in segments.iter().rev() {
            if segment.start != expected_start {
                return Err(PeakSegError::invalid_input(format!(
                    "segments must tile [0, {n}); segment [{}, {}) starts at {}, expected {expected_start}",
                    segment.start, segment.end, segment.start
                )));
            }
            expected_start = segment.end;
        }

        let change_points = breakpoints[..breakpoints.len() - 1].to_vec();
        Ok(Self {
            n,
            penalty,
            cost,
            intervals,
            objective,
            segments,
            breakpoints,
            change_points,
            diagnostics,
        })
    }

    pub fn change_count(&self) -> usize {
        self.change_points.len()
    }

    /// Segments ordered first to last.
    pub fn segments_in_order(&self) -> impl Iterator<Item = &SegmentSummary> {
        self.segments.iter().rev()
    }
}

/// Validates ascending half-open segment ends terminating at `n`.
pub fn validate_breakpoints(n: usize, breakpoints: &[usize]) -> Result<(), PeakSegError> {
    let Some(&last) = breakpoints.last() else {
        return Err(PeakSegError::invalid_input(
            "breakpoints must be non-empty and end with n",
        ));
    };
    if last != n {
        return Err(PeakSegError::invalid_input(format!(
            "last breakpoint must equal n={n}; got {last}"
        )));
    }
    if breakpoints[0] == 0 {
        return Err(PeakSegError::invalid_input(
            "breakpoints must be > 0 (empty leading segment)",
        ));
    }
    for window in breakpoints.windows(2) {
        if window[0] >= window[1] {
            return Err(PeakSegError::invalid_input(format!(
                "breakpoints must be strictly increasing; got {} then {}",
                window[0], window[1]
            )));
        }
    }
    Ok(())
}
