// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::PeakSegError;

/// Closed log-mean interval shared by every cost function of one run.
///
/// `min_log_mean` is `-inf` whenever the input contains a zero count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogMeanDomain {
    pub min_log_mean: f64,
    pub max_log_mean: f64,
}

impl LogMeanDomain {
    /// Builds a domain, rejecting empty or inverted bounds.
    pub fn new(min_log_mean: f64, max_log_mean: f64) -> Result<Self, PeakSegError> {
        if min_log_mean.is_nan() || max_log_mean.is_nan() {
            return Err(PeakSegError::invalid_input(format!(
                "log-mean bounds must not be NaN; got [{min_log_mean}, {max_log_mean}]"
            )));
        }
        if !max_log_mean.is_finite() {
            return Err(PeakSegError::degenerate_input(format!(
                "max log-mean must be finite; got {max_log_mean}"
            )));
        }
        if min_log_mean >= max_log_mean {
            return Err(PeakSegError::degenerate_input(format!(
                "min log(count) equals max log(count) ({min_log_mean}); no mean to fit"
            )));
        }
        Ok(Self {
            min_log_mean,
            max_log_mean,
        })
    }

    pub fn contains(&self, log_mean: f64) -> bool {
        self.min_log_mean <= log_mean && log_mean <= self.max_log_mean
    }

    /// Lowest finite point worth probing; `-inf` lower bounds are cut off
    /// `span` units below the upper bound.
    pub fn finite_lower(&self, span: f64) -> f64 {
        if self.min_log_mean.is_finite() {
            self.min_log_mean
        } else {
            self.max_log_mean - span
        }
    }
}

/// Borrowed, validated sequence of non-negative counts with optional weights.
#[derive(Clone, Copy, Debug)]
pub struct CountSeries<'a> {
    counts: &'a [u64],
    weights: Option<&'a [f64]>,
}

impl<'a> CountSeries<'a> {
    /// Constructs a validated `CountSeries`; missing weights mean unit weights.
    pub fn new(counts: &'a [u64], weights: Option<&'a [f64]>) -> Result<Self, PeakSegError> {
        if counts.is_empty() {
            return Err(PeakSegError::invalid_input("n must be >= 1"));
        }

        if let Some(weights) = weights {
            if weights.len() != counts.len() {
                return Err(PeakSegError::invalid_input(format!(
                    "weights length mismatch: got {}, expected n={}",
                    weights.len(),
                    counts.len()
                )));
            }
            if let Some((idx, weight)) = weights
                .iter()
                .copied()
                .enumerate()
                .find(|(_, w)| !w.is_finite() || *w <= 0.0)
            {
                return Err(PeakSegError::invalid_input(format!(
                    "weights must be finite and > 0; index {idx} has {weight}"
                )));
            }
        }

        Ok(Self { counts, weights })
    }

    /// Convenience constructor for unit-weight data.
    pub fn unweighted(counts: &'a [u64]) -> Result<Self, PeakSegError> {
        Self::new(counts, None)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &'a [u64] {
        self.counts
    }

    pub fn weights(&self) -> Option<&'a [f64]> {
        self.weights
    }

    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    pub fn count(&self, i: usize) -> f64 {
        self.counts[i] as f64
    }

    pub fn weight(&self, i: usize) -> f64 {
        self.weights.map_or(1.0, |weights| weights[i])
    }

    pub fn total_weight(&self) -> f64 {
        match self.weights {
            Some(weights) => weights.iter().sum(),
            None => self.counts.len() as f64,
        }
    }

    /// Log-mean search domain: min/max of `ln(count)` over all points.
    pub fn log_mean_domain(&self) -> Result<LogMeanDomain, PeakSegError> {
        let (min_log_mean, max_log_mean) = self.counts.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &count| {
                let log_count = (count as f64).ln();
                (lo.min(log_count), hi.max(log_count))
            },
        );
        LogMeanDomain::new(min_log_mean, max_log_mean)
    }
}
