// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::fmt;

/// Which mandatory self-check detected an internal inconsistency.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsistencyCheck {
    /// Unconstrained minimum of the previous cost function.
    UnconstrainedMin,
    /// Pointwise minimum of the new-segment and continue-segment functions.
    MinEnvelope,
    /// Ordering/tiling/merge invariants of a piece list.
    Structure,
    /// Provenance walk from the last position back to the first segment.
    Backtrace,
}

impl ConsistencyCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnconstrainedMin => "unconstrained_min",
            Self::MinEnvelope => "min_envelope",
            Self::Structure => "structure",
            Self::Backtrace => "backtrace",
        }
    }
}

impl fmt::Display for ConsistencyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn position_suffix(position: &Option<usize>) -> String {
    match position {
        Some(position) => format!(" at position {position}"),
        None => String::new(),
    }
}

/// Error surface shared by every peakseg crate.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PeakSegError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Every `ln(count)` is identical, so there is no mean to fit.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    /// A post-construction check on the loss algebra failed. Fatal for the run.
    #[error("internal consistency violation in {check}{}: {detail}", position_suffix(.position))]
    ConsistencyViolation {
        check: ConsistencyCheck,
        position: Option<usize>,
        detail: String,
    },
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("cancelled")]
    Cancelled,
}

impl PeakSegError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn degenerate_input(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    pub fn consistency(check: ConsistencyCheck, detail: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            check,
            position: None,
            detail: detail.into(),
        }
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Tags a consistency violation with the data position being processed.
    ///
    /// Other variants pass through unchanged. An already-set position is kept.
    pub fn at_position(self, at: usize) -> Self {
        match self {
            Self::ConsistencyViolation {
                check,
                position: None,
                detail,
            } => Self::ConsistencyViolation {
                check,
                position: Some(at),
                detail,
            },
            other => other,
        }
    }

    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::ConsistencyViolation { .. })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DegenerateInput(_) => "degenerate_input",
            Self::ConsistencyViolation { .. } => "consistency_violation",
            Self::NumericalIssue(_) => "numerical_issue",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsistencyCheck, PeakSegError};

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            PeakSegError::invalid_input("n must be >= 1").to_string(),
            "invalid input: n must be >= 1"
        );
        assert_eq!(
            PeakSegError::degenerate_input("min == max").to_string(),
            "degenerate input: min == max"
        );
        assert_eq!(PeakSegError::cancelled().to_string(), "cancelled");
        assert_eq!(
            PeakSegError::consistency(ConsistencyCheck::MinEnvelope, "gap").to_string(),
            "internal consistency violation in min_envelope: gap"
        );
    }

    #[test]
    fn at_position_tags_consistency_violations_once() {
        let err = PeakSegError::consistency(ConsistencyCheck::UnconstrainedMin, "bad min")
            .at_position(4)
            .at_position(9);
        assert_eq!(
            err,
            PeakSegError::ConsistencyViolation {
                check: ConsistencyCheck::UnconstrainedMin,
                position: Some(4),
                detail: "bad min".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "internal consistency violation in unconstrained_min at position 4: bad min"
        );
        assert!(err.is_consistency_violation());
    }

    #[test]
    fn at_position_leaves_other_variants_untouched() {
        let err = PeakSegError::invalid_input("x").at_position(3);
        assert_eq!(err, PeakSegError::InvalidInput("x".to_string()));
        assert!(!err.is_consistency_violation());
    }

    #[test]
    fn codes_cover_every_variant() {
        let cases = [
            (PeakSegError::invalid_input("a"), "invalid_input"),
            (PeakSegError::degenerate_input("b"), "degenerate_input"),
            (
                PeakSegError::consistency(ConsistencyCheck::Backtrace, "c"),
                "consistency_violation",
            ),
            (PeakSegError::numerical_issue("d"), "numerical_issue"),
            (PeakSegError::cancelled(), "cancelled"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }
}
