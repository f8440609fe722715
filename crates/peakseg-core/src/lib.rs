// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod control;
pub mod detectors;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod observability;
pub mod result;
pub mod series;

pub use control::CancelToken;
pub use detectors::OfflineDetector;
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics, IntervalStats};
pub use error::{ConsistencyCheck, PeakSegError};
pub use execution_context::ExecutionContext;
pub use observability::{ProgressSink, TelemetrySink};
pub use result::{SegmentSummary, SegmentationResult, validate_breakpoints};
pub use series::{CountSeries, LogMeanDomain};

/// Core shared types and traits for peakseg.
pub fn crate_name() -> &'static str {
    "peakseg-core"
}
