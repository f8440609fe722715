// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::result::SegmentationResult;
use crate::{CountSeries, ExecutionContext, PeakSegError};

/// Offline detector contract: full series in, full result out.
pub trait OfflineDetector {
    fn detect(
        &self,
        x: &CountSeries<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<SegmentationResult, PeakSegError>;
}
