// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use peakseg_core::{
    ConsistencyCheck, CountSeries, Diagnostics, ExecutionContext, IntervalStats, LogMeanDomain,
    OfflineDetector, PeakSegError, SegmentSummary, SegmentationResult,
};
use peakseg_loss::{
    PiecewisePoissonLoss, SelfCheckConfig, check_min_envelope, check_unconstrained_min,
};
use std::borrow::Cow;
use std::time::Instant;

const DEFAULT_CANCEL_CHECK_EVERY: usize = 1000;

/// Configuration for [`PoissonFpop`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FpopConfig {
    /// Cost added per change point, in un-normalized (weighted-sum) units.
    pub penalty: f64,
    pub self_check: SelfCheckConfig,
    pub cancel_check_every: usize,
}

impl Default for FpopConfig {
    fn default() -> Self {
        Self {
            penalty: 0.0,
            self_check: SelfCheckConfig::default(),
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        }
    }
}

impl FpopConfig {
    fn validate(&self) -> Result<(), PeakSegError> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(PeakSegError::invalid_input(format!(
                "FpopConfig.penalty must be finite and >= 0.0; got {}",
                self.penalty
            )));
        }
        self.self_check.validate()
    }

    fn normalized_cancel_check_every(&self) -> usize {
        self.cancel_check_every.max(1)
    }
}

/// Per-position cost functions and their summaries produced by [`forward_pass`].
#[derive(Clone, Debug)]
pub struct ForwardPass {
    /// Cost-to-go function of every position, indexed by position.
    pub costs: Vec<PiecewisePoissonLoss>,
    /// Minimum of `costs[i]`: optimal penalized prefix cost over cumulative weight.
    pub cost: Vec<f64>,
    pub intervals: Vec<usize>,
    pub total_weight: f64,
    pub self_checks_run: usize,
}

/// One step of the recurrence: the cheaper of "start a new segment after
/// `i - 1`" and "extend the current segment", then absorb point `i`.
fn advance(
    prev: &PiecewisePoissonLoss,
    x: &CountSeries<'_>,
    i: usize,
    prev_weight: f64,
    cum_weight: f64,
    config: &FpopConfig,
    self_checks_run: &mut usize,
) -> Result<PiecewisePoissonLoss, PeakSegError> {
    let mut candidate = prev.unconstrained_min(i - 1)?;
    *self_checks_run += check_unconstrained_min(&candidate, prev, &config.self_check)?;
    candidate.add(0.0, 0.0, config.penalty / prev_weight);

    let mut next = PiecewisePoissonLoss::min_envelope(&candidate, prev)?;
    *self_checks_run += check_min_envelope(&next, &candidate, prev, &config.self_check)?;

    next.multiply(prev_weight);
    next.add(x.weight(i), -x.count(i) * x.weight(i), 0.0);
    next.multiply(1.0 / cum_weight);
    Ok(next)
}

/// Builds the cost function of every position, checking each algebra step.
///
/// Position `i` holds the optimal penalized cost of `0..=i` as a function of
/// the last segment's log-mean, normalized by the cumulative weight `W_i`.
pub fn forward_pass(
    x: &CountSeries<'_>,
    domain: LogMeanDomain,
    config: &FpopConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<ForwardPass, PeakSegError> {
    let n = x.len();
    let cancel_check_every = config.normalized_cancel_check_every();
    let mut costs: Vec<PiecewisePoissonLoss> = Vec::with_capacity(n);
    let mut cost = Vec::with_capacity(n);
    let mut intervals = Vec::with_capacity(n);
    let mut self_checks_run = 0usize;
    let mut cum_weight = 0.0;

    for i in 0..n {
        ctx.check_cancelled_every(i, cancel_check_every)?;

        let prev_weight = cum_weight;
        cum_weight += x.weight(i);

        let next = match costs.last() {
            None => PiecewisePoissonLoss::initial(domain, x.count(0)),
            Some(prev) => advance(prev, x, i, prev_weight, cum_weight, config, &mut self_checks_run)
                .map_err(|err| err.at_position(i))?,
        };

        let best = next.minimize().map_err(|err| err.at_position(i))?;
        cost.push(best.cost);
        intervals.push(next.len());
        costs.push(next);

        ctx.report_progress((i + 1) as f32 / n as f32);
    }

    Ok(ForwardPass {
        costs,
        cost,
        intervals,
        total_weight: cum_weight,
        self_checks_run,
    })
}

fn backtrace_err(detail: String) -> PeakSegError {
    PeakSegError::consistency(ConsistencyCheck::Backtrace, detail)
}

/// Recovers the optimal segments from the per-position cost functions,
/// ordered last segment first.
pub fn backtrace(costs: &[PiecewisePoissonLoss]) -> Result<Vec<SegmentSummary>, PeakSegError> {
    let n = costs.len();
    let Some(last) = costs.last() else {
        return Err(backtrace_err("cannot backtrace an empty arena".to_string()));
    };

    let best = last.minimize()?;
    let mut log_mean = best.log_mean;
    let mut provenance = best.provenance;
    let mut end = n;
    let mut segments = vec![];
    let mut hops = 0usize;

    loop {
        hops += 1;
        if hops > n {
            return Err(backtrace_err(format!(
                "more than n={n} segments reached; provenance chain is cyclic"
            )));
        }

        let start = provenance.map_or(0, |p| p.prev_end + 1);
        if start >= end {
            return Err(backtrace_err(format!(
                "segment start {start} is not < end {end}"
            )));
        }
        segments.push(SegmentSummary {
            start,
            end,
            mean: log_mean.exp(),
            log_mean,
        });

        let Some(prev) = provenance else {
            break;
        };
        let arena_entry = costs.get(prev.prev_end).ok_or_else(|| {
            backtrace_err(format!(
                "provenance points at position {} outside arena of {n}",
                prev.prev_end
            ))
        })?;
        log_mean = prev.prev_log_mean;
        provenance = arena_entry
            .provenance_at(log_mean)
            .map_err(|err| err.at_position(prev.prev_end))?;
        end = prev.prev_end + 1;
    }

    Ok(segments)
}

/// Penalized Poisson segmentation by functional pruning in log-mean space.
///
/// Each position keeps the exact optimal cost as a piecewise function of the
/// last segment's log-mean, so the result is the global optimum of
/// `sum of segment losses + penalty * change count`.
#[derive(Debug)]
pub struct PoissonFpop {
    config: FpopConfig,
}

impl PoissonFpop {
    pub fn new(config: FpopConfig) -> Result<Self, PeakSegError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FpopConfig {
        &self.config
    }
}

impl OfflineDetector for PoissonFpop {
    fn detect(
        &self,
        x: &CountSeries<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<SegmentationResult, PeakSegError> {
        self.config.validate()?;
        let domain = x.log_mean_domain()?;

        let started_at = Instant::now();
        let pass = forward_pass(x, domain, &self.config, ctx)?;
        let segments = backtrace(&pass.costs)?;

        let runtime_ms = match u64::try_from(started_at.elapsed().as_millis()) {
            Ok(ms) => ms,
            Err(_) => u64::MAX,
        };

        let n = x.len();
        let objective = pass.cost[n - 1] * pass.total_weight;
        let change_count = segments.len() - 1;
        let interval_stats = IntervalStats::from_counts(&pass.intervals);

        let mut notes = vec![format!(
            "penalty={}, log_mean_domain=[{}, {}]",
            self.config.penalty, domain.min_log_mean, domain.max_log_mean
        )];
        if !domain.min_log_mean.is_finite() {
            notes.push("zero counts present; log-mean domain unbounded below".to_string());
        }
        notes.push(format!(
            "final_objective={objective}, change_count={change_count}"
        ));
        notes.push(format!(
            "self_check samples={}, rel_tol={}, seed={}",
            self.config.self_check.samples,
            self.config.self_check.rel_tol,
            self.config.self_check.seed
        ));

        let mut warnings = vec![];
        if self.config.penalty == 0.0 {
            warnings.push("penalty=0 adds no cost per change point".to_string());
        }

        ctx.record_scalar("offline.fpop_poisson.runtime_ms", runtime_ms as f64);
        if let Some(stats) = &interval_stats {
            ctx.record_scalar(
                "offline.fpop_poisson.max_intervals",
                stats.max_intervals as f64,
            );
            ctx.record_scalar("offline.fpop_poisson.mean_intervals", stats.mean_intervals);
        }
        ctx.record_scalar("offline.fpop_poisson.change_count", change_count as f64);
        ctx.report_progress(1.0);

        tracing::debug!(
            n,
            penalty = self.config.penalty,
            change_count,
            objective,
            max_intervals = interval_stats.as_ref().map_or(0, |s| s.max_intervals),
            runtime_ms,
            "poisson fpop finished"
        );

        let diagnostics = Diagnostics {
            n,
            runtime_ms: Some(runtime_ms),
            notes,
            warnings,
            algorithm: Cow::Borrowed("fpop"),
            cost_model: Cow::Borrowed("poisson_log_mean"),
            interval_stats,
            self_checks_run: pass.self_checks_run,
            ..Diagnostics::default()
        };

        SegmentationResult::new(
            n,
            self.config.penalty,
            pass.cost,
            pass.intervals,
            objective,
            segments,
            diagnostics,
        )
    }
}
