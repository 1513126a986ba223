//! Run events and the observers that receive them.
//!
//! [`Pipeline`](crate::pipeline::Pipeline) reports progress through a
//! [`RunObserver`] instead of logging directly, so callers choose between
//! tracing output, silence, or recording events in tests.

use std::fmt;

use tracing::{debug, info, warn};

use betalens_core::analytics::BetaRefusal;
use betalens_core::domain::InstrumentCode;

use crate::report::RunReport;

// ─── Events ─────────────────────────────────────────────────────────

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LoadInputs,
    LoadBenchmark,
    Validate,
    Weight,
    MatchReturns,
    EstimateBetas,
    WeightedMetrics,
    Aggregate,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::LoadInputs => "load_inputs",
            Step::LoadBenchmark => "load_benchmark",
            Step::Validate => "validate",
            Step::Weight => "weight",
            Step::MatchReturns => "match_returns",
            Step::EstimateBetas => "estimate_betas",
            Step::WeightedMetrics => "weighted_metrics",
            Step::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one instrument's figures are incomplete.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    MissingStartPrice,
    MissingEndPrice,
    UndefinedBeta(BetaRefusal),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingStartPrice => f.write_str("missing start price"),
            Degradation::MissingEndPrice => f.write_str("missing end price"),
            Degradation::UndefinedBeta(reason) => write!(f, "undefined beta: {reason}"),
        }
    }
}

// ─── Observer trait ─────────────────────────────────────────────────

/// Receives pipeline events. Every method defaults to a no-op.
pub trait RunObserver: Send + Sync {
    fn on_step_started(&self, _step: Step) {}

    fn on_step_completed(&self, _step: Step, _summary: &str) {}

    fn on_degraded(&self, _code: &InstrumentCode, _issue: &Degradation) {}

    fn on_run_completed(&self, _report: &RunReport) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Forwards events to `tracing`.
///
/// Step summaries go to `info!`, per-instrument detail to `debug!`, and a
/// `warn!` summary of degraded instruments is emitted at run completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_step_started(&self, step: Step) {
        debug!(step = %step, "step started");
    }

    fn on_step_completed(&self, step: Step, summary: &str) {
        info!(step = %step, "{summary}");
    }

    fn on_degraded(&self, code: &InstrumentCode, issue: &Degradation) {
        debug!(code = %code, "{issue}");
    }

    fn on_run_completed(&self, report: &RunReport) {
        let diag = &report.diagnostics;
        if !diag.missing_start.is_empty() {
            warn!(
                count = diag.missing_start.len(),
                "instruments without a start price"
            );
        }
        if !diag.missing_end.is_empty() {
            warn!(
                count = diag.missing_end.len(),
                "instruments without an end price"
            );
        }
        if !diag.undefined_betas.is_empty() {
            warn!(
                count = diag.undefined_betas.len(),
                "instruments with undefined beta"
            );
        }
        info!(run_id = %report.run_id, "run completed");
    }
}
