//! Beta estimation against the benchmark.
//!
//! For each instrument, daily returns are joined with benchmark daily returns
//! on date (inner join) and beta is the sample covariance over the sample
//! variance of the benchmark leg (both with `n - 1` denominators).

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::InstrumentCode;
use crate::error::AnalysisError;
use crate::prices::{BenchmarkSeries, PriceIndex};
use crate::table::{PortfolioTable, Stage};

pub const DEFAULT_MIN_OBSERVATIONS: usize = 5;
pub const DEFAULT_MIN_BENCHMARK_RETURNS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaConfig {
    /// Joined observations an instrument needs for a defined beta.
    pub min_observations: usize,
    /// Benchmark daily returns required before any beta is attempted.
    pub min_benchmark_returns: usize,
}

impl Default for BetaConfig {
    fn default() -> Self {
        Self {
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            min_benchmark_returns: DEFAULT_MIN_BENCHMARK_RETURNS,
        }
    }
}

/// Why an instrument's beta is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BetaRefusal {
    InsufficientObservations { found: usize, required: usize },
    ZeroBenchmarkVariance,
}

impl fmt::Display for BetaRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetaRefusal::InsufficientObservations { found, required } => {
                write!(f, "insufficient observations ({found} < {required})")
            }
            BetaRefusal::ZeroBenchmarkVariance => f.write_str("zero benchmark variance"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndefinedBeta {
    pub code: InstrumentCode,
    pub reason: BetaRefusal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetaDiagnostics {
    pub benchmark_returns: usize,
    pub joined_observations: usize,
    pub computed: usize,
    pub undefined: Vec<UndefinedBeta>,
}

/// Sample covariance over sample variance of the benchmark leg.
///
/// `pairs` are `(instrument_return, benchmark_return)` on shared dates.
pub fn estimate_beta(pairs: &[(f64, f64)], min_observations: usize) -> Result<f64, BetaRefusal> {
    // An n-1 denominator needs at least two points.
    let required = min_observations.max(2);
    let n = pairs.len();
    if n < required {
        return Err(BetaRefusal::InsufficientObservations { found: n, required });
    }

    let nf = n as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in pairs {
        let dy = y - mean_y;
        cov += (x - mean_x) * dy;
        var += dy * dy;
    }
    cov /= nf - 1.0;
    var /= nf - 1.0;

    let first = pairs[0].1;
    let constant = pairs.iter().all(|(_, y)| *y == first);
    if constant || var == 0.0 {
        return Err(BetaRefusal::ZeroBenchmarkVariance);
    }

    Ok(cov / var)
}

/// Inner join of instrument returns with benchmark returns on date.
pub fn join_returns(
    instrument: &[(NaiveDate, f64)],
    benchmark: &BTreeMap<NaiveDate, f64>,
) -> Vec<(f64, f64)> {
    instrument
        .iter()
        .filter_map(|(date, r)| benchmark.get(date).map(|b| (*r, *b)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BetaEstimator {
    config: BetaConfig,
}

impl BetaEstimator {
    pub fn new(config: BetaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BetaConfig {
        &self.config
    }

    /// Attach a beta to every instrument that has enough joined history.
    ///
    /// Fatal when the benchmark or the joined universe has too few returns, or
    /// when no instrument ends up with a defined beta. The table is left
    /// untouched on error.
    pub fn apply(
        &self,
        table: &mut PortfolioTable,
        index: &PriceIndex,
        benchmark: &BenchmarkSeries,
    ) -> Result<BetaDiagnostics, AnalysisError> {
        table.check_transition(Stage::BetasEstimated)?;

        let bench_returns = benchmark.daily_returns();
        if bench_returns.len() < self.config.min_benchmark_returns {
            return Err(AnalysisError::InsufficientBenchmarkReturns {
                found: bench_returns.len(),
                required: self.config.min_benchmark_returns,
            });
        }
        debug!(
            symbol = benchmark.symbol(),
            returns = bench_returns.len(),
            "benchmark returns computed"
        );

        let mut joined_observations = 0;
        let estimates: Vec<Result<f64, BetaRefusal>> = table
            .instruments()
            .iter()
            .map(|inst| {
                let returns = index
                    .series(&inst.code)
                    .map(|s| s.daily_returns())
                    .unwrap_or_default();
                let pairs = join_returns(&returns, &bench_returns);
                joined_observations += pairs.len();
                estimate_beta(&pairs, self.config.min_observations)
            })
            .collect();

        if joined_observations < self.config.min_benchmark_returns {
            return Err(AnalysisError::InsufficientJoinedReturns {
                found: joined_observations,
                required: self.config.min_benchmark_returns,
            });
        }
        if estimates.iter().all(|e| e.is_err()) {
            return Err(AnalysisError::NoDefinedBeta {
                instruments: table.len(),
            });
        }

        let mut diag = BetaDiagnostics {
            benchmark_returns: bench_returns.len(),
            joined_observations,
            ..Default::default()
        };
        for (inst, estimate) in table.instruments_mut().iter_mut().zip(estimates) {
            match estimate {
                Ok(beta) => {
                    inst.beta = Some(beta);
                    diag.computed += 1;
                }
                Err(reason) => {
                    inst.beta = None;
                    diag.undefined.push(UndefinedBeta {
                        code: inst.code.clone(),
                        reason,
                    });
                }
            }
        }
        table.mark(Stage::BetasEstimated);

        if !diag.undefined.is_empty() {
            warn!(count = diag.undefined.len(), "instruments with undefined beta");
        }

        Ok(diag)
    }
}
