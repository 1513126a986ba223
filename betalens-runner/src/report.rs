//! Run report: everything one pipeline run produced.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use betalens_core::analytics::{
    PortfolioMetrics, SectorAggregate, UndefinedBeta, WeightSummary,
};
use betalens_core::data::DataSource;
use betalens_core::domain::{Instrument, InstrumentCode, PriceMatch};
use betalens_core::lookup_cache::CacheStats;

use crate::config::RunConfig;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Complete result of a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// BLAKE3 of config id and dataset hash.
    pub run_id: String,
    pub config_id: String,
    pub dataset_hash: String,
    pub generated_at: NaiveDateTime,
    pub config: RunConfig,
    /// Instrument rows in universe order.
    pub instruments: Vec<Instrument>,
    /// Sector rollups sorted by sector label.
    pub sectors: Vec<SectorAggregate>,
    pub portfolio: PortfolioMetrics,
    pub benchmark: BenchmarkSummary,
    pub weights: WeightSummary,
    pub diagnostics: Diagnostics,
    pub lookup_cache: CacheStats,
}

/// The benchmark's own move over the analysis window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkSummary {
    pub symbol: String,
    pub source: DataSource,
    pub observations: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub start: PriceMatch,
    pub end: PriceMatch,
    pub period_return: Option<f64>,
    /// True when the series covered only part of the requested window.
    #[serde(default)]
    pub partial: bool,
}

/// Per-instrument degradations and data-quality notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    pub missing_start: Vec<InstrumentCode>,
    pub missing_end: Vec<InstrumentCode>,
    pub undefined_betas: Vec<UndefinedBeta>,
    pub benchmark_returns: usize,
    pub joined_observations: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn instrument(&self, code: &InstrumentCode) -> Option<&Instrument> {
        self.instruments.iter().find(|i| &i.code == code)
    }

    /// Rows for the listed codes, in the order given.
    pub fn instruments_for<'a>(&'a self, codes: &'a [InstrumentCode]) -> Vec<&'a Instrument> {
        codes.iter().filter_map(|c| self.instrument(c)).collect()
    }

    /// Instruments with both an abs return and a beta.
    pub fn complete_count(&self) -> usize {
        self.instruments
            .iter()
            .filter(|i| i.abs_return.is_some() && i.beta.is_some())
            .count()
    }
}
