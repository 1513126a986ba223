//! Benchmark provider trait and structured error types.
//!
//! The BenchmarkProvider trait abstracts over where index closes come from
//! (Yahoo Finance, a local CSV export) so the loader can swap sources and tests
//! can run offline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::BenchmarkObservation;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no cached data for symbol '{symbol}', run `download {symbol}` first")]
    NoCachedData { symbol: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: String, column: String },

    #[error("{path}: row {row}: cannot parse date '{value}'")]
    InvalidDate {
        path: String,
        row: usize,
        value: String,
    },

    #[error("{path}: row {row}: empty instrument code")]
    EmptyCode { path: String, row: usize },

    #[error("data error: {0}")]
    Other(String),
}

/// Result of a successful benchmark fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub observations: Vec<BenchmarkObservation>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    CsvImport,
    Cache,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::YahooFinance => "yahoo_finance",
            DataSource::CsvImport => "csv_import",
            DataSource::Cache => "cache",
        }
    }
}

/// Source of benchmark index closes.
///
/// The cache layer sits above this trait; providers don't know about it.
pub trait BenchmarkProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily closes for `symbol` over `[start, end]`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<FetchResult, DataError>;
}
