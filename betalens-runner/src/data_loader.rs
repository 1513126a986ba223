//! Input loading and benchmark resolution for the runner.
//!
//! Universe and price table come from local CSV files. The benchmark follows a
//! fallback policy:
//! 1. If the cache covers the requested window → use it
//! 2. If not and a provider is available (and not offline) → fetch, then cache
//! 3. If offline and the cache holds part of the window → use the partial
//!    series with a warning. A failed fetch never falls back to it.
//! 4. Otherwise → fail with a clear error

use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use betalens_core::data::{
    load_prices, load_universe, BenchmarkCache, BenchmarkProvider, CoverageResult,
    CsvBenchmarkProvider, DataError, DataSource, YahooProvider,
};
use betalens_core::domain::{BenchmarkObservation, DatasetHash, Instrument, PriceObservation};
use betalens_core::prices::{BenchmarkSeries, PriceIndex};
use betalens_core::AnalysisError;

use crate::config::{ConfigError, RunConfig};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached data for '{symbol}' and no network access")]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Options controlling how the benchmark is loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Start of the benchmark window (already buffered).
    pub start: NaiveDate,
    /// End of the benchmark window (already buffered).
    pub end: NaiveDate,
    /// If true, never make network requests.
    pub offline: bool,
    /// Fetch even if the cache covers the window.
    pub force: bool,
    /// Store fetched series in the cache.
    pub write_cache: bool,
}

impl LoadOptions {
    /// Options for the buffered benchmark window of `config`.
    ///
    /// A configured benchmark CSV is always read fresh and never cached.
    pub fn for_config(config: &RunConfig) -> Result<Self, ConfigError> {
        let (start, end) = config.benchmark_window()?;
        let from_csv = config.inputs.benchmark_csv.is_some();
        Ok(Self {
            start,
            end,
            offline: false,
            force: from_csv,
            write_cache: !from_csv,
        })
    }
}

/// Universe rows and the price index built from the price table.
#[derive(Debug)]
pub struct LoadedInputs {
    pub universe: Vec<Instrument>,
    pub index: PriceIndex,
    /// Non-numeric price cells coerced to undefined.
    pub coerced_prices: usize,
    /// Hash over universe and price rows.
    pub inputs_hash: String,
}

/// Benchmark series with provenance.
#[derive(Debug)]
pub struct LoadedBenchmark {
    pub series: BenchmarkSeries,
    pub source: DataSource,
    /// True when only part of the requested window was available.
    pub partial: bool,
}

/// Read the universe and price table from disk.
pub fn load_inputs(universe_path: &Path, prices_path: &Path) -> Result<LoadedInputs, LoadError> {
    let universe = load_universe(universe_path)?;
    let prices = load_prices(prices_path)?;
    let inputs_hash = hash_inputs(&universe, &prices.observations);
    info!(
        instruments = universe.len(),
        price_rows = prices.observations.len(),
        "inputs loaded"
    );
    Ok(LoadedInputs {
        universe,
        index: PriceIndex::new(prices.observations),
        coerced_prices: prices.coerced,
        inputs_hash,
    })
}

/// Provider for a run: the configured CSV export, else Yahoo Finance.
pub fn default_provider(config: &RunConfig) -> Result<Box<dyn BenchmarkProvider>, DataError> {
    match &config.inputs.benchmark_csv {
        Some(path) => Ok(Box::new(CsvBenchmarkProvider::new(path))),
        None => Ok(Box::new(YahooProvider::new()?)),
    }
}

/// Resolve the benchmark series through cache and provider.
pub fn load_benchmark(
    symbol: &str,
    cache: &BenchmarkCache,
    provider: Option<&dyn BenchmarkProvider>,
    opts: &LoadOptions,
) -> Result<LoadedBenchmark, LoadError> {
    // Step 1: cache hit
    let coverage = cache.covers_range(symbol, opts.start, opts.end);
    if !opts.force && coverage == CoverageResult::FullyCovered {
        let rows = cache.load_range(symbol, opts.start, opts.end)?;
        info!(symbol, rows = rows.len(), "benchmark loaded from cache");
        return finish(symbol, rows, DataSource::Cache, false);
    }

    // Step 2: fetch
    let mut fetch_error = None;
    if !opts.offline {
        if let Some(prov) = provider {
            match prov.fetch(symbol, opts.start, opts.end) {
                Ok(fetched) => {
                    if opts.write_cache {
                        if let Err(e) = cache.write(symbol, &fetched.observations, fetched.source)
                        {
                            warn!(symbol, error = %e, "failed to cache benchmark series");
                        }
                    }
                    info!(
                        symbol,
                        provider = prov.name(),
                        rows = fetched.observations.len(),
                        "benchmark fetched"
                    );
                    return finish(symbol, fetched.observations, fetched.source, false);
                }
                Err(e) => {
                    warn!(symbol, provider = prov.name(), error = %e, "benchmark fetch failed");
                    fetch_error = Some(e);
                }
            }
        }
    }

    // Step 3: partial cache, offline only
    let offline = opts.offline || provider.is_none();
    if let CoverageResult::PartiallyCovered {
        cached_start,
        cached_end,
    } = coverage
    {
        if offline {
            let rows = cache.load_range(symbol, opts.start, opts.end)?;
            if !rows.is_empty() {
                warn!(
                    symbol,
                    %cached_start,
                    %cached_end,
                    "cached benchmark only partially covers the requested window"
                );
                return finish(symbol, rows, DataSource::Cache, true);
            }
        }
    }

    // Step 4: fail
    match fetch_error {
        Some(e) => Err(LoadError::DownloadFailed {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        }),
        None if offline => Err(LoadError::NoCachedDataOffline {
            symbol: symbol.to_string(),
        }),
        None => Err(LoadError::DownloadFailed {
            symbol: symbol.to_string(),
            reason: "data not cached and download failed".into(),
        }),
    }
}

fn finish(
    symbol: &str,
    rows: Vec<BenchmarkObservation>,
    source: DataSource,
    partial: bool,
) -> Result<LoadedBenchmark, LoadError> {
    Ok(LoadedBenchmark {
        series: BenchmarkSeries::new(symbol, rows)?,
        source,
        partial,
    })
}

/// BLAKE3 over universe rows (in file order) and price rows (in file order).
fn hash_inputs(universe: &[Instrument], prices: &[PriceObservation]) -> String {
    let mut hasher = blake3::Hasher::new();
    for inst in universe {
        hasher.update(inst.code.as_str().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(inst.name.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(inst.sector.as_bytes());
        hasher.update(b"\x1e");
    }
    for obs in prices {
        hasher.update(obs.code.as_str().as_bytes());
        hasher.update(obs.date.to_string().as_bytes());
        match obs.price {
            Some(p) => hasher.update(&p.to_le_bytes()),
            None => hasher.update(b"null"),
        };
    }
    hasher.finalize().to_hex().to_string()
}

/// Dataset hash for the run id: inputs plus the benchmark series actually used.
pub fn compute_dataset_hash(inputs: &LoadedInputs, benchmark: &LoadedBenchmark) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(inputs.inputs_hash.as_bytes());
    hasher.update(benchmark.series.symbol().as_bytes());
    for obs in benchmark.series.observations() {
        hasher.update(obs.date.to_string().as_bytes());
        match obs.close {
            Some(c) => hasher.update(&c.to_le_bytes()),
            None => hasher.update(b"null"),
        };
    }
    DatasetHash::from_hash(&hasher.finalize().to_hex())
}
