//! Benchmark provider backed by a local CSV export of index closes.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::ingest::load_benchmark_csv;
use super::provider::{BenchmarkProvider, DataError, DataSource, FetchResult};

/// Reads `date,close` rows from a file and serves the requested window.
#[derive(Debug, Clone)]
pub struct CsvBenchmarkProvider {
    path: PathBuf,
}

impl CsvBenchmarkProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BenchmarkProvider for CsvBenchmarkProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let observations: Vec<_> = load_benchmark_csv(&self.path)?
            .into_iter()
            .filter(|o| o.date >= start && o.date <= end)
            .collect();

        if observations.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        Ok(FetchResult {
            symbol: symbol.to_string(),
            observations,
            source: DataSource::CsvImport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn serves_only_the_requested_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nifty.csv");
        fs::write(
            &path,
            "Date,Close\n2024-01-01,100\n2024-01-02,101\n2024-01-03,102\n",
        )
        .unwrap();

        let provider = CsvBenchmarkProvider::new(&path);
        let result = provider
            .fetch(
                "^NSEI",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            )
            .unwrap();
        assert_eq!(result.observations.len(), 2);
        assert_eq!(result.source, DataSource::CsvImport);

        let miss = provider.fetch(
            "^NSEI",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        );
        assert!(matches!(miss, Err(DataError::SymbolNotFound { .. })));
    }
}
