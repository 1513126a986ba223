//! BetaLens Core — domain types, price matching, returns, beta, aggregation.
//!
//! This crate holds the computation behind a portfolio beta report:
//! - Domain types (instruments, price and benchmark observations, run ids)
//! - Point-in-time price lookup ("last price on or before T")
//! - The staged universe table: weights → returns → betas → weighted metrics
//! - Sector and portfolio rollups under an explicit missing-value policy
//! - Benchmark providers (Yahoo Finance, CSV) and a Parquet cache

pub mod analytics;
pub mod data;
pub mod domain;
pub mod error;
pub mod lookup_cache;
pub mod prices;
pub mod table;

pub use error::AnalysisError;
pub use table::{PortfolioTable, Stage};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: public types can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Instrument>();
        require_sync::<domain::Instrument>();
        require_send::<domain::PriceObservation>();
        require_sync::<domain::PriceObservation>();
        require_send::<domain::BenchmarkObservation>();
        require_sync::<domain::BenchmarkObservation>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        // Table and prices
        require_send::<PortfolioTable>();
        require_sync::<PortfolioTable>();
        require_send::<prices::PriceIndex>();
        require_sync::<prices::PriceIndex>();
        require_send::<prices::BenchmarkSeries>();
        require_sync::<prices::BenchmarkSeries>();
        require_send::<prices::MatchCache>();
        require_sync::<prices::MatchCache>();

        // Stage outputs
        require_send::<analytics::ReturnDiagnostics>();
        require_sync::<analytics::ReturnDiagnostics>();
        require_send::<analytics::BetaDiagnostics>();
        require_sync::<analytics::BetaDiagnostics>();
        require_send::<analytics::SectorAggregate>();
        require_sync::<analytics::SectorAggregate>();
        require_send::<analytics::PortfolioMetrics>();
        require_sync::<analytics::PortfolioMetrics>();
        require_send::<analytics::FixedWeights>();
        require_sync::<analytics::FixedWeights>();

        // Errors
        require_send::<AnalysisError>();
        require_sync::<AnalysisError>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        // Data layer
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
        require_send::<data::BenchmarkCache>();
        require_sync::<data::BenchmarkCache>();
    }

    /// Providers are usable as trait objects.
    #[test]
    fn benchmark_provider_is_object_safe() {
        fn _check(provider: &dyn data::BenchmarkProvider) -> &str {
            provider.name()
        }
        let csv = data::CsvBenchmarkProvider::new("nifty.csv");
        assert_eq!(_check(&csv), "csv_import");
    }
}
