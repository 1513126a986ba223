//! Data ingestion, benchmark providers and caching

pub mod cache;
pub mod csv_provider;
pub mod ingest;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use cache::{BenchmarkCache, CacheMeta, CacheStatus, CoverageResult};
pub use csv_provider::CsvBenchmarkProvider;
pub use ingest::{load_benchmark_csv, load_prices, parse_date, parse_price, PriceTable};
pub use provider::{BenchmarkProvider, DataError, DataSource, FetchResult};
pub use universe::{load_universe, sector_counts};
pub use yahoo::YahooProvider;
