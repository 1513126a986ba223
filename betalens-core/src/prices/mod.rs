//! Price storage and point-in-time lookup.

pub mod benchmark;
pub mod index;
pub mod series;

pub use benchmark::{BenchmarkSeries, DEFAULT_BENCHMARK};
pub use index::{MatchCache, MatchSet, PriceIndex};
pub use series::{PricePoint, PriceSeries};
