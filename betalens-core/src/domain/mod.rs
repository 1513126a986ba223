//! Domain types for BetaLens

pub mod ids;
pub mod instrument;
pub mod observation;

pub use ids::{ConfigId, DatasetHash, InstrumentCode, RunId};
pub use instrument::Instrument;
pub use observation::{BenchmarkObservation, PriceMatch, PriceObservation};
