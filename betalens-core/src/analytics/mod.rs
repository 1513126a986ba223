//! Pipeline stages over the [`PortfolioTable`](crate::table::PortfolioTable).

pub mod aggregate;
pub mod beta;
pub mod metric;
pub mod returns;
pub mod weighting;

pub use aggregate::{
    apply_weighted_metrics, MissingPolicy, PortfolioAggregator, PortfolioMetrics, SectorAggregate,
    UnknownPolicy,
};
pub use beta::{
    estimate_beta, join_returns, BetaConfig, BetaDiagnostics, BetaEstimator, BetaRefusal,
    UndefinedBeta, DEFAULT_MIN_BENCHMARK_RETURNS, DEFAULT_MIN_OBSERVATIONS,
};
pub use metric::{rank_by, Metric, UnknownMetric};
pub use returns::{abs_return, ReturnCalculator, ReturnDiagnostics};
pub use weighting::{
    assign_weights, CustomWeights, EqualWeight, FixedWeights, WeightPolicy, WeightSummary,
};
