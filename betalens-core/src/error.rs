//! Fatal conditions of the analysis core.
//!
//! Anything in here aborts the run. Per-instrument problems (a missing price,
//! too few joined returns for one beta) are not errors; they are recorded in
//! the stage diagnostics and the run continues.

use chrono::NaiveDate;
use thiserror::Error;

use crate::table::Stage;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("universe is empty")]
    EmptyUniverse,

    #[error("duplicate instrument codes in universe: {}", codes.join(", "))]
    DuplicateCodes { codes: Vec<String> },

    #[error("no price data found on or before {target}")]
    NoPriceData { target: NaiveDate },

    #[error("benchmark series for '{symbol}' is empty")]
    EmptyBenchmark { symbol: String },

    #[error("no benchmark data for '{symbol}' on or before {target}")]
    NoBenchmarkData { symbol: String, target: NaiveDate },

    #[error(
        "insufficient benchmark returns for beta calculation: found {found}, need at least {required}"
    )]
    InsufficientBenchmarkReturns { found: usize, required: usize },

    #[error(
        "insufficient joined return observations across the universe: found {found}, need at least {required}"
    )]
    InsufficientJoinedReturns { found: usize, required: usize },

    #[error("no valid beta could be calculated for any of {instruments} instruments")]
    NoDefinedBeta { instruments: usize },

    #[error("weight policy '{policy}' returned {got} weights for {expected} instruments")]
    WeightCountMismatch {
        policy: String,
        expected: usize,
        got: usize,
    },

    #[error("stage '{attempted}' requires the table at '{required}', but it is at '{current}'")]
    StageOrder {
        attempted: Stage,
        required: Stage,
        current: Stage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_surface_the_precipitating_condition() {
        let err = AnalysisError::DuplicateCodes {
            codes: vec!["X1".into(), "X7".into()],
        };
        assert_eq!(
            err.to_string(),
            "duplicate instrument codes in universe: X1, X7"
        );

        let err = AnalysisError::NoPriceData {
            target: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        };
        assert!(err.to_string().contains("2023-12-31"));

        let err = AnalysisError::InsufficientBenchmarkReturns {
            found: 3,
            required: 5,
        };
        assert!(err.to_string().contains("found 3"));
    }
}
