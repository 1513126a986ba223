//! Named per-instrument metrics for ranking and summing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Weight,
    AbsReturn,
    Beta,
    WeightedReturn,
    WeightedBeta,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown metric '{0}' (expected one of: weight, abs_return, beta, weighted_return, weighted_beta)")]
pub struct UnknownMetric(pub String);

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Weight,
        Metric::AbsReturn,
        Metric::Beta,
        Metric::WeightedReturn,
        Metric::WeightedBeta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Weight => "weight",
            Metric::AbsReturn => "abs_return",
            Metric::Beta => "beta",
            Metric::WeightedReturn => "weighted_return",
            Metric::WeightedBeta => "weighted_beta",
        }
    }

    pub fn value(self, inst: &Instrument) -> Option<f64> {
        match self {
            Metric::Weight => Some(inst.weight),
            Metric::AbsReturn => inst.abs_return,
            Metric::Beta => inst.beta,
            Metric::WeightedReturn => inst.weighted_return,
            Metric::WeightedBeta => inst.weighted_beta,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// Top `n` instruments by `metric`, descending. Undefined values are skipped.
pub fn rank_by(instruments: &[Instrument], metric: Metric, n: usize) -> Vec<&Instrument> {
    let mut ranked: Vec<(&Instrument, f64)> = instruments
        .iter()
        .filter_map(|i| metric.value(i).map(|v| (i, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(n).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(code: &str, r: Option<f64>) -> Instrument {
        let mut i = Instrument::new(code, "", "S");
        i.abs_return = r;
        i
    }

    #[test]
    fn parses_names_leniently() {
        assert_eq!("abs_return".parse::<Metric>(), Ok(Metric::AbsReturn));
        assert_eq!("Weighted-Beta".parse::<Metric>(), Ok(Metric::WeightedBeta));
        assert!("sharpe".parse::<Metric>().is_err());
    }

    #[test]
    fn rank_skips_undefined_and_orders_descending() {
        let all = vec![
            inst("A", Some(0.1)),
            inst("B", None),
            inst("C", Some(0.3)),
            inst("D", Some(-0.2)),
        ];
        let top: Vec<_> = rank_by(&all, Metric::AbsReturn, 2)
            .into_iter()
            .map(|i| i.code.as_str())
            .collect();
        assert_eq!(top, vec!["C", "A"]);
        assert_eq!(rank_by(&all, Metric::AbsReturn, 10).len(), 3);
    }
}
