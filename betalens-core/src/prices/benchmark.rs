//! Benchmark index series.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::series::{PricePoint, PriceSeries};
use crate::domain::{BenchmarkObservation, PriceMatch};
use crate::error::AnalysisError;

/// Default benchmark: NIFTY 50.
pub const DEFAULT_BENCHMARK: &str = "^NSEI";

/// Closing prices of the benchmark index, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSeries {
    symbol: String,
    series: PriceSeries,
}

impl BenchmarkSeries {
    /// Fails on an empty observation list.
    pub fn new(
        symbol: impl Into<String>,
        observations: Vec<BenchmarkObservation>,
    ) -> Result<Self, AnalysisError> {
        let symbol = symbol.into();
        if observations.is_empty() {
            return Err(AnalysisError::EmptyBenchmark { symbol });
        }
        let points = observations
            .into_iter()
            .map(|o| PricePoint {
                date: o.date,
                price: o.close,
            })
            .collect();
        Ok(Self {
            symbol,
            series: PriceSeries::from_points(points),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.series.first_date()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.series.last_date()
    }

    pub fn observations(&self) -> Vec<BenchmarkObservation> {
        self.series
            .points()
            .iter()
            .map(|p| BenchmarkObservation {
                date: p.date,
                close: p.price,
            })
            .collect()
    }

    /// Last close on or before `target`; fails when the series starts later.
    pub fn close_on_or_before(&self, target: NaiveDate) -> Result<PriceMatch, AnalysisError> {
        self.series
            .last_on_or_before(target)
            .ok_or_else(|| AnalysisError::NoBenchmarkData {
                symbol: self.symbol.clone(),
                target,
            })
    }

    /// Simple return of the benchmark between the closes matched at `start` and `end`.
    pub fn period_return(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, AnalysisError> {
        let s = self.close_on_or_before(start)?;
        let e = self.close_on_or_before(end)?;
        Ok(match (s.price, e.price) {
            (Some(s), Some(e)) if s != 0.0 => Some(e / s - 1.0),
            _ => None,
        })
    }

    /// Daily benchmark returns keyed by date. The first close has no return.
    pub fn daily_returns(&self) -> BTreeMap<NaiveDate, f64> {
        self.series.daily_returns().into_iter().collect()
    }

    /// True when the series spans the whole `[start, end]` window.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => first <= start && last >= end,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series() -> BenchmarkSeries {
        BenchmarkSeries::new(
            DEFAULT_BENCHMARK,
            vec![
                BenchmarkObservation::new(d(2024, 1, 2), Some(100.0)),
                BenchmarkObservation::new(d(2024, 1, 3), Some(102.0)),
                BenchmarkObservation::new(d(2024, 1, 4), Some(99.96)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn empty_benchmark_is_fatal() {
        let err = BenchmarkSeries::new("^NSEI", Vec::new()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::EmptyBenchmark {
                symbol: "^NSEI".into()
            }
        );
    }

    #[test]
    fn daily_returns_start_on_second_close() {
        let returns = series().daily_returns();
        assert_eq!(returns.len(), 2);
        assert!(!returns.contains_key(&d(2024, 1, 2)));
        assert!((returns[&d(2024, 1, 3)] - 0.02).abs() < 1e-12);
        assert!((returns[&d(2024, 1, 4)] + 0.02).abs() < 1e-12);
    }

    #[test]
    fn close_lookup_before_first_date_fails() {
        let s = series();
        assert!(s.close_on_or_before(d(2024, 1, 1)).is_err());
        let m = s.close_on_or_before(d(2024, 1, 10)).unwrap();
        assert_eq!(m.date, d(2024, 1, 4));
    }

    #[test]
    fn period_return_uses_matched_closes() {
        let r = series().period_return(d(2024, 1, 2), d(2024, 1, 3)).unwrap();
        assert!((r.unwrap() - 0.02).abs() < 1e-12);
        assert!(series().covers(d(2024, 1, 2), d(2024, 1, 4)));
        assert!(!series().covers(d(2024, 1, 1), d(2024, 1, 4)));
    }
}
