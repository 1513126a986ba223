//! Period returns from point-in-time matched prices.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::InstrumentCode;
use crate::error::AnalysisError;
use crate::prices::{MatchCache, PriceIndex};
use crate::table::{PortfolioTable, Stage};

/// Instruments that lacked a matched price at either end of the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnDiagnostics {
    pub missing_start: Vec<InstrumentCode>,
    pub missing_end: Vec<InstrumentCode>,
    pub computed: usize,
}

/// `end / start - 1`, undefined when either price is missing or start is zero.
pub fn abs_return(start: Option<f64>, end: Option<f64>) -> Option<f64> {
    match (start, end) {
        (Some(s), Some(e)) if s != 0.0 => {
            let r = e / s - 1.0;
            r.is_finite().then_some(r)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReturnCalculator {
    start: NaiveDate,
    end: NaiveDate,
}

impl ReturnCalculator {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Match start and end prices for every instrument and attach the return.
    ///
    /// Fails only when the whole price table has nothing on or before one of
    /// the two dates. An instrument with no match, or a matched row without a
    /// usable price, gets an undefined price and is listed in the diagnostics.
    pub fn apply(
        &self,
        table: &mut PortfolioTable,
        index: &PriceIndex,
        cache: &mut MatchCache,
    ) -> Result<ReturnDiagnostics, AnalysisError> {
        table.check_transition(Stage::ReturnsMatched)?;

        let start_set = index.match_cached(self.start, cache)?;
        let end_set = index.match_cached(self.end, cache)?;

        let mut diag = ReturnDiagnostics::default();
        for inst in table.instruments_mut() {
            let start = start_set.get(&inst.code);
            let end = end_set.get(&inst.code);

            inst.date_start = start.map(|m| m.date);
            inst.price_start = start.and_then(|m| m.price);
            inst.date_end = end.map(|m| m.date);
            inst.price_end = end.and_then(|m| m.price);
            inst.abs_return = abs_return(inst.price_start, inst.price_end);

            if inst.price_start.is_none() {
                diag.missing_start.push(inst.code.clone());
            }
            if inst.price_end.is_none() {
                diag.missing_end.push(inst.code.clone());
            }
            if inst.abs_return.is_some() {
                diag.computed += 1;
            }
        }
        table.mark(Stage::ReturnsMatched);

        if !diag.missing_start.is_empty() {
            warn!(
                count = diag.missing_start.len(),
                date = %self.start,
                "instruments missing start price"
            );
        }
        if !diag.missing_end.is_empty() {
            warn!(
                count = diag.missing_end.len(),
                date = %self.end,
                "instruments missing end price"
            );
        }
        debug!(computed = diag.computed, "returns computed");

        Ok(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::weighting::{assign_weights, EqualWeight};
    use crate::domain::{Instrument, PriceObservation};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn weighted_table(codes: &[&str]) -> PortfolioTable {
        let mut t =
            PortfolioTable::new(codes.iter().map(|c| Instrument::new(*c, "", "S")).collect())
                .unwrap();
        assign_weights(&mut t, &EqualWeight).unwrap();
        t
    }

    #[test]
    fn abs_return_edge_cases() {
        assert!((abs_return(Some(100.0), Some(110.0)).unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(abs_return(None, Some(1.0)), None);
        assert_eq!(abs_return(Some(1.0), None), None);
        assert_eq!(abs_return(Some(0.0), Some(1.0)), None);
    }

    #[test]
    fn matches_last_row_on_or_before_each_date() {
        let index = PriceIndex::new(vec![
            PriceObservation::new("X1", d(2024, 1, 1), Some(10.0)),
            PriceObservation::new("X1", d(2024, 1, 5), Some(12.0)),
        ]);
        let mut t = weighted_table(&["X1"]);
        let mut cache = MatchCache::new(4);
        let diag = ReturnCalculator::new(d(2024, 1, 3), d(2024, 1, 10))
            .apply(&mut t, &index, &mut cache)
            .unwrap();

        let x1 = &t.instruments()[0];
        assert_eq!(x1.date_start, Some(d(2024, 1, 1)));
        assert_eq!(x1.price_start, Some(10.0));
        assert_eq!(x1.date_end, Some(d(2024, 1, 5)));
        assert_eq!(x1.price_end, Some(12.0));
        assert!((x1.abs_return.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(diag.computed, 1);
        assert!(diag.missing_start.is_empty());
        assert_eq!(t.stage(), Stage::ReturnsMatched);
    }

    #[test]
    fn instrument_without_rows_is_reported_missing() {
        let index = PriceIndex::new(vec![
            PriceObservation::new("X1", d(2024, 1, 1), Some(10.0)),
            PriceObservation::new("X1", d(2024, 1, 5), Some(12.0)),
            PriceObservation::new("X2", d(2024, 1, 4), Some(7.0)),
        ]);
        let mut t = weighted_table(&["X1", "X2", "X3"]);
        let mut cache = MatchCache::new(4);
        let diag = ReturnCalculator::new(d(2024, 1, 2), d(2024, 1, 5))
            .apply(&mut t, &index, &mut cache)
            .unwrap();

        assert_eq!(
            diag.missing_start,
            vec![InstrumentCode::new("X2"), InstrumentCode::new("X3")]
        );
        assert_eq!(diag.missing_end, vec![InstrumentCode::new("X3")]);
        assert_eq!(t.instruments()[1].abs_return, None);
        assert_eq!(t.instruments()[1].price_end, Some(7.0));
        assert_eq!(t.instruments()[2].date_end, None);
    }

    #[test]
    fn matched_row_with_undefined_price_is_missing() {
        let index = PriceIndex::new(vec![
            PriceObservation::new("X1", d(2024, 1, 1), None),
            PriceObservation::new("X1", d(2024, 1, 5), Some(12.0)),
        ]);
        let mut t = weighted_table(&["X1"]);
        let mut cache = MatchCache::new(4);
        let diag = ReturnCalculator::new(d(2024, 1, 1), d(2024, 1, 5))
            .apply(&mut t, &index, &mut cache)
            .unwrap();
        let x1 = &t.instruments()[0];
        assert_eq!(x1.date_start, Some(d(2024, 1, 1)));
        assert_eq!(x1.price_start, None);
        assert_eq!(diag.missing_start, vec![InstrumentCode::new("X1")]);
    }

    #[test]
    fn start_before_all_data_is_fatal() {
        let index = PriceIndex::new(vec![PriceObservation::new("X1", d(2024, 1, 5), Some(1.0))]);
        let mut t = weighted_table(&["X1"]);
        let mut cache = MatchCache::new(4);
        let err = ReturnCalculator::new(d(2024, 1, 1), d(2024, 1, 5))
            .apply(&mut t, &index, &mut cache)
            .unwrap_err();
        assert_eq!(err, AnalysisError::NoPriceData { target: d(2024, 1, 1) });
        assert_eq!(t.stage(), Stage::Weighted);
    }

    #[test]
    fn requires_weighted_table() {
        let index = PriceIndex::new(vec![PriceObservation::new("X1", d(2024, 1, 1), Some(1.0))]);
        let mut t = PortfolioTable::new(vec![Instrument::new("X1", "", "S")]).unwrap();
        let mut cache = MatchCache::new(4);
        assert!(matches!(
            ReturnCalculator::new(d(2024, 1, 1), d(2024, 1, 1)).apply(&mut t, &index, &mut cache),
            Err(AnalysisError::StageOrder { .. })
        ));
    }
}
