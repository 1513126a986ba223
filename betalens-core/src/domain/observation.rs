use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::InstrumentCode;

/// A single (instrument, date, price) row from the price table.
///
/// `price` is `None` when the source value was missing or non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub code: InstrumentCode,
    pub date: NaiveDate,
    pub price: Option<f64>,
}

impl PriceObservation {
    pub fn new(code: impl Into<InstrumentCode>, date: NaiveDate, price: Option<f64>) -> Self {
        Self {
            code: code.into(),
            date,
            price: price.filter(|p| p.is_finite()),
        }
    }
}

/// A (date, close) row of the benchmark series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkObservation {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl BenchmarkObservation {
    pub fn new(date: NaiveDate, close: Option<f64>) -> Self {
        Self {
            date,
            close: close.filter(|c| c.is_finite()),
        }
    }
}

/// Result of a last-on-or-before lookup: the matched row's date and price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceMatch {
    pub date: NaiveDate,
    pub price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_prices_become_undefined() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(PriceObservation::new("X1", d, Some(f64::NAN)).price, None);
        assert_eq!(PriceObservation::new("X1", d, Some(f64::INFINITY)).price, None);
        assert_eq!(PriceObservation::new("X1", d, Some(10.0)).price, Some(10.0));
        assert_eq!(BenchmarkObservation::new(d, Some(f64::NAN)).close, None);
    }
}
