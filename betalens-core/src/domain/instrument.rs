use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::InstrumentCode;

/// One row of the working universe table.
///
/// Identity columns (`code`, `name`, `sector`) come from the universe input.
/// Everything else is attached in place by the pipeline stages; `None` means
/// the value is undefined for this instrument (never NaN).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub code: InstrumentCode,
    pub name: String,
    pub sector: String,
    pub weight: f64,
    pub price_start: Option<f64>,
    pub date_start: Option<NaiveDate>,
    pub price_end: Option<f64>,
    pub date_end: Option<NaiveDate>,
    pub abs_return: Option<f64>,
    pub beta: Option<f64>,
    pub weighted_return: Option<f64>,
    pub weighted_beta: Option<f64>,
}

impl Instrument {
    pub fn new(
        code: impl Into<InstrumentCode>,
        name: impl Into<String>,
        sector: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            sector: sector.into(),
            weight: 0.0,
            price_start: None,
            date_start: None,
            price_end: None,
            date_end: None,
            abs_return: None,
            beta: None,
            weighted_return: None,
            weighted_beta: None,
        }
    }

    /// True when both matched prices are present.
    pub fn has_both_prices(&self) -> bool {
        self.price_start.is_some() && self.price_end.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instrument_has_no_derived_columns() {
        let inst = Instrument::new("X1", "Acme Ltd", "Industrials");
        assert_eq!(inst.code.as_str(), "X1");
        assert_eq!(inst.weight, 0.0);
        assert!(inst.abs_return.is_none());
        assert!(inst.beta.is_none());
        assert!(!inst.has_both_prices());
    }
}
