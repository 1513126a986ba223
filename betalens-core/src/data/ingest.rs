//! CSV ingestion for the price table and benchmark exports.
//!
//! Files are read through polars with schema inference disabled, so every
//! column arrives as text and coercion rules stay in one place: a price that
//! doesn't parse becomes undefined, a date that doesn't parse is an error
//! naming the row.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, warn};

use super::provider::DataError;
use crate::domain::{BenchmarkObservation, PriceObservation};

pub const CODE_HEADERS: &[&str] = &["accord_code", "code", "instrument_code", "symbol"];
pub const DATE_HEADERS: &[&str] = &["date"];
pub const PRICE_HEADERS: &[&str] = &["price", "close", "adj_close"];
pub const CLOSE_HEADERS: &[&str] = &["close", "adj_close", "price"];

// Numeric day/month orders are ambiguous and not accepted.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Rows read from a price table file.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub observations: Vec<PriceObservation>,
    /// Non-empty price cells that were not numeric.
    pub coerced: usize,
}

/// Read a CSV with every column as text.
pub fn read_csv_as_text(path: &Path) -> Result<DataFrame, DataError> {
    LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| DataError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Header comparison key: case-insensitive, spaces and dashes as underscores.
pub fn header_key(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

/// First column whose header matches one of `aliases`, in alias order.
pub fn find_column<'a>(df: &'a DataFrame, aliases: &[&str]) -> Option<&'a Column> {
    aliases.iter().find_map(|alias| {
        let want = header_key(alias);
        df.get_columns()
            .iter()
            .find(|c| header_key(c.name().as_str()) == want)
    })
}

pub(crate) fn text_column<'a>(
    df: &'a DataFrame,
    path: &Path,
    aliases: &[&str],
) -> Result<&'a StringChunked, DataError> {
    let column = find_column(df, aliases).ok_or_else(|| DataError::MissingColumn {
        path: path.display().to_string(),
        column: aliases.first().copied().unwrap_or_default().to_string(),
    })?;
    column.str().map_err(|e| DataError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Parse a date cell. Accepts ISO dates, timestamps, and `15-Mar-2024` style dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a price cell; anything non-numeric or non-finite is undefined.
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|p| p.is_finite())
}

fn is_blank(raw: Option<&str>) -> bool {
    raw.map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn required_date(path: &Path, row: usize, raw: Option<&str>) -> Result<NaiveDate, DataError> {
    let value = raw.unwrap_or_default();
    parse_date(value).ok_or_else(|| DataError::InvalidDate {
        path: path.display().to_string(),
        // 1-based, counting the header line.
        row: row + 2,
        value: value.to_string(),
    })
}

/// Load `(code, date, price)` rows.
pub fn load_prices(path: &Path) -> Result<PriceTable, DataError> {
    let df = read_csv_as_text(path)?;
    let codes = text_column(&df, path, CODE_HEADERS)?;
    let dates = text_column(&df, path, DATE_HEADERS)?;
    let prices = text_column(&df, path, PRICE_HEADERS)?;

    let mut table = PriceTable::default();
    for row in 0..df.height() {
        let code = codes.get(row).map(str::trim).unwrap_or_default();
        if code.is_empty() {
            return Err(DataError::EmptyCode {
                path: path.display().to_string(),
                row: row + 2,
            });
        }
        let date = required_date(path, row, dates.get(row))?;
        let raw_price = prices.get(row);
        let price = parse_price(raw_price);
        if price.is_none() && !is_blank(raw_price) {
            table.coerced += 1;
        }
        table
            .observations
            .push(PriceObservation::new(code, date, price));
    }

    if table.coerced > 0 {
        warn!(
            path = %path.display(),
            count = table.coerced,
            "non-numeric prices coerced to undefined"
        );
    }
    debug!(path = %path.display(), rows = table.observations.len(), "price table loaded");

    Ok(table)
}

/// Load `(date, close)` rows of a benchmark export.
pub fn load_benchmark_csv(path: &Path) -> Result<Vec<BenchmarkObservation>, DataError> {
    let df = read_csv_as_text(path)?;
    let dates = text_column(&df, path, DATE_HEADERS)?;
    let closes = text_column(&df, path, CLOSE_HEADERS)?;

    (0..df.height())
        .map(|row| {
            let date = required_date(path, row, dates.get(row))?;
            Ok(BenchmarkObservation::new(date, parse_price(closes.get(row))))
        })
        .collect()
}
