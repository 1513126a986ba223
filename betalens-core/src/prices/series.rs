//! Sorted single-instrument price series.
//!
//! Shared by [`PriceIndex`](super::PriceIndex) (one series per instrument) and
//! [`BenchmarkSeries`](super::BenchmarkSeries). Points keep their undefined
//! prices: a missing price is a row with `price == None`, never a dropped row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::PriceMatch;

/// One dated point in a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Option<f64>,
}

/// Date-ordered series with at most one point per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
    duplicates: usize,
}

impl PriceSeries {
    /// Build a series from points in any order.
    ///
    /// Points sharing a date collapse to the last one seen in input order.
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        // Stable sort keeps input order among equal dates.
        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        let mut duplicates = 0;
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => {
                    *last = point;
                    duplicates += 1;
                }
                _ => deduped.push(point),
            }
        }

        Self {
            points: deduped,
            duplicates,
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of input rows discarded because their date was already present.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// The most recent point dated on or before `target`.
    pub fn last_on_or_before(&self, target: NaiveDate) -> Option<PriceMatch> {
        let idx = self.points.partition_point(|p| p.date <= target);
        if idx == 0 {
            return None;
        }
        let point = self.points[idx - 1];
        Some(PriceMatch {
            date: point.date,
            price: point.price,
        })
    }

    /// Daily simple returns `p_t / p_{t-1} - 1`, keyed by the later date.
    ///
    /// The first point has no return. A return is produced only when both
    /// prices are defined and the earlier one is non-zero; missing prices are
    /// not padded from neighbours.
    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.points
            .windows(2)
            .filter_map(|w| {
                let prev = w[0].price?;
                let cur = w[1].price?;
                if prev == 0.0 {
                    return None;
                }
                let r = cur / prev - 1.0;
                r.is_finite().then_some((w[1].date, r))
            })
            .collect()
    }
}
