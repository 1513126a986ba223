//! Per-instrument price index with last-on-or-before matching.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use super::series::{PricePoint, PriceSeries};
use crate::domain::{InstrumentCode, PriceMatch, PriceObservation};
use crate::error::AnalysisError;
use crate::lookup_cache::LookupCache;

/// Memo of resolved match sets keyed by target date.
pub type MatchCache = LookupCache<NaiveDate, Arc<MatchSet>>;

/// Price observations grouped by instrument, each group sorted by date.
///
/// Built from every observation in the price table, including instruments
/// that are not in the universe.
#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    series: BTreeMap<InstrumentCode, PriceSeries>,
    observation_count: usize,
}

/// The last row on or before one target date, for every instrument that has one.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSet {
    pub target: NaiveDate,
    matches: BTreeMap<InstrumentCode, PriceMatch>,
}

impl MatchSet {
    pub fn get(&self, code: &InstrumentCode) -> Option<&PriceMatch> {
        self.matches.get(code)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentCode, &PriceMatch)> {
        self.matches.iter()
    }
}

impl PriceIndex {
    pub fn new(observations: impl IntoIterator<Item = PriceObservation>) -> Self {
        let mut grouped: BTreeMap<InstrumentCode, Vec<PricePoint>> = BTreeMap::new();
        let mut observation_count = 0;
        for obs in observations {
            observation_count += 1;
            grouped.entry(obs.code).or_default().push(PricePoint {
                date: obs.date,
                price: obs.price,
            });
        }

        let series = grouped
            .into_iter()
            .map(|(code, points)| (code, PriceSeries::from_points(points)))
            .collect();

        Self {
            series,
            observation_count,
        }
    }

    /// Number of instruments with at least one observation.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of input rows, before de-duplication.
    pub fn observation_count(&self) -> usize {
        self.observation_count
    }

    pub fn series(&self, code: &InstrumentCode) -> Option<&PriceSeries> {
        self.series.get(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &InstrumentCode> {
        self.series.keys()
    }

    /// Instruments whose input carried more than one row per date.
    pub fn duplicate_counts(&self) -> Vec<(InstrumentCode, usize)> {
        self.series
            .iter()
            .filter(|(_, s)| s.duplicates() > 0)
            .map(|(code, s)| (code.clone(), s.duplicates()))
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.series.values().filter_map(|s| s.first_date()).min()?;
        let last = self.series.values().filter_map(|s| s.last_date()).max()?;
        Some((first, last))
    }

    pub fn lookup(&self, code: &InstrumentCode, target: NaiveDate) -> Option<PriceMatch> {
        self.series.get(code)?.last_on_or_before(target)
    }

    /// Resolve the last row on or before `target` for every instrument.
    ///
    /// Fails when no row in the whole table is dated on or before `target`.
    pub fn match_on_or_before(&self, target: NaiveDate) -> Result<MatchSet, AnalysisError> {
        let matches: BTreeMap<_, _> = self
            .series
            .iter()
            .filter_map(|(code, s)| s.last_on_or_before(target).map(|m| (code.clone(), m)))
            .collect();

        if matches.is_empty() {
            return Err(AnalysisError::NoPriceData { target });
        }

        Ok(MatchSet { target, matches })
    }

    /// [`match_on_or_before`](Self::match_on_or_before) through a memo.
    pub fn match_cached(
        &self,
        target: NaiveDate,
        cache: &mut MatchCache,
    ) -> Result<Arc<MatchSet>, AnalysisError> {
        cache.get_or_try_insert_with(target, || self.match_on_or_before(target).map(Arc::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_index() -> PriceIndex {
        PriceIndex::new(vec![
            PriceObservation::new("X1", d(2024, 1, 5), Some(12.0)),
            PriceObservation::new("X1", d(2024, 1, 1), Some(10.0)),
            PriceObservation::new("X2", d(2024, 1, 3), Some(50.0)),
            PriceObservation::new("X2", d(2024, 1, 3), Some(51.0)),
        ])
    }

    #[test]
    fn groups_and_counts_observations() {
        let index = sample_index();
        assert_eq!(index.len(), 2);
        assert_eq!(index.observation_count(), 4);
        assert_eq!(
            index.duplicate_counts(),
            vec![(InstrumentCode::new("X2"), 1)]
        );
        assert_eq!(index.date_range(), Some((d(2024, 1, 1), d(2024, 1, 5))));
    }

    #[test]
    fn match_set_omits_instruments_without_earlier_rows() {
        let index = sample_index();
        let set = index.match_on_or_before(d(2024, 1, 2)).unwrap();
        assert_eq!(set.len(), 1);
        let m = set.get(&InstrumentCode::new("X1")).unwrap();
        assert_eq!((m.date, m.price), (d(2024, 1, 1), Some(10.0)));
        assert!(set.get(&InstrumentCode::new("X2")).is_none());
    }

    #[test]
    fn no_rows_before_target_is_fatal() {
        let index = sample_index();
        let err = index.match_on_or_before(d(2023, 12, 31)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::NoPriceData {
                target: d(2023, 12, 31)
            }
        );
    }

    #[test]
    fn empty_index_is_fatal() {
        let index = PriceIndex::new(Vec::new());
        assert!(index.match_on_or_before(d(2024, 1, 1)).is_err());
    }

    #[test]
    fn cached_match_is_reused() {
        let index = sample_index();
        let mut cache = MatchCache::new(4);
        let a = index.match_cached(d(2024, 1, 5), &mut cache).unwrap();
        let b = index.match_cached(d(2024, 1, 5), &mut cache).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }
}
