//! End-to-end runs of the analysis stages on small hand-built inputs.

use chrono::NaiveDate;

use betalens_core::analytics::{
    apply_weighted_metrics, assign_weights, rank_by, BetaEstimator, BetaRefusal, EqualWeight,
    Metric, MissingPolicy, PortfolioAggregator, ReturnCalculator,
};
use betalens_core::domain::{BenchmarkObservation, Instrument, InstrumentCode, PriceObservation};
use betalens_core::prices::{BenchmarkSeries, MatchCache, PriceIndex};
use betalens_core::{AnalysisError, PortfolioTable, Stage};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

const BENCH: [f64; 8] = [100.0, 101.0, 99.5, 102.0, 101.0, 103.5, 104.0, 102.5];

fn benchmark() -> BenchmarkSeries {
    BenchmarkSeries::new(
        "^NSEI",
        BENCH
            .iter()
            .enumerate()
            .map(|(i, c)| BenchmarkObservation::new(d(i as u32 + 1), Some(*c)))
            .collect(),
    )
    .unwrap()
}

/// X1 tracks the benchmark, X2 doubles its moves, X3 stops trading on day 4.
fn index() -> PriceIndex {
    let mut obs = Vec::new();
    let mut x2 = 50.0;
    for (i, c) in BENCH.iter().enumerate() {
        let date = d(i as u32 + 1);
        obs.push(PriceObservation::new("X1", date, Some(c / 10.0)));
        if i > 0 {
            x2 *= 1.0 + 2.0 * (BENCH[i] / BENCH[i - 1] - 1.0);
        }
        obs.push(PriceObservation::new("X2", date, Some(x2)));
        if i < 4 {
            obs.push(PriceObservation::new("X3", date, Some(20.0 + i as f64)));
        }
    }
    PriceIndex::new(obs)
}

fn universe() -> Vec<Instrument> {
    vec![
        Instrument::new("X1", "Index Tracker", "Financials"),
        Instrument::new("X2", "Leveraged Co", "Financials"),
        Instrument::new("X3", "Delisted Ltd", "Energy"),
    ]
}

#[test]
fn full_run_with_one_short_history() {
    let index = index();
    let mut table = PortfolioTable::new(universe()).unwrap();
    let mut cache = MatchCache::new(8);

    assign_weights(&mut table, &EqualWeight).unwrap();
    // X3 stopped trading on day 4; its end match is that last row.
    let returns = ReturnCalculator::new(d(1), d(8))
        .apply(&mut table, &index, &mut cache)
        .unwrap();
    assert!(returns.missing_start.is_empty());
    assert!(returns.missing_end.is_empty());
    assert_eq!(table.instruments()[2].date_end, Some(d(4)));

    let betas = BetaEstimator::default()
        .apply(&mut table, &index, &benchmark())
        .unwrap();
    assert_eq!(betas.computed, 2);
    assert_eq!(
        betas.undefined[0].reason,
        BetaRefusal::InsufficientObservations {
            found: 3,
            required: 5
        }
    );

    apply_weighted_metrics(&mut table).unwrap();
    assert_eq!(table.stage(), Stage::WeightedMetrics);

    let x1 = &table.instruments()[0];
    let x2 = &table.instruments()[1];
    assert!((x1.beta.unwrap() - 1.0).abs() < 1e-9);
    assert!((x2.beta.unwrap() - 2.0).abs() < 1e-9);
    assert!((x1.abs_return.unwrap() - (102.5 / 100.0 - 1.0)).abs() < 1e-12);

    let propagate = PortfolioAggregator::new(MissingPolicy::Propagate)
        .portfolio(&table)
        .unwrap();
    assert!(propagate.portfolio_return.is_some());
    assert_eq!(propagate.portfolio_beta, None);

    let excluded = PortfolioAggregator::new(MissingPolicy::Exclude)
        .portfolio(&table)
        .unwrap();
    assert!((excluded.portfolio_beta.unwrap() - 1.5).abs() < 1e-9);

    let sectors = PortfolioAggregator::new(MissingPolicy::Propagate)
        .sectors(&table)
        .unwrap();
    assert_eq!(sectors.len(), 2);
    assert_eq!(sectors[0].sector, "Energy");
    assert_eq!(sectors[0].sector_beta, None);
    assert!((sectors[1].sector_beta.unwrap() - 1.5).abs() < 1e-9);

    let top = rank_by(table.instruments(), Metric::Beta, 1);
    assert_eq!(top[0].code, InstrumentCode::new("X2"));
}

#[test]
fn instrument_without_end_price_gets_undefined_return() {
    // Three instruments, one of which has no row on or before the end date.
    let index = PriceIndex::new(vec![
        PriceObservation::new("A", d(1), Some(10.0)),
        PriceObservation::new("A", d(5), Some(11.0)),
        PriceObservation::new("B", d(1), Some(20.0)),
        PriceObservation::new("B", d(5), Some(19.0)),
        PriceObservation::new("C", d(1), Some(30.0)),
        PriceObservation::new("C", d(5), None),
    ]);
    let mut table = PortfolioTable::new(vec![
        Instrument::new("A", "", "S"),
        Instrument::new("B", "", "S"),
        Instrument::new("C", "", "S"),
    ])
    .unwrap();
    assign_weights(&mut table, &EqualWeight).unwrap();
    let diag = ReturnCalculator::new(d(1), d(5))
        .apply(&mut table, &index, &mut MatchCache::new(4))
        .unwrap();

    assert_eq!(table.len(), 3);
    let undefined: Vec<_> = table
        .instruments()
        .iter()
        .filter(|i| i.abs_return.is_none())
        .collect();
    assert_eq!(undefined.len(), 1);
    assert_eq!(diag.missing_end, vec![InstrumentCode::new("C")]);
}

#[test]
fn duplicate_code_fails_before_any_metric() {
    let err = PortfolioTable::new(vec![
        Instrument::new("X1", "", "S"),
        Instrument::new("X1", "", "S"),
    ])
    .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::DuplicateCodes {
            codes: vec!["X1".into()]
        }
    );
}

#[test]
fn out_of_order_stage_is_rejected() {
    let index = index();
    let mut table = PortfolioTable::new(universe()).unwrap();
    let err = BetaEstimator::default()
        .apply(&mut table, &index, &benchmark())
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::StageOrder {
            attempted: Stage::BetasEstimated,
            current: Stage::Validated,
            ..
        }
    ));
    assert!(apply_weighted_metrics(&mut table).is_err());
}
