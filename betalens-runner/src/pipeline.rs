//! Staged run: load → validate → weight → returns → betas → weighted
//! metrics → aggregation.
//!
//! Each run owns its table, benchmark series and lookup cache. Stages run in
//! strict order; a fatal condition aborts with a [`RunError`], while
//! per-instrument problems are recorded in the report's diagnostics.

use thiserror::Error;

use betalens_core::analytics::{
    apply_weighted_metrics, assign_weights, BetaEstimator, PortfolioAggregator, ReturnCalculator,
};
use betalens_core::data::{sector_counts, BenchmarkCache, BenchmarkProvider};
use betalens_core::domain::RunId;
use betalens_core::prices::MatchCache;
use betalens_core::{AnalysisError, PortfolioTable};

use crate::config::{ConfigError, RunConfig, WeightingScheme};
use crate::data_loader::{
    compute_dataset_hash, load_benchmark, load_inputs, LoadError, LoadOptions, LoadedBenchmark,
    LoadedInputs,
};
use crate::observer::{Degradation, RunObserver, Step, TracingObserver};
use crate::report::{BenchmarkSummary, Diagnostics, RunReport, SCHEMA_VERSION};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// One configured run.
pub struct Pipeline {
    config: RunConfig,
    observer: Box<dyn RunObserver>,
}

impl Pipeline {
    /// Pipeline reporting through [`TracingObserver`].
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load inputs and benchmark, then analyze.
    pub fn run(
        &self,
        cache: &BenchmarkCache,
        provider: Option<&dyn BenchmarkProvider>,
        opts: &LoadOptions,
    ) -> Result<RunReport, RunError> {
        self.config.validate()?;

        self.observer.on_step_started(Step::LoadInputs);
        let inputs = load_inputs(&self.config.inputs.universe, &self.config.inputs.prices)?;
        self.observer.on_step_completed(
            Step::LoadInputs,
            &format!(
                "{} instruments, {} price rows",
                inputs.universe.len(),
                inputs.index.observation_count()
            ),
        );

        self.observer.on_step_started(Step::LoadBenchmark);
        let benchmark = load_benchmark(&self.config.run.benchmark, cache, provider, opts)?;
        self.observer.on_step_completed(
            Step::LoadBenchmark,
            &format!(
                "{} closes for {} from {}",
                benchmark.series.len(),
                benchmark.series.symbol(),
                benchmark.source.as_str()
            ),
        );

        self.analyze(inputs, benchmark)
    }

    /// Run every analysis stage over already-loaded data. No I/O.
    pub fn analyze(
        &self,
        inputs: LoadedInputs,
        benchmark: LoadedBenchmark,
    ) -> Result<RunReport, RunError> {
        let config = &self.config;
        config.validate()?;
        let dataset_hash = compute_dataset_hash(&inputs, &benchmark);
        let config_id = config.run_id()?;
        let run_id = RunId::new(config_id.clone(), dataset_hash.clone());

        let mut diagnostics = Diagnostics::default();
        collect_input_warnings(&inputs, &benchmark, &mut diagnostics.warnings);
        let LoadedInputs {
            universe, index, ..
        } = inputs;

        // ── Validate ──
        self.observer.on_step_started(Step::Validate);
        let mut table = PortfolioTable::new(universe)?;
        let unpriced = table
            .instruments()
            .iter()
            .filter(|i| index.series(&i.code).is_none())
            .count();
        if unpriced > 0 {
            diagnostics
                .warnings
                .push(format!("{unpriced} instruments have no rows in the price table"));
        }
        self.observer.on_step_completed(
            Step::Validate,
            &format!(
                "{} unique instruments in {} sectors",
                table.len(),
                sector_counts(table.instruments()).len()
            ),
        );

        // ── Weight ──
        self.observer.on_step_started(Step::Weight);
        if config.analysis.weighting == WeightingScheme::Fixed {
            let fixed = config.fixed_weights();
            for code in fixed.unknown(table.instruments()) {
                diagnostics
                    .warnings
                    .push(format!("weight configured for unknown instrument {code}"));
            }
            let unassigned = fixed.unassigned(table.instruments()).len();
            if unassigned > 0 {
                diagnostics
                    .warnings
                    .push(format!("{unassigned} instruments have no configured weight (0)"));
            }
        }
        let weights = assign_weights(&mut table, config.weight_policy().as_ref())?;
        if !weights.sums_to_one {
            diagnostics.warnings.push(format!(
                "{} weights sum to {:.6}, not 1",
                weights.policy, weights.total
            ));
        }
        self.observer.on_step_completed(
            Step::Weight,
            &format!("{} policy, total {:.6}", weights.policy, weights.total),
        );

        // ── Returns ──
        self.observer.on_step_started(Step::MatchReturns);
        let mut cache = MatchCache::new(config.analysis.lookup_cache_capacity);
        let (start, end) = (config.run.start_date, config.run.end_date);
        let returns = ReturnCalculator::new(start, end).apply(&mut table, &index, &mut cache)?;
        for code in &returns.missing_start {
            self.observer.on_degraded(code, &Degradation::MissingStartPrice);
        }
        for code in &returns.missing_end {
            self.observer.on_degraded(code, &Degradation::MissingEndPrice);
        }
        let series = &benchmark.series;
        let bench_start = series.close_on_or_before(start)?;
        let bench_end = series.close_on_or_before(end)?;
        let period_return = series.period_return(start, end)?;
        if !series.covers(start, end) {
            diagnostics.warnings.push(format!(
                "benchmark {} ends {}, before the analysis end date",
                series.symbol(),
                bench_end.date
            ));
        }
        self.observer.on_step_completed(
            Step::MatchReturns,
            &format!(
                "{} returns computed, {} missing start, {} missing end",
                returns.computed,
                returns.missing_start.len(),
                returns.missing_end.len()
            ),
        );

        // ── Betas ──
        self.observer.on_step_started(Step::EstimateBetas);
        let betas = BetaEstimator::new(config.beta_config()).apply(&mut table, &index, series)?;
        for undefined in &betas.undefined {
            self.observer
                .on_degraded(&undefined.code, &Degradation::UndefinedBeta(undefined.reason));
        }
        self.observer.on_step_completed(
            Step::EstimateBetas,
            &format!(
                "{} betas computed, {} undefined, {} joined observations",
                betas.computed,
                betas.undefined.len(),
                betas.joined_observations
            ),
        );

        // ── Weighted metrics ──
        self.observer.on_step_started(Step::WeightedMetrics);
        apply_weighted_metrics(&mut table)?;
        self.observer
            .on_step_completed(Step::WeightedMetrics, "weighted return and beta attached");

        // ── Aggregate ──
        self.observer.on_step_started(Step::Aggregate);
        let aggregator = PortfolioAggregator::new(config.analysis.missing_policy);
        let sectors = aggregator.sectors(&table)?;
        let portfolio = aggregator.portfolio(&table)?;
        self.observer.on_step_completed(
            Step::Aggregate,
            &format!(
                "{} sectors, portfolio return {}, portfolio beta {}",
                sectors.len(),
                fmt_opt(portfolio.portfolio_return),
                fmt_opt(portfolio.portfolio_beta)
            ),
        );

        diagnostics.missing_start = returns.missing_start;
        diagnostics.missing_end = returns.missing_end;
        diagnostics.undefined_betas = betas.undefined;
        diagnostics.benchmark_returns = betas.benchmark_returns;
        diagnostics.joined_observations = betas.joined_observations;

        let report = RunReport {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.hash(),
            config_id: config_id.0,
            dataset_hash: dataset_hash.0,
            generated_at: chrono::Local::now().naive_local(),
            config: config.clone(),
            instruments: table.into_instruments(),
            sectors,
            portfolio,
            benchmark: BenchmarkSummary {
                symbol: series.symbol().to_string(),
                source: benchmark.source,
                observations: series.len(),
                first_date: series.first_date(),
                last_date: series.last_date(),
                start: bench_start,
                end: bench_end,
                period_return,
                partial: benchmark.partial,
            },
            weights,
            diagnostics,
            lookup_cache: cache.stats(),
        };
        self.observer.on_run_completed(&report);
        Ok(report)
    }
}

fn collect_input_warnings(
    inputs: &LoadedInputs,
    benchmark: &LoadedBenchmark,
    warnings: &mut Vec<String>,
) {
    if inputs.coerced_prices > 0 {
        warnings.push(format!(
            "{} non-numeric prices treated as missing",
            inputs.coerced_prices
        ));
    }
    for (code, count) in inputs.index.duplicate_counts() {
        warnings.push(format!(
            "{code}: {count} duplicate dates collapsed to the last row"
        ));
    }
    if benchmark.partial {
        warnings.push(format!(
            "benchmark {} only partially covers the requested window",
            benchmark.series.symbol()
        ));
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.6}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use betalens_core::analytics::MissingPolicy;
    use betalens_core::data::DataSource;
    use betalens_core::domain::{BenchmarkObservation, Instrument, InstrumentCode, PriceObservation};
    use betalens_core::prices::{BenchmarkSeries, PriceIndex};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    const BENCH: [f64; 8] = [100.0, 101.0, 99.5, 102.0, 101.0, 103.5, 104.0, 102.5];

    fn inputs(universe: Vec<Instrument>) -> LoadedInputs {
        let mut obs = Vec::new();
        for (i, c) in BENCH.iter().enumerate() {
            obs.push(PriceObservation::new("A", d(i as u32 + 1), Some(c / 4.0)));
            obs.push(PriceObservation::new("B", d(i as u32 + 1), Some(60.0 - c / 10.0)));
        }
        LoadedInputs {
            universe,
            index: PriceIndex::new(obs),
            coerced_prices: 0,
            inputs_hash: "test".into(),
        }
    }

    fn benchmark() -> LoadedBenchmark {
        LoadedBenchmark {
            series: BenchmarkSeries::new(
                "^NSEI",
                BENCH
                    .iter()
                    .enumerate()
                    .map(|(i, c)| BenchmarkObservation::new(d(i as u32 + 1), Some(*c)))
                    .collect(),
            )
            .unwrap(),
            source: DataSource::CsvImport,
            partial: false,
        }
    }

    fn config() -> RunConfig {
        RunConfig::new(d(1), d(8), "u.csv", "p.csv")
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl RunObserver for std::sync::Arc<Recorder> {
        fn on_step_completed(&self, step: Step, _summary: &str) {
            self.events.lock().unwrap().push(step.to_string());
        }

        fn on_degraded(&self, code: &InstrumentCode, issue: &Degradation) {
            self.events.lock().unwrap().push(format!("{code}: {issue}"));
        }

        fn on_run_completed(&self, _report: &RunReport) {
            self.events.lock().unwrap().push("done".into());
        }
    }

    #[test]
    fn stages_report_in_order() {
        let recorder = std::sync::Arc::new(Recorder::default());
        let pipeline = Pipeline::new(config()).with_observer(recorder.clone());
        let universe = vec![
            Instrument::new("A", "Alpha", "IT"),
            Instrument::new("B", "Beta", "Energy"),
        ];
        pipeline.analyze(inputs(universe), benchmark()).unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "validate",
                "weight",
                "match_returns",
                "estimate_betas",
                "weighted_metrics",
                "aggregate",
                "done"
            ]
        );
    }

    #[test]
    fn report_carries_benchmark_and_rollups() {
        let universe = vec![
            Instrument::new("A", "Alpha", "IT"),
            Instrument::new("B", "Beta", "Energy"),
        ];
        let report = Pipeline::new(config())
            .with_observer(crate::observer::NullObserver)
            .analyze(inputs(universe), benchmark())
            .unwrap();

        assert_eq!(report.schema_version, SCHEMA_VERSION);
        assert_eq!(report.instruments.len(), 2);
        assert_eq!(report.sectors[0].sector, "Energy");
        assert!((report.benchmark.period_return.unwrap() - 0.025).abs() < 1e-12);
        assert_eq!(report.benchmark.start.date, d(1));
        // A tracks the benchmark exactly.
        assert!((report.instruments[0].beta.unwrap() - 1.0).abs() < 1e-9);
        let wb: f64 = report.instruments.iter().filter_map(|i| i.weighted_beta).sum();
        assert!((report.portfolio.portfolio_beta.unwrap() - wb).abs() < 1e-12);
        assert!(report.diagnostics.warnings.is_empty());
    }

    #[test]
    fn unpriced_instrument_degrades_but_run_succeeds() {
        let universe = vec![
            Instrument::new("A", "Alpha", "IT"),
            Instrument::new("Z", "Ghost", "IT"),
        ];
        let mut cfg = config();
        cfg.analysis.missing_policy = MissingPolicy::Exclude;
        let report = Pipeline::new(cfg)
            .with_observer(crate::observer::NullObserver)
            .analyze(inputs(universe), benchmark())
            .unwrap();

        assert_eq!(report.diagnostics.missing_start, vec![InstrumentCode::new("Z")]);
        assert_eq!(report.diagnostics.undefined_betas.len(), 1);
        assert!(report.portfolio.portfolio_beta.is_some());
        assert!(report.diagnostics.warnings[0].contains("no rows"));
    }

    #[test]
    fn duplicate_codes_abort_the_run() {
        let universe = vec![Instrument::new("A", "", "IT"), Instrument::new("A", "", "IT")];
        let err = Pipeline::new(config())
            .with_observer(crate::observer::NullObserver)
            .analyze(inputs(universe), benchmark())
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Analysis(AnalysisError::DuplicateCodes { .. })
        ));
    }

    #[test]
    fn window_before_any_price_is_fatal() {
        let mut cfg = config();
        cfg.run.start_date = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let universe = vec![Instrument::new("A", "", "IT")];
        let err = Pipeline::new(cfg)
            .with_observer(crate::observer::NullObserver)
            .analyze(inputs(universe), benchmark())
            .unwrap_err();
        assert!(matches!(err, RunError::Analysis(AnalysisError::NoPriceData { .. })));
    }
}
