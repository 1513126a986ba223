//! Report export — JSON, CSV, and Markdown artifact generation.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: instrument, sector and summary tables plus diagnostic lists
//! - **Markdown**: human-readable single-run report
//!
//! Undefined values are written as empty CSV cells and as `n/a` in Markdown.
//! Persisted manifests carry a `schema_version`; unknown versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use betalens_core::analytics::SectorAggregate;
use betalens_core::domain::{Instrument, InstrumentCode};

use crate::report::{RunReport, SCHEMA_VERSION};

pub const STOCK_LEVEL_CSV: &str = "stock_level.csv";
pub const AGGREGATES_CSV: &str = "aggregates.csv";
pub const SUMMARY_CSV: &str = "summary.csv";
pub const MISSING_START_CSV: &str = "missing_start_prices.csv";
pub const MISSING_END_CSV: &str = "missing_end_prices.csv";
pub const NAN_BETA_CSV: &str = "nan_beta_stocks.csv";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const REPORT_MD: &str = "report.md";

// ─── Formatting ─────────────────────────────────────────────────────

fn price(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_default()
}

fn ratio(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn date(v: Option<NaiveDate>) -> String {
    v.map(|d| d.to_string()).unwrap_or_default()
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{:.2}%", x * 100.0))
}

fn num(v: Option<f64>, places: usize) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.places$}"))
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunReport` to pretty JSON.
pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per instrument, in universe order.
///
/// Columns: code, name, sector, weight, price_start, date_start, price_end,
/// date_end, abs_return, beta, weighted_return, weighted_beta
pub fn export_stock_level_csv(instruments: &[Instrument]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "code",
        "name",
        "sector",
        "weight",
        "price_start",
        "date_start",
        "price_end",
        "date_end",
        "abs_return",
        "beta",
        "weighted_return",
        "weighted_beta",
    ])?;
    for i in instruments {
        wtr.write_record([
            i.code.to_string(),
            i.name.clone(),
            i.sector.clone(),
            format!("{:.6}", i.weight),
            price(i.price_start),
            date(i.date_start),
            price(i.price_end),
            date(i.date_end),
            ratio(i.abs_return),
            ratio(i.beta),
            ratio(i.weighted_return),
            ratio(i.weighted_beta),
        ])?;
    }
    finish(wtr)
}

/// One row per sector.
pub fn export_aggregates_csv(sectors: &[SectorAggregate]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "sector",
        "instruments",
        "weight",
        "weighted_return",
        "sum_weighted_beta",
        "sector_beta",
    ])?;
    for s in sectors {
        wtr.write_record([
            s.sector.clone(),
            s.instruments.to_string(),
            format!("{:.6}", s.weight),
            ratio(s.weighted_return),
            ratio(s.sum_weighted_beta),
            ratio(s.sector_beta),
        ])?;
    }
    finish(wtr)
}

/// Portfolio and benchmark figures as `metric,value` rows.
pub fn export_summary_csv(report: &RunReport) -> Result<String> {
    let b = &report.benchmark;
    let rows = [
        ("portfolio_return", ratio(report.portfolio.portfolio_return)),
        ("portfolio_beta", ratio(report.portfolio.portfolio_beta)),
        ("missing_policy", report.portfolio.policy.to_string()),
        ("benchmark", b.symbol.clone()),
        ("benchmark_start_date", b.start.date.to_string()),
        ("benchmark_start_close", price(b.start.price)),
        ("benchmark_end_date", b.end.date.to_string()),
        ("benchmark_end_close", price(b.end.price)),
        ("benchmark_return", ratio(b.period_return)),
        ("instruments", report.instruments.len().to_string()),
        ("run_id", report.run_id.clone()),
    ];

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        wtr.write_record([metric, value.as_str()])?;
    }
    finish(wtr)
}

/// `code,name` for each listed instrument.
pub fn export_missing_csv(report: &RunReport, codes: &[InstrumentCode]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["code", "name"])?;
    for inst in report.instruments_for(codes) {
        wtr.write_record([inst.code.as_str(), inst.name.as_str()])?;
    }
    finish(wtr)
}

/// `code,name,reason` for each instrument without a beta.
pub fn export_nan_beta_csv(report: &RunReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["code", "name", "reason"])?;
    for u in &report.diagnostics.undefined_betas {
        let name = report
            .instrument(&u.code)
            .map(|i| i.name.as_str())
            .unwrap_or_default();
        wtr.write_record([u.code.as_str(), name, u.reason.to_string().as_str()])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a run.
///
/// Creates a directory named `{label}_{timestamp}/` under `output_dir`
/// containing the three report tables, the diagnostic lists,
/// `manifest.json` and `report.md`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.config.label(),
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        (MANIFEST_JSON, export_json(report)?),
        (STOCK_LEVEL_CSV, export_stock_level_csv(&report.instruments)?),
        (AGGREGATES_CSV, export_aggregates_csv(&report.sectors)?),
        (SUMMARY_CSV, export_summary_csv(report)?),
        (
            MISSING_START_CSV,
            export_missing_csv(report, &report.diagnostics.missing_start)?,
        ),
        (
            MISSING_END_CSV,
            export_missing_csv(report, &report.diagnostics.missing_end)?,
        ),
        (NAN_BETA_CSV, export_nan_beta_csv(report)?),
        (REPORT_MD, generate_report(report)),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load a `RunReport` from an artifact directory's manifest.json.
///
/// Rejects unknown schema versions.
pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let manifest_path = dir.join(MANIFEST_JSON);
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single run.
pub fn generate_report(report: &RunReport) -> String {
    let mut md = String::with_capacity(4096);
    let cfg = &report.config;
    let b = &report.benchmark;

    md.push_str("# Portfolio Beta Report\n\n");

    // Metadata
    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        cfg.run.start_date, cfg.run.end_date
    ));
    md.push_str(&format!(
        "| Benchmark | {} ({}) |\n",
        b.symbol,
        b.source.as_str()
    ));
    md.push_str(&format!("| Instruments | {} |\n", report.instruments.len()));
    md.push_str(&format!("| Weighting | {} |\n", report.weights.policy));
    md.push_str(&format!(
        "| Missing Values | {} |\n",
        report.portfolio.policy
    ));
    md.push_str(&format!("| Run ID | {} |\n", report.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    md.push('\n');

    // Portfolio
    md.push_str("## Portfolio\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Portfolio Return | {} |\n",
        pct(report.portfolio.portfolio_return)
    ));
    md.push_str(&format!(
        "| Portfolio Beta | {} |\n",
        num(report.portfolio.portfolio_beta, 3)
    ));
    md.push_str(&format!(
        "| Benchmark Return | {} |\n",
        pct(b.period_return)
    ));
    md.push_str(&format!(
        "| Benchmark Start | {} on {} |\n",
        num(b.start.price, 2),
        b.start.date
    ));
    md.push_str(&format!(
        "| Benchmark End | {} on {} |\n",
        num(b.end.price, 2),
        b.end.date
    ));
    md.push('\n');

    // Sectors
    md.push_str("## Sectors\n\n");
    md.push_str("| Sector | Instruments | Weight | Weighted Return | Sector Beta |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: |\n");
    for s in &report.sectors {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            s.sector,
            s.instruments,
            pct(Some(s.weight)),
            pct(s.weighted_return),
            num(s.sector_beta, 3)
        ));
    }
    md.push('\n');

    // Diagnostics
    let diag = &report.diagnostics;
    md.push_str("## Diagnostics\n\n");
    md.push_str("| Check | Count |\n");
    md.push_str("| --- | ---: |\n");
    md.push_str(&format!(
        "| Missing Start Price | {} |\n",
        diag.missing_start.len()
    ));
    md.push_str(&format!(
        "| Missing End Price | {} |\n",
        diag.missing_end.len()
    ));
    md.push_str(&format!(
        "| Undefined Beta | {} |\n",
        diag.undefined_betas.len()
    ));
    md.push_str(&format!(
        "| Benchmark Daily Returns | {} |\n",
        diag.benchmark_returns
    ));
    md.push_str(&format!(
        "| Joined Observations | {} |\n",
        diag.joined_observations
    ));
    md.push_str(&format!(
        "| Lookup Cache Hit Rate | {:.1}% |\n",
        report.lookup_cache.hit_rate() * 100.0
    ));
    md.push('\n');

    if !diag.undefined_betas.is_empty() {
        md.push_str("Undefined betas:\n\n");
        for u in &diag.undefined_betas {
            md.push_str(&format!("- {}: {}\n", u.code, u.reason));
        }
        md.push('\n');
    }

    // Data Quality
    if !diag.warnings.is_empty() {
        md.push_str("## Data Quality\n\n");
        for warn in &diag.warnings {
            md.push_str(&format!("- {warn}\n"));
        }
        md.push('\n');
    }

    md
}
