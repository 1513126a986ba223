//! BetaLens CLI — portfolio beta runs, benchmark download, and cache status.
//!
//! Commands:
//! - `run` — execute a run from a TOML config file and/or command-line flags
//! - `download` — fetch a benchmark series from Yahoo Finance and cache it as Parquet
//! - `cache status` — report cached symbols, date ranges and sizes

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use betalens_core::analytics::{rank_by, Metric, MissingPolicy};
use betalens_core::data::{BenchmarkCache, BenchmarkProvider, YahooProvider};
use betalens_core::prices::DEFAULT_BENCHMARK;
use betalens_runner::{
    default_provider, load_benchmark, save_artifacts, LoadOptions, Pipeline, RunConfig, RunReport,
};

#[derive(Parser)]
#[command(
    name = "betalens",
    about = "BetaLens CLI — portfolio returns and beta against a market benchmark"
)]
struct Cli {
    /// Also write logs to this file (no ANSI colours).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute returns, betas and rollups, then export the report.
    Run(RunArgs),
    /// Download a benchmark series from Yahoo Finance and cache as Parquet.
    Download {
        /// Benchmark symbol (e.g., ^NSEI).
        #[arg(default_value = DEFAULT_BENCHMARK)]
        symbol: String,

        /// Start date (YYYY-MM-DD). Defaults to 5 years ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to a TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Universe CSV (code, name, sector).
    #[arg(long)]
    universe: Option<PathBuf>,

    /// Price table CSV (code, date, price).
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Benchmark symbol. Defaults to ^NSEI.
    #[arg(long)]
    benchmark: Option<String>,

    /// Read benchmark closes from a CSV export instead of Yahoo Finance.
    #[arg(long)]
    benchmark_csv: Option<PathBuf>,

    /// How undefined values enter sums: propagate, exclude, zero-fill.
    #[arg(long)]
    missing_policy: Option<String>,

    /// Artifact directory prefix.
    #[arg(long)]
    label: Option<String>,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Re-fetch the benchmark even if cached.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Cache directory. Overrides the config's output.cache_dir.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output directory for artifacts. Overrides the config's output.dir.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print the top instruments by this metric (weight, abs_return, beta,
    /// weighted_return, weighted_beta).
    #[arg(long)]
    rank_by: Option<String>,

    /// Rows to print with --rank-by.
    #[arg(long, default_value_t = 10)]
    top: usize,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached symbols, date ranges and sizes.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_cmd(args),
        Commands::Download {
            symbol,
            start,
            end,
            force,
            cache_dir,
        } => run_download(&symbol, start, end, force, cache_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

/// stderr output filtered by `RUST_LOG` (default `info`), plus an optional file.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

/// Config file values overridden by flags, or a config built from flags alone.
fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => {
            let (Some(universe), Some(prices), Some(start), Some(end)) =
                (&args.universe, &args.prices, &args.start, &args.end)
            else {
                bail!("without --config, --universe, --prices, --start and --end are required");
            };
            RunConfig::new(parse_date(start)?, parse_date(end)?, universe, prices)
        }
    };

    if let Some(p) = &args.universe {
        config.inputs.universe = p.clone();
    }
    if let Some(p) = &args.prices {
        config.inputs.prices = p.clone();
    }
    if let Some(s) = &args.start {
        config.run.start_date = parse_date(s)?;
    }
    if let Some(s) = &args.end {
        config.run.end_date = parse_date(s)?;
    }
    if let Some(b) = &args.benchmark {
        config.run.benchmark = b.clone();
    }
    if let Some(p) = &args.benchmark_csv {
        config.inputs.benchmark_csv = Some(p.clone());
    }
    if let Some(policy) = &args.missing_policy {
        config.analysis.missing_policy = policy.parse::<MissingPolicy>()?;
    }
    if let Some(label) = &args.label {
        config.run.label = Some(label.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.output.cache_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_cmd(args: RunArgs) -> Result<()> {
    let metric = args
        .rank_by
        .as_deref()
        .map(str::parse::<Metric>)
        .transpose()?;
    let config = build_config(&args)?;

    let mut opts = LoadOptions::for_config(&config)?;
    opts.offline = args.offline;
    opts.force |= args.force;

    let cache = BenchmarkCache::new(&config.output.cache_dir);
    let provider = if args.offline && config.inputs.benchmark_csv.is_none() {
        None
    } else {
        Some(default_provider(&config)?)
    };
    let output_dir = config.output.dir.clone();

    let report = Pipeline::new(config).run(&cache, provider.as_deref(), &opts)?;

    print_summary(&report);
    if let Some(metric) = metric {
        print_ranking(&report, metric, args.top);
    }

    let run_dir = save_artifacts(&report, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

fn run_download(
    symbol: &str,
    start: Option<String>,
    end: Option<String>,
    force: bool,
    cache_dir: PathBuf,
) -> Result<()> {
    let start_date = start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive() - chrono::Duration::days(365 * 5));
    let end_date = end
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    info!(symbol, %start_date, %end_date, force, "downloading benchmark");
    let provider = YahooProvider::new()?;
    let cache = BenchmarkCache::new(cache_dir);
    let opts = LoadOptions {
        start: start_date,
        end: end_date,
        offline: false,
        force,
        write_cache: true,
    };

    let loaded = load_benchmark(
        symbol,
        &cache,
        Some(&provider as &dyn BenchmarkProvider),
        &opts,
    )?;
    println!(
        "{symbol}: {} closes ({} to {}) from {}",
        loaded.series.len(),
        loaded
            .series
            .first_date()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        loaded
            .series
            .last_date()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        loaded.source.as_str()
    );
    if loaded.partial {
        println!("WARNING: only part of the requested window is available");
    }

    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = BenchmarkCache::new(cache_dir);
    let symbols = cache.cached_symbols();
    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    let mut total_size = 0u64;
    let mut rows = Vec::with_capacity(refs.len());
    for status in cache.status(&refs) {
        let size = dir_size(&cache_dir.join(format!("symbol={}", status.symbol)));
        total_size += size;
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ => "(no meta)".into(),
        };
        let rows_label = status
            .row_count
            .map(|n| format!("{n} rows"))
            .unwrap_or_default();
        rows.push((status.symbol, range, rows_label, size));
    }

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", rows.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<10} {:<25} {:<12} {:>10}", "Symbol", "Date Range", "Rows", "Size");
    println!("{}", "-".repeat(60));
    for (sym, range, count, size) in &rows {
        println!("{:<10} {:<25} {:<12} {:>10}", sym, range, count, format_size(*size));
    }

    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{:.2}%", x * 100.0))
}

fn num(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.3}"))
}

fn print_summary(report: &RunReport) {
    let cfg = &report.config;
    let b = &report.benchmark;
    let diag = &report.diagnostics;

    println!();
    println!("=== Portfolio Beta Report ===");
    println!(
        "Period:           {} to {}",
        cfg.run.start_date, cfg.run.end_date
    );
    println!("Benchmark:        {} ({})", b.symbol, b.source.as_str());
    println!("Instruments:      {}", report.instruments.len());
    println!("Missing values:   {}", report.portfolio.policy);
    println!();
    println!("--- Portfolio ---");
    println!("Return:           {}", pct(report.portfolio.portfolio_return));
    println!("Beta:             {}", num(report.portfolio.portfolio_beta));
    println!("Benchmark Return: {}", pct(b.period_return));
    println!();
    println!("--- Sectors ---");
    for s in &report.sectors {
        println!(
            "{:<24} weight {:>8}  beta {:>7}",
            s.sector,
            pct(Some(s.weight)),
            num(s.sector_beta)
        );
    }
    println!();
    println!("--- Diagnostics ---");
    println!("Missing start:    {}", diag.missing_start.len());
    println!("Missing end:      {}", diag.missing_end.len());
    println!("Undefined beta:   {}", diag.undefined_betas.len());
    println!("Complete rows:    {}", report.complete_count());
    for warn in &diag.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

fn print_ranking(report: &RunReport, metric: Metric, n: usize) {
    println!("--- Top {n} by {metric} ---");
    for (rank, inst) in rank_by(&report.instruments, metric, n).iter().enumerate() {
        println!(
            "{:>3}. {:<12} {:<32} {:>10}",
            rank + 1,
            inst.code,
            inst.name,
            metric
                .value(inst)
                .map(|v| format!("{v:.6}"))
                .unwrap_or_else(|| "n/a".into())
        );
    }
    println!();
}
