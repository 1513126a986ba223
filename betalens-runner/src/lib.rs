//! BetaLens Runner — run orchestration and report export.
//!
//! This crate builds on `betalens-core` to provide:
//! - TOML run configuration with validation and a deterministic config id
//! - Input loading and benchmark resolution with cache/provider fallback
//! - The staged pipeline producing a [`RunReport`]
//! - Run observers for tracing output or silent runs
//! - CSV, JSON and Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod observer;
pub mod pipeline;
pub mod report;

pub use config::{ConfigError, RunConfig, WeightingScheme};
pub use data_loader::{
    compute_dataset_hash, default_provider, load_benchmark, load_inputs, LoadError, LoadOptions,
    LoadedBenchmark, LoadedInputs,
};
pub use export::{export_json, generate_report, import_json, load_artifacts, save_artifacts};
pub use observer::{Degradation, NullObserver, RunObserver, Step, TracingObserver};
pub use pipeline::{Pipeline, RunError};
pub use report::{BenchmarkSummary, Diagnostics, RunReport, SCHEMA_VERSION};
