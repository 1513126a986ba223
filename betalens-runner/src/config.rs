//! Serializable run configuration.
//!
//! A run is described by a TOML file:
//!
//! ```toml
//! [run]
//! start_date = "2024-01-01"
//! end_date = "2024-12-31"
//! benchmark = "^NSEI"
//!
//! [inputs]
//! universe = "universe.csv"
//! prices = "prices.csv"
//!
//! [analysis]
//! missing_policy = "propagate"
//! weighting = "equal"
//! ```
//!
//! Everything except the dates and the two input paths has a default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use betalens_core::analytics::{
    BetaConfig, EqualWeight, FixedWeights, MissingPolicy, WeightPolicy,
    DEFAULT_MIN_BENCHMARK_RETURNS, DEFAULT_MIN_OBSERVATIONS,
};
use betalens_core::domain::{ConfigId, InstrumentCode};
use betalens_core::lookup_cache::DEFAULT_LOOKUP_CAPACITY;
use betalens_core::prices::DEFAULT_BENCHMARK;

/// Calendar days fetched on each side of the analysis window.
pub const DEFAULT_BUFFER_DAYS: u32 = 30;
/// Widest benchmark padding accepted on either side of the window.
pub const MAX_BUFFER_DAYS: u32 = 3650;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("benchmark symbol is empty")]
    EmptyBenchmark,

    #[error("buffer_days must be at most {max} (got {got})")]
    BufferDays { got: u32, max: u32 },

    #[error("benchmark window around {start}..{end} is out of the supported date range")]
    WindowOutOfRange { start: NaiveDate, end: NaiveDate },

    #[error("min_observations must be at least 2 (got {0})")]
    MinObservations(usize),

    #[error("weighting = \"fixed\" requires a non-empty [analysis.weights] table")]
    MissingWeights,

    #[error("weight for '{code}' is not a finite number")]
    InvalidWeight { code: String },

    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// Full configuration of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub run: RunSection,
    pub inputs: InputsSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSection {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default = "default_buffer_days")]
    pub buffer_days: u32,
    /// Prefix of the artifact directory. Defaults to "portfolio".
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputsSection {
    pub universe: PathBuf,
    pub prices: PathBuf,
    /// Local benchmark export used instead of Yahoo Finance.
    #[serde(default)]
    pub benchmark_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeightingScheme {
    #[default]
    Equal,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSection {
    pub min_observations: usize,
    pub min_benchmark_returns: usize,
    pub missing_policy: MissingPolicy,
    pub weighting: WeightingScheme,
    pub weights: BTreeMap<String, f64>,
    pub lookup_cache_capacity: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            min_benchmark_returns: DEFAULT_MIN_BENCHMARK_RETURNS,
            missing_policy: MissingPolicy::default(),
            weighting: WeightingScheme::default(),
            weights: BTreeMap::new(),
            lookup_cache_capacity: DEFAULT_LOOKUP_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            cache_dir: PathBuf::from("data"),
        }
    }
}

fn default_benchmark() -> String {
    DEFAULT_BENCHMARK.to_string()
}

fn default_buffer_days() -> u32 {
    DEFAULT_BUFFER_DAYS
}

impl RunConfig {
    /// Minimal config with defaults for everything but dates and inputs.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        universe: impl Into<PathBuf>,
        prices: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run: RunSection {
                start_date,
                end_date,
                benchmark: default_benchmark(),
                buffer_days: DEFAULT_BUFFER_DAYS,
                label: None,
            },
            inputs: InputsSection {
                universe: universe.into(),
                prices: prices.into(),
                benchmark_csv: None,
            },
            analysis: AnalysisSection::default(),
            output: OutputSection::default(),
        }
    }

    /// Load and validate a config file.
    ///
    /// Relative input paths are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.start_date > self.run.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.run.start_date,
                end: self.run.end_date,
            });
        }
        if self.run.benchmark.trim().is_empty() {
            return Err(ConfigError::EmptyBenchmark);
        }
        if self.run.buffer_days > MAX_BUFFER_DAYS {
            return Err(ConfigError::BufferDays {
                got: self.run.buffer_days,
                max: MAX_BUFFER_DAYS,
            });
        }
        if self.analysis.min_observations < 2 {
            return Err(ConfigError::MinObservations(self.analysis.min_observations));
        }
        if self.analysis.weighting == WeightingScheme::Fixed && self.analysis.weights.is_empty() {
            return Err(ConfigError::MissingWeights);
        }
        if let Some((code, _)) = self.analysis.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(ConfigError::InvalidWeight { code: code.clone() });
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.inputs.universe);
        resolve(&mut self.inputs.prices);
        if let Some(p) = self.inputs.benchmark_csv.as_mut() {
            resolve(p);
        }
    }

    /// Deterministic hash of the canonical JSON form.
    pub fn run_id(&self) -> Result<ConfigId, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(ConfigId::from_hash(&blake3::hash(json.as_bytes()).to_hex()))
    }

    /// Artifact directory prefix.
    pub fn label(&self) -> &str {
        self.run.label.as_deref().unwrap_or("portfolio")
    }

    /// Benchmark fetch window: the analysis window widened by `buffer_days`.
    pub fn benchmark_window(&self) -> Result<(NaiveDate, NaiveDate), ConfigError> {
        let pad = Days::new(u64::from(self.run.buffer_days));
        let start = self.run.start_date.checked_sub_days(pad);
        let end = self.run.end_date.checked_add_days(pad);
        start.zip(end).ok_or(ConfigError::WindowOutOfRange {
            start: self.run.start_date,
            end: self.run.end_date,
        })
    }

    pub fn beta_config(&self) -> BetaConfig {
        BetaConfig {
            min_observations: self.analysis.min_observations,
            min_benchmark_returns: self.analysis.min_benchmark_returns,
        }
    }

    pub fn weight_policy(&self) -> Box<dyn WeightPolicy> {
        match self.analysis.weighting {
            WeightingScheme::Equal => Box::new(EqualWeight),
            WeightingScheme::Fixed => Box::new(self.fixed_weights()),
        }
    }

    /// The `[analysis.weights]` table keyed by instrument code.
    pub fn fixed_weights(&self) -> FixedWeights {
        FixedWeights::new(
            self.analysis
                .weights
                .iter()
                .map(|(code, w)| (InstrumentCode::new(code.as_str()), *w))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [run]
        start_date = "2024-01-01"
        end_date = "2024-06-30"

        [inputs]
        universe = "universe.csv"
        prices = "prices.csv"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = RunConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.run.benchmark, "^NSEI");
        assert_eq!(config.run.buffer_days, 30);
        assert_eq!(config.analysis.min_observations, 5);
        assert_eq!(config.analysis.min_benchmark_returns, 5);
        assert_eq!(config.analysis.missing_policy, MissingPolicy::Propagate);
        assert_eq!(config.analysis.weighting, WeightingScheme::Equal);
        assert_eq!(config.analysis.lookup_cache_capacity, 64);
        assert_eq!(config.output.dir, PathBuf::from("results"));
        assert_eq!(config.label(), "portfolio");
        assert_eq!(config.weight_policy().name(), "equal");
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
            [run]
            start_date = "2024-01-01"
            end_date = "2024-06-30"
            benchmark = "^BSESN"
            buffer_days = 10
            label = "q2"

            [inputs]
            universe = "u.csv"
            prices = "p.csv"
            benchmark_csv = "sensex.csv"

            [analysis]
            missing_policy = "zero-fill"
            weighting = "fixed"
            min_observations = 20

            [analysis.weights]
            X1 = 0.6
            X2 = 0.4

            [output]
            dir = "out"
        "#;
        let config = RunConfig::from_toml(toml).unwrap();
        assert_eq!(config.analysis.missing_policy, MissingPolicy::ZeroFill);
        assert_eq!(config.analysis.weights.len(), 2);
        assert_eq!(config.weight_policy().name(), "fixed");
        assert_eq!(config.beta_config().min_observations, 20);
        assert_eq!(config.output.cache_dir, PathBuf::from("data"));
        assert_eq!(config.label(), "q2");
        assert_eq!(
            config.benchmark_window().unwrap(),
            (
                NaiveDate::from_ymd_opt(2023, 12, 22).unwrap(),
                NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
            )
        );
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let toml = MINIMAL.replace("[inputs]", "buffer_days = 4000000000\n\n[inputs]");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::BufferDays { got: 4_000_000_000, .. })
        ));
    }

    #[test]
    fn window_past_calendar_limits_is_an_error() {
        let mut config = RunConfig::from_toml(MINIMAL).unwrap();
        config.run.start_date = NaiveDate::MIN;
        config.run.buffer_days = 1;
        assert!(matches!(
            config.benchmark_window(),
            Err(ConfigError::WindowOutOfRange { .. })
        ));

        config.run.buffer_days = u32::MAX;
        config.run.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(config.validate().is_err());
        assert!(config.benchmark_window().is_err());
    }

    #[test]
    fn reversed_dates_are_rejected() {
        let toml = MINIMAL.replace("2024-06-30", "2023-06-30");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn fixed_weighting_needs_weights() {
        let toml = format!("{MINIMAL}\n[analysis]\nweighting = \"fixed\"\n");
        assert!(matches!(
            RunConfig::from_toml(&toml),
            Err(ConfigError::MissingWeights)
        ));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let toml = format!("{MINIMAL}\n[analysis]\nmissing_policy = \"drop\"\n");
        assert!(matches!(RunConfig::from_toml(&toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn run_id_is_deterministic_and_sensitive() {
        let a = RunConfig::from_toml(MINIMAL).unwrap();
        let mut b = a.clone();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        b.analysis.missing_policy = MissingPolicy::Exclude;
        assert_ne!(a.run_id().unwrap(), b.run_id().unwrap());
    }

    #[test]
    fn from_file_resolves_relative_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.inputs.universe, dir.path().join("universe.csv"));
    }
}
