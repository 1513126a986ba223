//! Weight assignment.
//!
//! A [`WeightPolicy`] maps the validated universe to one weight per row, in
//! row order. Equal weighting (`1/N`) is the default; fixed weights come from
//! configuration and arbitrary schemes plug in through [`CustomWeights`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Instrument, InstrumentCode};
use crate::error::AnalysisError;
use crate::table::{PortfolioTable, Stage};

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

pub trait WeightPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// One weight per instrument, in the same order.
    fn assign(&self, instruments: &[Instrument]) -> Vec<f64>;
}

/// `1/N` for every instrument.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightPolicy for EqualWeight {
    fn name(&self) -> &str {
        "equal"
    }

    fn assign(&self, instruments: &[Instrument]) -> Vec<f64> {
        let n = instruments.len();
        if n == 0 {
            return Vec::new();
        }
        vec![1.0 / n as f64; n]
    }
}

/// Explicit weights by instrument code. Codes not listed get zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedWeights {
    weights: BTreeMap<InstrumentCode, f64>,
}

impl FixedWeights {
    pub fn new(weights: BTreeMap<InstrumentCode, f64>) -> Self {
        Self { weights }
    }

    /// Universe codes with no configured weight.
    pub fn unassigned<'a>(&self, instruments: &'a [Instrument]) -> Vec<&'a InstrumentCode> {
        instruments
            .iter()
            .filter(|i| !self.weights.contains_key(&i.code))
            .map(|i| &i.code)
            .collect()
    }

    /// Configured codes that are not in the universe.
    pub fn unknown(&self, instruments: &[Instrument]) -> Vec<InstrumentCode> {
        self.weights
            .keys()
            .filter(|code| !instruments.iter().any(|i| &i.code == *code))
            .cloned()
            .collect()
    }
}

impl WeightPolicy for FixedWeights {
    fn name(&self) -> &str {
        "fixed"
    }

    fn assign(&self, instruments: &[Instrument]) -> Vec<f64> {
        instruments
            .iter()
            .map(|i| self.weights.get(&i.code).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Any weighting closure is a policy named "custom".
impl<F> WeightPolicy for F
where
    F: Fn(&[Instrument]) -> Vec<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn assign(&self, instruments: &[Instrument]) -> Vec<f64> {
        self(instruments)
    }
}

/// A weighting closure with a name for logs and reports.
pub struct CustomWeights<F> {
    name: String,
    f: F,
}

impl<F> CustomWeights<F>
where
    F: Fn(&[Instrument]) -> Vec<f64> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> WeightPolicy for CustomWeights<F>
where
    F: Fn(&[Instrument]) -> Vec<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn assign(&self, instruments: &[Instrument]) -> Vec<f64> {
        (self.f)(instruments)
    }
}

/// Outcome of the weighting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSummary {
    pub policy: String,
    pub total: f64,
    pub sums_to_one: bool,
}

/// Attach weights to a validated table.
///
/// A weight vector of the wrong length is an error. Weights that do not sum
/// to one are kept as given and reported with a warning.
pub fn assign_weights(
    table: &mut PortfolioTable,
    policy: &dyn WeightPolicy,
) -> Result<WeightSummary, AnalysisError> {
    table.check_transition(Stage::Weighted)?;

    let weights = policy.assign(table.instruments());
    if weights.len() != table.len() {
        return Err(AnalysisError::WeightCountMismatch {
            policy: policy.name().to_string(),
            expected: table.len(),
            got: weights.len(),
        });
    }

    for (inst, w) in table.instruments_mut().iter_mut().zip(&weights) {
        inst.weight = *w;
    }
    table.mark(Stage::Weighted);

    let total: f64 = weights.iter().sum();
    let sums_to_one = (total - 1.0).abs() <= WEIGHT_SUM_TOLERANCE;
    if !sums_to_one {
        warn!(policy = policy.name(), total, "weights do not sum to 1");
    }

    Ok(WeightSummary {
        policy: policy.name().to_string(),
        total,
        sums_to_one,
    })
}
