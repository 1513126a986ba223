//! The working universe table and its stage marker.
//!
//! Stages attach columns in place and must run in order:
//!
//! ```text
//! Validated -> Weighted -> ReturnsMatched -> BetasEstimated -> WeightedMetrics
//! ```
//!
//! Calling a stage on a table that is not at its predecessor is a
//! [`AnalysisError::StageOrder`] error and leaves the table untouched.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Instrument, InstrumentCode};
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validated,
    Weighted,
    ReturnsMatched,
    BetasEstimated,
    WeightedMetrics,
}

impl Stage {
    /// The stage a table must be at before this one can run.
    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Validated => None,
            Stage::Weighted => Some(Stage::Validated),
            Stage::ReturnsMatched => Some(Stage::Weighted),
            Stage::BetasEstimated => Some(Stage::ReturnsMatched),
            Stage::WeightedMetrics => Some(Stage::BetasEstimated),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validated => "validated",
            Stage::Weighted => "weighted",
            Stage::ReturnsMatched => "returns_matched",
            Stage::BetasEstimated => "betas_estimated",
            Stage::WeightedMetrics => "weighted_metrics",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated universe with the columns attached so far.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioTable {
    instruments: Vec<Instrument>,
    stage: Stage,
}

impl PortfolioTable {
    /// Validate a universe: non-empty with unique codes.
    ///
    /// Row order is preserved and carried through to every export.
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, AnalysisError> {
        if instruments.is_empty() {
            return Err(AnalysisError::EmptyUniverse);
        }

        let mut seen: BTreeSet<&InstrumentCode> = BTreeSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for inst in &instruments {
            if !seen.insert(&inst.code) && !duplicates.iter().any(|c| c == inst.code.as_str()) {
                duplicates.push(inst.code.as_str().to_string());
            }
        }
        if !duplicates.is_empty() {
            return Err(AnalysisError::DuplicateCodes { codes: duplicates });
        }

        Ok(Self {
            instruments,
            stage: Stage::Validated,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn get(&self, code: &InstrumentCode) -> Option<&Instrument> {
        self.instruments.iter().find(|i| &i.code == code)
    }

    pub fn into_instruments(self) -> Vec<Instrument> {
        self.instruments
    }

    /// Fail unless the table is exactly at `stage`.
    pub fn require(&self, stage: Stage) -> Result<(), AnalysisError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(AnalysisError::StageOrder {
                attempted: stage,
                required: stage,
                current: self.stage,
            })
        }
    }

    /// Fail unless `next` may run on the table as it is now.
    pub(crate) fn check_transition(&self, next: Stage) -> Result<(), AnalysisError> {
        match next.predecessor() {
            Some(required) if required == self.stage => Ok(()),
            Some(required) => Err(AnalysisError::StageOrder {
                attempted: next,
                required,
                current: self.stage,
            }),
            None => Err(AnalysisError::StageOrder {
                attempted: next,
                required: next,
                current: self.stage,
            }),
        }
    }

    pub(crate) fn instruments_mut(&mut self) -> &mut [Instrument] {
        &mut self.instruments
    }

    pub(crate) fn mark(&mut self, stage: Stage) {
        self.stage = stage;
    }
}
