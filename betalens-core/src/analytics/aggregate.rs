//! Weighted metrics and sector / portfolio rollups.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::metric::Metric;
use crate::domain::Instrument;
use crate::error::AnalysisError;
use crate::table::{PortfolioTable, Stage};

/// How undefined member values enter sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// Any undefined member makes the sum undefined.
    #[default]
    Propagate,
    /// Undefined members drop out of numerator and denominator.
    Exclude,
    /// Undefined members count as zero; denominators keep full weight.
    ZeroFill,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown missing-value policy '{0}' (expected propagate, exclude or zero-fill)")]
pub struct UnknownPolicy(pub String);

impl MissingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingPolicy::Propagate => "propagate",
            MissingPolicy::Exclude => "exclude",
            MissingPolicy::ZeroFill => "zero-fill",
        }
    }

    /// Sum under this policy. An empty input sums to zero.
    pub fn sum(self, values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
        let mut total = 0.0;
        let mut defined = 0usize;
        let mut undefined = 0usize;
        for v in values {
            match v {
                Some(x) => {
                    total += x;
                    defined += 1;
                }
                None => undefined += 1,
            }
        }
        match self {
            MissingPolicy::Propagate if undefined > 0 => None,
            MissingPolicy::Exclude if defined == 0 && undefined > 0 => None,
            _ => Some(total),
        }
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "propagate" => Ok(MissingPolicy::Propagate),
            "exclude" => Ok(MissingPolicy::Exclude),
            "zero-fill" | "zerofill" => Ok(MissingPolicy::ZeroFill),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorAggregate {
    pub sector: String,
    pub instruments: usize,
    pub weight: f64,
    pub weighted_return: Option<f64>,
    pub sum_weighted_beta: Option<f64>,
    pub sector_beta: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub portfolio_return: Option<f64>,
    pub portfolio_beta: Option<f64>,
    pub policy: MissingPolicy,
}

/// Attach `weight * abs_return` and `weight * beta` to every row.
pub fn apply_weighted_metrics(table: &mut PortfolioTable) -> Result<(), AnalysisError> {
    table.check_transition(Stage::WeightedMetrics)?;
    for inst in table.instruments_mut() {
        inst.weighted_return = inst.abs_return.map(|r| inst.weight * r);
        inst.weighted_beta = inst.beta.map(|b| inst.weight * b);
    }
    table.mark(Stage::WeightedMetrics);
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioAggregator {
    policy: MissingPolicy,
}

impl PortfolioAggregator {
    pub fn new(policy: MissingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MissingPolicy {
        self.policy
    }

    /// Sum of `metric` over the whole table under the configured policy.
    pub fn sum_metric(
        &self,
        table: &PortfolioTable,
        metric: Metric,
    ) -> Result<Option<f64>, AnalysisError> {
        table.require(Stage::WeightedMetrics)?;
        Ok(self.policy.sum(table.instruments().iter().map(|i| metric.value(i))))
    }

    /// One row per sector label, sorted by label.
    pub fn sectors(&self, table: &PortfolioTable) -> Result<Vec<SectorAggregate>, AnalysisError> {
        table.require(Stage::WeightedMetrics)?;

        let mut groups: BTreeMap<&str, Vec<&Instrument>> = BTreeMap::new();
        for inst in table.instruments() {
            groups.entry(inst.sector.as_str()).or_default().push(inst);
        }

        Ok(groups
            .into_iter()
            .map(|(sector, members)| self.sector_row(sector, &members))
            .collect())
    }

    fn sector_row(&self, sector: &str, members: &[&Instrument]) -> SectorAggregate {
        let weight: f64 = members.iter().map(|i| i.weight).sum();
        let weighted_return = self.policy.sum(members.iter().map(|i| i.weighted_return));
        let sum_weighted_beta = self.policy.sum(members.iter().map(|i| i.weighted_beta));

        let denominator = match self.policy {
            MissingPolicy::Exclude => members
                .iter()
                .filter(|i| i.weighted_beta.is_some())
                .map(|i| i.weight)
                .sum(),
            MissingPolicy::Propagate | MissingPolicy::ZeroFill => weight,
        };
        let sector_beta = sum_weighted_beta.and_then(|b| ratio(b, denominator));

        SectorAggregate {
            sector: sector.to_string(),
            instruments: members.len(),
            weight,
            weighted_return,
            sum_weighted_beta,
            sector_beta,
        }
    }

    pub fn portfolio(&self, table: &PortfolioTable) -> Result<PortfolioMetrics, AnalysisError> {
        let (portfolio_return, portfolio_beta) = match self.policy {
            MissingPolicy::Exclude => {
                table.require(Stage::WeightedMetrics)?;
                (
                    renormalized(table.instruments(), Metric::WeightedReturn),
                    renormalized(table.instruments(), Metric::WeightedBeta),
                )
            }
            MissingPolicy::Propagate | MissingPolicy::ZeroFill => (
                self.sum_metric(table, Metric::WeightedReturn)?,
                self.sum_metric(table, Metric::WeightedBeta)?,
            ),
        };

        Ok(PortfolioMetrics {
            portfolio_return,
            portfolio_beta,
            policy: self.policy,
        })
    }
}

/// Sum of a weighted metric divided by the weight of members where it is defined.
fn renormalized(instruments: &[Instrument], metric: Metric) -> Option<f64> {
    let (sum, weight) = instruments
        .iter()
        .filter_map(|i| metric.value(i).map(|v| (v, i.weight)))
        .fold((0.0, 0.0), |(s, w), (v, wi)| (s + v, w + wi));
    ratio(sum, weight)
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::weighting::{assign_weights, EqualWeight};

    fn row(code: &str, sector: &str, r: Option<f64>, beta: Option<f64>) -> Instrument {
        let mut i = Instrument::new(code, "", sector);
        i.abs_return = r;
        i.beta = beta;
        i
    }

    /// Build a table at the weighted-metrics stage without running the data stages.
    fn finished(rows: Vec<Instrument>) -> PortfolioTable {
        let mut t = PortfolioTable::new(rows.clone()).unwrap();
        assign_weights(&mut t, &EqualWeight).unwrap();
        t.mark(Stage::BetasEstimated);
        for (inst, src) in t.instruments_mut().iter_mut().zip(&rows) {
            inst.abs_return = src.abs_return;
            inst.beta = src.beta;
        }
        apply_weighted_metrics(&mut t).unwrap();
        t
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn policy_sums() {
        let vals = [Some(1.0), None, Some(2.0)];
        assert_eq!(MissingPolicy::Propagate.sum(vals), None);
        assert_eq!(MissingPolicy::Exclude.sum(vals), Some(3.0));
        assert_eq!(MissingPolicy::ZeroFill.sum(vals), Some(3.0));
        assert_eq!(MissingPolicy::Exclude.sum([None, None]), None);
        assert_eq!(MissingPolicy::ZeroFill.sum([None, None]), Some(0.0));
        assert_eq!(MissingPolicy::Propagate.sum([]), Some(0.0));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("zero_fill".parse::<MissingPolicy>(), Ok(MissingPolicy::ZeroFill));
        assert_eq!(" Exclude ".parse::<MissingPolicy>(), Ok(MissingPolicy::Exclude));
        assert!("drop".parse::<MissingPolicy>().is_err());
    }

    #[test]
    fn weighted_fields_follow_inputs() {
        let t = finished(vec![row("A", "S", Some(0.2), None), row("B", "S", None, Some(1.5))]);
        let a = &t.instruments()[0];
        assert!(close(a.weighted_return, 0.1));
        assert_eq!(a.weighted_beta, None);
        let b = &t.instruments()[1];
        assert_eq!(b.weighted_return, None);
        assert!(close(b.weighted_beta, 0.75));
    }

    #[test]
    fn fully_defined_rollups_agree_across_policies() {
        let t = finished(vec![
            row("A", "Tech", Some(0.10), Some(1.2)),
            row("B", "Tech", Some(-0.05), Some(0.8)),
            row("C", "Energy", Some(0.20), Some(1.0)),
            row("D", "Energy", Some(0.00), Some(0.6)),
        ]);

        for policy in [MissingPolicy::Propagate, MissingPolicy::Exclude, MissingPolicy::ZeroFill] {
            let agg = PortfolioAggregator::new(policy);
            let p = agg.portfolio(&t).unwrap();
            assert!(close(p.portfolio_return, 0.0625));
            assert!(close(p.portfolio_beta, 0.9));

            let sectors = agg.sectors(&t).unwrap();
            assert_eq!(sectors.len(), 2);
            assert_eq!(sectors[0].sector, "Energy");
            assert!((sectors[0].weight - 0.5).abs() < 1e-12);
            assert!(close(sectors[0].sum_weighted_beta, 0.4));
            assert!(close(sectors[0].sector_beta, 0.8));
            assert!(close(sectors[1].weighted_return, 0.0125));
            assert!(close(sectors[1].sector_beta, 1.0));
        }
    }

    #[test]
    fn undefined_member_under_each_policy() {
        let t = finished(vec![
            row("A", "Tech", Some(0.10), Some(1.2)),
            row("B", "Tech", None, None),
        ]);

        let p = PortfolioAggregator::new(MissingPolicy::Propagate).portfolio(&t).unwrap();
        assert_eq!(p.portfolio_return, None);
        assert_eq!(p.portfolio_beta, None);

        let p = PortfolioAggregator::new(MissingPolicy::ZeroFill).portfolio(&t).unwrap();
        assert!(close(p.portfolio_return, 0.05));
        assert!(close(p.portfolio_beta, 0.6));
        let s = &PortfolioAggregator::new(MissingPolicy::ZeroFill).sectors(&t).unwrap()[0];
        assert!(close(s.sector_beta, 0.6));

        let p = PortfolioAggregator::new(MissingPolicy::Exclude).portfolio(&t).unwrap();
        assert!(close(p.portfolio_return, 0.10));
        assert!(close(p.portfolio_beta, 1.2));
        let s = &PortfolioAggregator::new(MissingPolicy::Exclude).sectors(&t).unwrap()[0];
        assert!(close(s.sector_beta, 1.2));
        assert!(close(s.weighted_return, 0.05));
    }

    #[test]
    fn zero_weight_sector_has_undefined_beta() {
        let mut t = PortfolioTable::new(vec![row("A", "S", Some(0.1), Some(1.0))]).unwrap();
        assign_weights(&mut t, &|_: &[Instrument]| vec![0.0]).unwrap();
        t.instruments_mut()[0].abs_return = Some(0.1);
        t.instruments_mut()[0].beta = Some(1.0);
        t.mark(Stage::BetasEstimated);
        apply_weighted_metrics(&mut t).unwrap();

        let s = &PortfolioAggregator::default().sectors(&t).unwrap()[0];
        assert_eq!(s.sector_beta, None);
        assert_eq!(s.sum_weighted_beta, Some(0.0));
    }

    #[test]
    fn rollups_require_weighted_metrics() {
        let t = PortfolioTable::new(vec![row("A", "S", None, None)]).unwrap();
        let agg = PortfolioAggregator::default();
        assert!(matches!(agg.portfolio(&t), Err(AnalysisError::StageOrder { .. })));
        assert!(matches!(agg.sectors(&t), Err(AnalysisError::StageOrder { .. })));
    }
}
