//! Core types for withdrawal optimization

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PlanWarning, PlannerError, Result};
use crate::household::AccountKind;
use crate::projection::{BenefitStartAges, Decision, ProjectionAggregates, YearState};

fn default_beam_width() -> usize {
    8
}

fn default_granularity() -> u32 {
    4
}

fn default_single_kind() -> AccountKind {
    AccountKind::TaxDeferred
}

fn default_horizon_years() -> u32 {
    30
}

/// Multi-year beam search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamConfig {
    /// Partial paths kept per year
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,

    /// Withdrawal levels per account: {0, 1/g, ..., 1} of the year's ceiling
    #[serde(default = "default_granularity")]
    pub granularity: u32,

    /// Stop expanding once this many candidates have been evaluated
    #[serde(default)]
    pub max_evaluations: Option<u64>,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            beam_width: default_beam_width(),
            granularity: default_granularity(),
            max_evaluations: None,
        }
    }
}

impl BeamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.beam_width == 0 {
            return Err(PlannerError::invalid("beam_width", "must be at least 1"));
        }
        if self.granularity == 0 {
            return Err(PlannerError::invalid("granularity", "must be at least 1"));
        }
        Ok(())
    }
}

/// Withdrawal strategy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Fixed priority order, single-year lookahead
    #[default]
    Greedy,
    /// Bounded multi-year search
    DpBeam(BeamConfig),
    /// Diagnostic baseline drawing from one account kind only
    RrspOnly {
        #[serde(default = "default_single_kind")]
        kind: AccountKind,
    },
}

impl Strategy {
    pub fn dp_beam() -> Self {
        Strategy::DpBeam(BeamConfig::default())
    }

    pub fn rrsp_only() -> Self {
        Strategy::RrspOnly {
            kind: default_single_kind(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Greedy => "greedy",
            Strategy::DpBeam(_) => "dp_beam",
            Strategy::RrspOnly { .. } => "rrsp_only",
        }
    }
}

/// Settings shared by every strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Plan years to schedule
    #[serde(default = "default_horizon_years")]
    pub horizon_years: u32,

    /// Benefit elections stamped on the first decision of every schedule
    #[serde(default)]
    pub benefit_start_ages: Option<Vec<BenefitStartAges>>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            horizon_years: default_horizon_years(),
            benefit_start_ages: None,
        }
    }
}

/// How a search ended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Optimal over the discretized action grid (no width pruning, no budget cut)
    pub proven_optimal: bool,
    pub evaluations: u64,
    pub pruned_by_width: u64,
    pub pruned_by_dominance: u64,
    pub budget_exhausted: bool,
}

/// Result of an optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy: Strategy,
    pub schedule: Vec<Decision>,
    pub timeline: Vec<YearState>,
    pub aggregates: ProjectionAggregates,
    pub total_tax: f64,
    pub search: SearchReport,
    pub notes: Vec<PlanWarning>,
}

impl OptimizationResult {
    pub fn has_shortfall(&self) -> bool {
        self.aggregates.shortfall_years > 0
    }
}

/// Shared flag a caller flips to abandon an in-flight search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PlannerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(serde_json::to_string(&Strategy::Greedy).unwrap(), "\"greedy\"");

        let parsed: Strategy = serde_json::from_str(r#"{"rrsp_only": {}}"#).unwrap();
        assert_eq!(parsed, Strategy::rrsp_only());

        let parsed: Strategy = serde_json::from_str(r#"{"dp_beam": {"beam_width": 3}}"#).unwrap();
        assert_eq!(
            parsed,
            Strategy::DpBeam(BeamConfig {
                beam_width: 3,
                ..BeamConfig::default()
            })
        );
        assert_eq!(parsed.name(), "dp_beam");
    }

    #[test]
    fn test_beam_config_validation() {
        assert!(BeamConfig::default().validate().is_ok());
        let zero = BeamConfig {
            beam_width: 0,
            ..BeamConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_cancellation_token_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(matches!(token.check(), Err(PlannerError::Cancelled)));
    }
}
