//! Shock testing for finished plans
//!
//! Re-projects a plan under each requested shock, and under all of them
//! together, then scores the worst loss of success against the unshocked
//! plan.

mod score;
mod shocks;

pub use score::{ScenarioOutcome, COVERAGE_WEIGHT, EXPLAIN_THRESHOLD, FUNDED_YEARS_WEIGHT};
pub use shocks::{ReplayMode, SequencePath, ShockKind, ShockParameters, ShockScenario};

use std::collections::BTreeMap;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assumptions::Assumptions;
use crate::error::{PlannerError, Result};
use crate::household::Household;
use crate::optimizer::{OptimizationResult, Optimizer, Strategy};
use crate::projection::Decision;

/// A household together with the schedule chosen for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub household: Household,
    pub assumptions: Assumptions,
    pub horizon_years: u32,
    pub strategy: Strategy,
    pub schedule: Vec<Decision>,
}

impl Plan {
    pub fn from_result(household: Household, assumptions: Assumptions, result: &OptimizationResult) -> Self {
        Self {
            household,
            assumptions,
            horizon_years: result.schedule.len() as u32,
            strategy: result.strategy.clone(),
            schedule: result.schedule.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    /// 0 to 100; 100 means no requested shock degraded the plan
    pub score: f64,
    pub explanations: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
}

/// Runs shock scenarios against plans
#[derive(Debug, Clone)]
pub struct RobustnessService {
    optimizer: Optimizer,
    params: ShockParameters,
}

impl RobustnessService {
    pub fn new(optimizer: Optimizer, params: ShockParameters) -> Self {
        Self { optimizer, params }
    }

    pub fn with_defaults(optimizer: Optimizer) -> Self {
        Self::new(optimizer, ShockParameters::default())
    }

    pub fn params(&self) -> &ShockParameters {
        &self.params
    }

    pub fn evaluate_shocks(&self, plan: &Plan, shocks: &ShockScenario) -> Result<RobustnessReport> {
        self.params.validate()?;
        if plan.horizon_years == 0 {
            return Err(PlannerError::invalid("horizon_years", "must be at least 1"));
        }

        let base = self.run_scenario(plan, &[])?;
        let mut metrics = BTreeMap::new();
        record(&mut metrics, &base, None);

        let requested = shocks.kinds();
        let mut scenarios: Vec<Vec<ShockKind>> = requested.iter().map(|k| vec![*k]).collect();
        if requested.len() > 1 {
            scenarios.push(requested.clone());
        }

        let outcomes: Vec<ScenarioOutcome> = scenarios
            .par_iter()
            .map(|kinds| self.run_scenario(plan, kinds))
            .collect::<Result<_>>()?;

        let mut explanations = Vec::new();
        for outcome in &outcomes {
            record(&mut metrics, outcome, Some(&base));
            if let Some(text) = score::explain(&base, outcome) {
                explanations.push(text);
            }
        }

        let score = score::score(&base, &outcomes);
        info!(
            "robustness score {:.1} over {} scenario(s)",
            score,
            outcomes.len()
        );

        Ok(RobustnessReport {
            score,
            explanations,
            metrics,
        })
    }

    fn run_scenario(&self, plan: &Plan, kinds: &[ShockKind]) -> Result<ScenarioOutcome> {
        let label = if kinds.is_empty() {
            "base".to_string()
        } else {
            kinds.iter().map(ShockKind::as_str).collect::<Vec<_>>().join("+")
        };
        let (assumptions, horizon) = self.params.apply(kinds, &plan.assumptions, plan.horizon_years);

        let aggregates = match self.params.replay {
            ReplayMode::FixedSchedule => {
                let schedule =
                    self.optimizer
                        .extend_schedule(&plan.household, &assumptions, &plan.schedule, horizon)?;
                self.optimizer
                    .engine()
                    .run_projection(&plan.household, &assumptions, &schedule, horizon)?
                    .aggregates
            }
            ReplayMode::Resolve => {
                self.optimizer
                    .clone()
                    .with_horizon(horizon)
                    .optimize(&plan.household, &assumptions, &plan.strategy)?
                    .aggregates
            }
        };

        let outcome = ScenarioOutcome::new(label, &aggregates, horizon);
        debug!(
            "scenario {}: coverage {:.4}, funded {:.4}, shortfall years {}",
            outcome.label, outcome.coverage, outcome.funded_ratio, outcome.shortfall_years
        );
        Ok(outcome)
    }
}

fn record(metrics: &mut BTreeMap<String, f64>, outcome: &ScenarioOutcome, base: Option<&ScenarioOutcome>) {
    let label = &outcome.label;
    metrics.insert(format!("{label}.coverage"), outcome.coverage);
    metrics.insert(format!("{label}.funded_ratio"), outcome.funded_ratio);
    metrics.insert(format!("{label}.shortfall_years"), outcome.shortfall_years as f64);
    metrics.insert(format!("{label}.total_tax"), outcome.total_tax);
    metrics.insert(format!("{label}.success"), outcome.success);
    if let Some(base) = base {
        metrics.insert(format!("{label}.degradation"), outcome.degradation(base));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::{Account, AccountKind, IncomeSource, IncomeSourceKind, Person};
    use crate::projection::ProjectionEngine;
    use crate::tax::{Jurisdiction, TaxPolicy};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn optimizer(horizon: u32) -> Optimizer {
        let engine = ProjectionEngine::new(Arc::new(TaxPolicy::embedded().unwrap()));
        Optimizer::with_defaults(engine).with_horizon(horizon)
    }

    /// $100k tax-free, no growth, $10k need: exactly ten funded years
    fn exact_ten_years() -> (Household, Assumptions) {
        let household = Household::new(
            vec![Person::new("sam", 1955)],
            vec![Account::new("tfsa", 0, AccountKind::TaxFree, 100_000.0)],
            Jurisdiction::alberta(),
            10_000.0,
            2025,
        );
        (household, Assumptions::default().with_inflation(0.0))
    }

    fn planned(household: Household, assumptions: Assumptions, horizon: u32) -> (Plan, Optimizer) {
        let optimizer = optimizer(horizon);
        let result = optimizer
            .optimize(&household, &assumptions, &Strategy::Greedy)
            .unwrap();
        (Plan::from_result(household, assumptions, &result), optimizer)
    }

    fn comfortable() -> (Household, Assumptions) {
        let household = Household::new(
            vec![Person::new("robin", 1959)],
            vec![
                Account::new("rrsp", 0, AccountKind::TaxDeferred, 300_000.0).with_growth(6.0),
                Account::new("tfsa", 0, AccountKind::TaxFree, 100_000.0).with_growth(6.0),
            ],
            Jurisdiction::ontario(),
            45_000.0,
            2024,
        )
        .with_income(IncomeSource::new("db", 0, IncomeSourceKind::EmployerPension, 35_000.0, 2024));
        (household, Assumptions::default())
    }

    #[test]
    fn test_empty_shock_set_scores_full_marks() {
        let (household, assumptions) = exact_ten_years();
        let (plan, optimizer) = planned(household, assumptions, 10);
        let service = RobustnessService::with_defaults(optimizer);

        let report = service.evaluate_shocks(&plan, &ShockScenario::default()).unwrap();
        assert_eq!(report.score, 100.0);
        assert!(report.explanations.is_empty());
        assert_relative_eq!(report.metrics["base.coverage"], 1.0);
        assert_relative_eq!(report.metrics["base.success"], 1.0);
    }

    #[test]
    fn test_longevity_past_depletion() {
        let (household, assumptions) = exact_ten_years();
        let (plan, optimizer) = planned(household, assumptions, 10);
        let service = RobustnessService::with_defaults(optimizer);

        let report = service
            .evaluate_shocks(&plan, &ShockScenario::only(ShockKind::LongevityPlus))
            .unwrap();

        // 10 of 15 years funded, 100k of 150k need covered
        assert_relative_eq!(report.metrics["longevity_plus.coverage"], 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(report.metrics["longevity_plus.funded_ratio"], 2.0 / 3.0, epsilon = 1e-9);
        assert_eq!(report.metrics["longevity_plus.shortfall_years"], 5.0);
        assert_relative_eq!(report.score, 100.0 / 3.0 * 2.0, epsilon = 1e-6);
        assert_eq!(report.explanations.len(), 1);
        assert!(report.explanations[0].starts_with("longevity_plus"));
    }

    #[test]
    fn test_resolve_mode_matches_fixed_for_longevity() {
        let (household, assumptions) = exact_ten_years();
        let (plan, optimizer) = planned(household, assumptions, 10);
        let fixed = RobustnessService::with_defaults(optimizer.clone());
        let resolve = RobustnessService::new(
            optimizer,
            ShockParameters::default().with_replay(ReplayMode::Resolve),
        );

        let shocks = ShockScenario::only(ShockKind::LongevityPlus);
        let a = fixed.evaluate_shocks(&plan, &shocks).unwrap();
        let b = resolve.evaluate_shocks(&plan, &shocks).unwrap();
        assert_relative_eq!(a.score, b.score, epsilon = 1e-6);
    }

    #[test]
    fn test_inflation_shock_degrades_fixed_schedule() {
        let (household, assumptions) = exact_ten_years();
        let (plan, optimizer) = planned(household, assumptions, 10);
        let service = RobustnessService::with_defaults(optimizer);

        let report = service
            .evaluate_shocks(&plan, &ShockScenario::only(ShockKind::InflationHigh))
            .unwrap();
        assert!(report.score < 100.0);
        assert!(report.metrics["inflation_high.shortfall_years"] > 0.0);
        assert!(!report.explanations.is_empty());
    }

    #[test]
    fn test_combined_shocks_never_score_higher() {
        let (household, assumptions) = comfortable();
        let (plan, optimizer) = planned(household, assumptions, 15);
        let service = RobustnessService::with_defaults(optimizer);

        let singles: Vec<f64> = ShockScenario::all()
            .kinds()
            .into_iter()
            .map(|kind| {
                service
                    .evaluate_shocks(&plan, &ShockScenario::only(kind))
                    .unwrap()
                    .score
            })
            .collect();

        let pair = ShockScenario::from_kinds(&[ShockKind::InflationHigh, ShockKind::SequenceShock]);
        let pair_score = service.evaluate_shocks(&plan, &pair).unwrap().score;
        assert!(pair_score <= singles[0]);
        assert!(pair_score <= singles[2]);

        let all = service.evaluate_shocks(&plan, &ShockScenario::all()).unwrap();
        for single in &singles {
            assert!(all.score <= *single);
        }
        assert!(all.metrics.contains_key("inflation_high+longevity_plus+sequence_shock.success"));
        assert!((0.0..=100.0).contains(&all.score));
    }

    #[test]
    fn test_randomized_sequence_reproducible() {
        let (household, assumptions) = comfortable();
        let (plan, optimizer) = planned(household, assumptions, 10);
        let params = ShockParameters::default().with_sequence(SequencePath::Randomized {
            seed: 2024,
            years: 5,
            mean: -0.04,
            volatility: 0.15,
        });
        let service = RobustnessService::new(optimizer, params);

        let shocks = ShockScenario::only(ShockKind::SequenceShock);
        let first = service.evaluate_shocks(&plan, &shocks).unwrap();
        let second = service.evaluate_shocks(&plan, &shocks).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_plan_rejected() {
        let (household, assumptions) = exact_ten_years();
        let plan = Plan {
            household,
            assumptions,
            horizon_years: 0,
            strategy: Strategy::Greedy,
            schedule: Vec::new(),
        };
        let outcome = RobustnessService::with_defaults(optimizer(1))
            .evaluate_shocks(&plan, &ShockScenario::all());
        assert!(matches!(outcome, Err(PlannerError::InputValidation { .. })));
    }
}
