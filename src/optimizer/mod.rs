//! Withdrawal schedule optimization
//!
//! Every strategy plans year by year through `ProjectionEngine::step_amounts`
//! and the chosen schedule is replayed through `run_projection`, so the
//! returned timeline is exactly what a caller gets by replaying the schedule.

mod beam;
mod greedy;
mod types;

pub use types::{
    BeamConfig, CancellationToken, OptimizationResult, OptimizerConfig, SearchReport, Strategy,
};

use std::collections::BTreeMap;

use log::{debug, info};

use crate::assumptions::Assumptions;
use crate::error::{PlanWarning, Result};
use crate::household::Household;
use crate::projection::{validate_decisions, Decision, PlanState, ProjectionEngine};

use greedy::{Path, YearPlanner};

/// Drives the projection engine to produce withdrawal schedules
#[derive(Debug, Clone)]
pub struct Optimizer {
    engine: ProjectionEngine,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(engine: ProjectionEngine, config: OptimizerConfig) -> Self {
        Self { engine, config }
    }

    pub fn with_defaults(engine: ProjectionEngine) -> Self {
        Self::new(engine, OptimizerConfig::default())
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Same optimizer with a different horizon
    pub fn with_horizon(mut self, horizon_years: u32) -> Self {
        self.config.horizon_years = horizon_years;
        self
    }

    pub fn optimize(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        strategy: &Strategy,
    ) -> Result<OptimizationResult> {
        self.optimize_with_cancel(household, assumptions, strategy, &CancellationToken::new())
    }

    /// Optimize, abandoning the search with `Cancelled` once `cancel` is set
    pub fn optimize_with_cancel(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        strategy: &Strategy,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult> {
        let horizon = self.config.horizon_years;
        let mut seed = Decision::new(household.start_year);
        seed.benefit_start_ages = self.config.benefit_start_ages.clone();
        validate_decisions(household, assumptions, std::slice::from_ref(&seed), horizon)?;

        let planner = YearPlanner::new(&self.engine, household, assumptions);
        let start = PlanState::from_household(household)
            .with_benefit_elections(self.config.benefit_start_ages.clone());

        let (path, search) = match strategy {
            Strategy::Greedy => {
                let path = greedy::solve_greedy(&planner, start, horizon, cancel)?;
                let search = heuristic_report(horizon);
                (path, search)
            }
            Strategy::RrspOnly { kind } => {
                let path = greedy::solve_single_kind(&planner, start, horizon, *kind, cancel)?;
                (path, heuristic_report(horizon))
            }
            Strategy::DpBeam(config) => {
                config.validate()?;
                let incumbent = greedy::solve_greedy(&planner, start.clone(), horizon, cancel)?;
                let (found, search) = beam::solve(&planner, start, horizon, config, cancel)?;
                if beam::better(&found, &incumbent) {
                    (found, search)
                } else {
                    (incumbent, search)
                }
            }
        };

        cancel.check()?;
        let schedule = self.schedule_from(household, &path);
        let projection = self
            .engine
            .run_projection(household, assumptions, &schedule, horizon)?;

        let mut notes = projection.warnings;
        if let Strategy::DpBeam(_) = strategy {
            if search.budget_exhausted {
                notes.push(PlanWarning::SearchBudgetExceeded {
                    evaluations: search.evaluations,
                });
            }
            if !search.proven_optimal {
                let reason = if search.budget_exhausted {
                    "evaluation budget exhausted".to_string()
                } else {
                    format!("{} partial path(s) pruned by beam width", search.pruned_by_width)
                };
                notes.push(PlanWarning::NotProvenOptimal { reason });
            }
        }

        info!(
            "{} plan for {} years: total tax {:.2}, shortfall years {}",
            strategy.name(),
            horizon,
            projection.aggregates.total_tax,
            projection.aggregates.shortfall_years
        );

        Ok(OptimizationResult {
            strategy: strategy.clone(),
            schedule,
            total_tax: projection.aggregates.total_tax,
            timeline: projection.timeline,
            aggregates: projection.aggregates,
            search,
            notes,
        })
    }

    /// Replay `schedule` from the household's opening state, then fill every
    /// year after its last decision with the greedy policy until
    /// `horizon_years` decisions exist.
    ///
    /// Scheduled amounts are kept as requested even when the balances
    /// reached under `assumptions` can no longer fund them; the projection
    /// clips them.
    pub fn extend_schedule(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        schedule: &[Decision],
        horizon_years: u32,
    ) -> Result<Vec<Decision>> {
        validate_decisions(household, assumptions, schedule, horizon_years)?;

        let planner = YearPlanner::new(&self.engine, household, assumptions);
        let by_year: BTreeMap<i32, &Decision> = schedule.iter().map(|d| (d.year, d)).collect();
        let last_scheduled = by_year
            .keys()
            .next_back()
            .copied()
            .unwrap_or(household.start_year - 1);

        let mut state = PlanState::from_household(household);
        let mut extended = Vec::with_capacity(horizon_years as usize);
        for _ in 0..horizon_years {
            let decision = if state.year <= last_scheduled {
                by_year
                    .get(&state.year)
                    .map(|d| (*d).clone())
                    .unwrap_or_else(|| Decision::new(state.year))
            } else {
                let amounts = planner.cascade(&state, vec![0.0; household.accounts.len()])?;
                Decision::from_amounts(state.year, household, &amounts)
            };
            let (_, next) = self
                .engine
                .step_year(household, assumptions, &state, Some(&decision))?;
            extended.push(decision);
            state = next;
        }

        debug!(
            "extended {} scheduled year(s) to {} with greedy fill",
            schedule.len(),
            horizon_years
        );
        Ok(extended)
    }

    fn schedule_from(&self, household: &Household, path: &Path) -> Vec<Decision> {
        let mut schedule: Vec<Decision> = path
            .amounts
            .iter()
            .enumerate()
            .map(|(k, amounts)| Decision::from_amounts(household.start_year + k as i32, household, amounts))
            .collect();
        if let Some(first) = schedule.first_mut() {
            first.benefit_start_ages = self.config.benefit_start_ages.clone();
        }
        schedule
    }
}

fn heuristic_report(horizon: u32) -> SearchReport {
    SearchReport {
        evaluations: horizon as u64,
        ..SearchReport::default()
    }
}
