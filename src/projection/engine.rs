//! Core projection engine for annual decumulation timelines
//!
//! Convention: withdrawals come out at the start of the year, the remainder
//! grows for the full year. `step_year` is the single source of truth for a
//! year's numbers; the optimizer evaluates candidates through it as well.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};

use super::benefits::{
    self, BenefitRules, BenefitStartAges, NoAdjustment, CPP_EARLIEST_AGE, LATEST_START_AGE,
    OAS_EARLIEST_AGE,
};
use super::state::{Decision, PlanState, YearState};
use super::timeline::Projection;
use crate::assumptions::Assumptions;
use crate::error::{PlanWarning, PlannerError, Result};
use crate::household::{AccountKind, Household, IncomeSourceKind};
use crate::tax::{CreditProfile, FilerIncome, IncomeKind, TaxContext, TaxEngine, TaxPolicy};

/// Net cash may fall this far below need before the year counts as short
pub const SHORTFALL_TOLERANCE: f64 = 0.005;

/// Age from which registered withdrawals count as eligible pension income
const PENSION_INCOME_AGE: u32 = 65;

/// Main projection engine
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    tax: TaxEngine,
    benefits: Arc<dyn BenefitRules>,
}

impl ProjectionEngine {
    /// Engine with timing-only benefit rules
    pub fn new(policy: Arc<TaxPolicy>) -> Self {
        Self {
            tax: TaxEngine::new(policy),
            benefits: Arc::new(NoAdjustment),
        }
    }

    pub fn with_benefit_rules(mut self, rules: Arc<dyn BenefitRules>) -> Self {
        self.benefits = rules;
        self
    }

    pub fn tax_engine(&self) -> &TaxEngine {
        &self.tax
    }

    /// Tax context for a plan year under the given assumptions
    pub fn tax_context(&self, household: &Household, assumptions: &Assumptions, year: i32) -> TaxContext {
        TaxContext::new(
            household.jurisdiction.clone(),
            assumptions.policy_year(household.start_year),
        )
        .indexed(assumptions.threshold_index(year, household.start_year))
    }

    /// Project `horizon_years` of the plan under a fixed decision schedule
    pub fn run_projection(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        decisions: &[Decision],
        horizon_years: u32,
    ) -> Result<Projection> {
        validate_decisions(household, assumptions, decisions, horizon_years)?;

        let by_year: BTreeMap<i32, &Decision> = decisions.iter().map(|d| (d.year, d)).collect();
        let inflation = assumptions.inflation();

        let mut state = PlanState::from_household(household);
        let mut timeline = Vec::with_capacity(horizon_years as usize);
        let mut clip_warnings = Vec::new();
        let mut unfunded_years = 0;
        let mut unfunded_need = 0.0;

        for offset in 0..horizon_years {
            let decision = by_year.get(&state.year).copied();
            let requested = decision
                .map(|d| d.amounts(household))
                .unwrap_or_else(|| vec![0.0; household.accounts.len()]);
            let elections = decision.and_then(|d| d.benefit_start_ages.as_deref());

            let (year_state, next) =
                self.advance(household, assumptions, &state, &requested, elections, Some(&mut clip_warnings))?;

            let stop = next.all_depleted() && year_state.shortfall;
            timeline.push(year_state);
            state = next;

            if stop {
                unfunded_years = horizon_years - offset - 1;
                unfunded_need = (0..unfunded_years as i32)
                    .map(|k| household.need_for(state.year + k, inflation))
                    .sum();
                debug!(
                    "all accounts depleted in {}; {} year(s) left unfunded",
                    state.year - 1,
                    unfunded_years
                );
                break;
            }
        }

        let liability = self.terminal_deferred_liability(household, assumptions, &state)?;
        let mut projection =
            Projection::from_timeline(timeline, unfunded_years, unfunded_need, liability);
        clip_warnings.append(&mut projection.warnings);
        projection.warnings = clip_warnings;

        debug!(
            "projected {} of {} years: total tax {:.2}, shortfall years {}",
            projection.timeline.len(),
            horizon_years,
            projection.aggregates.total_tax,
            projection.aggregates.shortfall_years
        );

        Ok(projection)
    }

    /// Simulate one year from `state` under an optional decision
    pub fn step_year(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        state: &PlanState,
        decision: Option<&Decision>,
    ) -> Result<(YearState, PlanState)> {
        let requested = decision
            .map(|d| d.amounts(household))
            .unwrap_or_else(|| vec![0.0; household.accounts.len()]);
        let elections = decision.and_then(|d| d.benefit_start_ages.as_deref());
        self.advance(household, assumptions, state, &requested, elections, None)
    }

    /// Simulate one year with withdrawals aligned to `household.accounts`
    pub fn step_amounts(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        state: &PlanState,
        amounts: &[f64],
    ) -> Result<(YearState, PlanState)> {
        self.advance(household, assumptions, state, amounts, None, None)
    }

    fn advance(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        state: &PlanState,
        requested: &[f64],
        new_elections: Option<&[BenefitStartAges]>,
        mut clip_log: Option<&mut Vec<PlanWarning>>,
    ) -> Result<(YearState, PlanState)> {
        let year = state.year;
        let inflation = assumptions.inflation();
        let elections = state
            .benefit_elections
            .clone()
            .or_else(|| new_elections.map(|ages| ages.to_vec()));

        let ages = household.ages_in(year);
        let mut filers: Vec<FilerIncome> = ages
            .iter()
            .map(|age| FilerIncome::new(CreditProfile::new(*age)))
            .collect();
        if filers.is_empty() {
            return Err(PlannerError::invalid("people", "household has no members"));
        }

        let mut opening_balances = BTreeMap::new();
        let mut withdrawals = BTreeMap::new();
        let mut closing_balances = BTreeMap::new();
        let mut balances = Vec::with_capacity(household.accounts.len());
        let mut cost_basis = state.cost_basis.clone();
        let mut clipped = false;
        let mut total_withdrawn = 0.0;
        let mut realized_gains = 0.0;

        for (i, account) in household.accounts.iter().enumerate() {
            let available = state.balances.get(i).copied().unwrap_or(0.0).max(0.0);
            let wanted = requested.get(i).copied().unwrap_or(0.0).max(0.0);
            let taken = wanted.min(available);

            if wanted > available {
                clipped = true;
                warn!(
                    "{}: withdrawal of {:.2} from {} clipped to balance {:.2}",
                    year, wanted, account.id, available
                );
                if let Some(log) = clip_log.as_deref_mut() {
                    log.push(PlanWarning::Clipped {
                        year,
                        account_id: account.id.to_string(),
                        requested: wanted,
                        available,
                    });
                }
            }

            let owner_age = ages.get(account.owner).copied().unwrap_or(0);
            let filer = filers
                .get_mut(account.owner)
                .ok_or_else(|| PlannerError::invalid("accounts.owner", format!("{} has no owner", account.id)))?;

            match account.kind {
                AccountKind::TaxDeferred if owner_age >= PENSION_INCOME_AGE => {
                    filer.push(IncomeKind::Pension, taken)
                }
                AccountKind::TaxDeferred => filer.push(IncomeKind::OrdinaryWithdrawal, taken),
                AccountKind::Pension => filer.push(IncomeKind::Pension, taken),
                AccountKind::TaxFree => filer.push(IncomeKind::TaxFree, taken),
                AccountKind::Taxable => {
                    if taken > 0.0 && available > 0.0 {
                        let basis = cost_basis.get(i).copied().unwrap_or(0.0);
                        let basis_used = basis * (taken / available);
                        let gain = (taken - basis_used).max(0.0);
                        if let Some(slot) = cost_basis.get_mut(i) {
                            *slot = (basis - basis_used).max(0.0);
                        }
                        realized_gains += gain;
                        filer.push(IncomeKind::CapitalGain, gain);
                        filer.push(IncomeKind::TaxFree, taken - gain);
                    }
                }
            }

            let growth = assumptions
                .return_override(state.offset)
                .unwrap_or_else(|| account.growth_rate());
            let closing = ((available - taken) * (1.0 + growth)).max(0.0);

            total_withdrawn += taken;
            opening_balances.insert(account.id.clone(), available);
            withdrawals.insert(account.id.clone(), taken);
            closing_balances.insert(account.id.clone(), closing);
            balances.push(closing);
        }

        let mut guaranteed_income = 0.0;
        for source in &household.income_sources {
            let Some(owner) = household.people.get(source.owner) else {
                continue;
            };
            let amount = benefits::source_amount(
                source,
                owner,
                elections.as_deref(),
                self.benefits.as_ref(),
                year,
                household.start_year,
                inflation,
            );
            if amount <= 0.0 {
                continue;
            }
            guaranteed_income += amount;

            let age = ages.get(source.owner).copied().unwrap_or(0);
            let kind = match source.kind {
                IncomeSourceKind::Employment => IncomeKind::Employment,
                IncomeSourceKind::Cpp | IncomeSourceKind::Other => IncomeKind::Ordinary,
                IncomeSourceKind::Oas => IncomeKind::Oas,
                IncomeSourceKind::EmployerPension => IncomeKind::Pension,
                IncomeSourceKind::Annuity if age >= PENSION_INCOME_AGE => IncomeKind::Pension,
                IncomeSourceKind::Annuity => IncomeKind::Ordinary,
            };
            if let Some(filer) = filers.get_mut(source.owner) {
                filer.push(kind, amount);
            }
        }

        let ctx = self.tax_context(household, assumptions, year);
        let tax_engine = self.tax.clone().with_split_steps(assumptions.split_steps);
        let result = tax_engine.compute_annual_tax(&filers[0], filers.get(1), &ctx)?;

        let taxable_income = result.breakdown.primary.taxable_income
            + result
                .breakdown
                .spouse
                .as_ref()
                .map(|s| s.taxable_income)
                .unwrap_or(0.0);

        let gross_income = guaranteed_income + total_withdrawn;
        let net_cash_flow = gross_income - result.total_tax;
        let need = household.need_for(year, inflation);
        let shortfall_amount = if net_cash_flow < need - SHORTFALL_TOLERANCE {
            need - net_cash_flow
        } else {
            0.0
        };

        let year_state = YearState {
            year,
            ages,
            opening_balances,
            withdrawals,
            guaranteed_income,
            realized_gains,
            taxable_income,
            total_tax: result.total_tax,
            tax: result.breakdown,
            gross_income,
            net_cash_flow,
            need,
            closing_balances,
            shortfall: shortfall_amount > 0.0 || clipped,
            shortfall_amount,
            clipped,
        };

        let next = PlanState {
            year: year + 1,
            offset: state.offset + 1,
            balances,
            cost_basis,
            benefit_elections: elections,
        };

        Ok((year_state, next))
    }

    /// Tax if remaining registered balances were all deemed income in the final simulated year
    fn terminal_deferred_liability(
        &self,
        household: &Household,
        assumptions: &Assumptions,
        final_state: &PlanState,
    ) -> Result<f64> {
        let year = final_state.year - 1;
        let mut filers: Vec<FilerIncome> = household
            .ages_in(year)
            .into_iter()
            .map(|age| FilerIncome::new(CreditProfile::new(age)))
            .collect();

        let mut any = false;
        for (account, balance) in household.accounts.iter().zip(&final_state.balances) {
            if account.kind.is_registered() && *balance > 0.0 {
                if let Some(filer) = filers.get_mut(account.owner) {
                    filer.push(IncomeKind::OrdinaryWithdrawal, *balance);
                    any = true;
                }
            }
        }
        if !any || filers.is_empty() {
            return Ok(0.0);
        }

        let ctx = self.tax_context(household, assumptions, year);
        let engine = self.tax.clone().with_split_steps(0);
        Ok(engine.compute_annual_tax(&filers[0], filers.get(1), &ctx)?.total_tax)
    }
}

/// Boundary checks on everything a projection consumes
pub fn validate_decisions(
    household: &Household,
    assumptions: &Assumptions,
    decisions: &[Decision],
    horizon_years: u32,
) -> Result<()> {
    household.validate()?;
    assumptions.validate()?;

    if horizon_years == 0 {
        return Err(PlannerError::invalid("horizon_years", "must be at least 1"));
    }

    let mut years = HashSet::new();
    for decision in decisions {
        let field = format!("decisions[{}]", decision.year);
        if !years.insert(decision.year) {
            return Err(PlannerError::invalid(field, "more than one decision for the year"));
        }
        if decision.year < household.start_year {
            return Err(PlannerError::invalid(
                field,
                format!("year precedes plan start {}", household.start_year),
            ));
        }
        for (account, amount) in &decision.withdrawals {
            if household.account(account).is_none() {
                return Err(PlannerError::invalid(field, format!("unknown account `{account}`")));
            }
            if !amount.is_finite() || *amount < 0.0 {
                return Err(PlannerError::invalid(
                    field,
                    format!("withdrawal {amount} from {account} must be non-negative"),
                ));
            }
        }
        if let Some(elections) = &decision.benefit_start_ages {
            if elections.len() > household.people.len() {
                return Err(PlannerError::invalid(
                    field,
                    "benefit elections for more people than the household has",
                ));
            }
            for ages in elections {
                if let Some(age) = ages.cpp_age {
                    if !(CPP_EARLIEST_AGE..=LATEST_START_AGE).contains(&age) {
                        return Err(PlannerError::invalid(
                            field,
                            format!("CPP start age {age} outside {CPP_EARLIEST_AGE}-{LATEST_START_AGE}"),
                        ));
                    }
                }
                if let Some(age) = ages.oas_age {
                    if !(OAS_EARLIEST_AGE..=LATEST_START_AGE).contains(&age) {
                        return Err(PlannerError::invalid(
                            field,
                            format!("OAS start age {age} outside {OAS_EARLIEST_AGE}-{LATEST_START_AGE}"),
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}
