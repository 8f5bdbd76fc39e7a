//! Single-year withdrawal fill shared by every strategy
//!
//! Each stage raises one account's withdrawal until the year's net cash
//! flow covers the need, evaluating candidates through the projection
//! engine so the solved amounts are exactly what a replay produces.

use crate::assumptions::Assumptions;
use crate::error::Result;
use crate::household::{AccountKind, Household};
use crate::projection::{PlanState, ProjectionEngine, YearState};

use super::types::CancellationToken;

/// Stop refining once the solved withdrawal is within this many dollars
const AMOUNT_TOLERANCE: f64 = 0.005;

/// Accept a fill once net cash exceeds need by at most this much
const SURPLUS_TOLERANCE: f64 = 0.005;

const MAX_FILL_ITERATIONS: usize = 60;

/// Evaluates and fills one plan year at a time
pub(crate) struct YearPlanner<'a> {
    pub engine: &'a ProjectionEngine,
    pub household: &'a Household,
    pub assumptions: &'a Assumptions,
}

impl<'a> YearPlanner<'a> {
    pub fn new(
        engine: &'a ProjectionEngine,
        household: &'a Household,
        assumptions: &'a Assumptions,
    ) -> Self {
        Self {
            engine,
            household,
            assumptions,
        }
    }

    pub fn evaluate(&self, state: &PlanState, amounts: &[f64]) -> Result<(YearState, PlanState)> {
        self.engine
            .step_amounts(self.household, self.assumptions, state, amounts)
    }

    /// Net cash flow minus need
    fn gap(&self, state: &PlanState, amounts: &[f64]) -> Result<f64> {
        let (year, _) = self.evaluate(state, amounts)?;
        Ok(year.net_cash_flow - year.need)
    }

    fn indices(&self, kinds: &[AccountKind]) -> Vec<usize> {
        self.household
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, account)| kinds.contains(&account.kind))
            .map(|(i, _)| i)
            .collect()
    }

    /// Raise `amounts[index]` toward `cap` until need is covered.
    /// Returns true when the year is covered.
    fn fill(&self, state: &PlanState, amounts: &mut [f64], index: usize, cap: f64) -> Result<bool> {
        let start = amounts[index];
        let f_start = self.gap(state, amounts)?;
        if f_start >= 0.0 {
            return Ok(true);
        }
        if cap <= start {
            return Ok(false);
        }

        amounts[index] = cap;
        let f_cap = self.gap(state, amounts)?;
        if f_cap < 0.0 {
            return Ok(false);
        }

        // Illinois regula falsi; `hi` always covers the need
        let (mut lo, mut hi) = (start, cap);
        let (mut f_lo, mut f_hi) = (f_start, f_cap);
        let mut last_side = 0i8;

        for _ in 0..MAX_FILL_ITERATIONS {
            if hi - lo <= AMOUNT_TOLERANCE || f_hi <= SURPLUS_TOLERANCE {
                break;
            }
            let mut x = hi - f_hi * (hi - lo) / (f_hi - f_lo);
            if !x.is_finite() || x <= lo || x >= hi {
                x = 0.5 * (lo + hi);
            }

            amounts[index] = x;
            let fx = self.gap(state, amounts)?;
            if fx >= 0.0 {
                hi = x;
                f_hi = fx;
                if last_side == 1 {
                    f_lo *= 0.5;
                }
                last_side = 1;
            } else {
                lo = x;
                f_lo = fx;
                if last_side == -1 {
                    f_hi *= 0.5;
                }
                last_side = -1;
            }
        }

        amounts[index] = hi;
        Ok(true)
    }

    /// Priority cascade on top of `amounts`: taxable, registered up to the
    /// federal bracket top, tax-free, then registered beyond the bracket
    pub fn cascade(&self, state: &PlanState, mut amounts: Vec<f64>) -> Result<Vec<f64>> {
        for i in self.indices(&[AccountKind::Taxable]) {
            if self.fill(state, &mut amounts, i, state.balances[i])? {
                return Ok(amounts);
            }
        }

        let registered = self.indices(&[AccountKind::TaxDeferred, AccountKind::Pension]);
        let ctx = self
            .engine
            .tax_context(self.household, self.assumptions, state.year);

        for &i in &registered {
            let (year, _) = self.evaluate(state, &amounts)?;
            let owner_income = match self.household.accounts[i].owner {
                0 => year.tax.primary.taxable_income,
                _ => year
                    .tax
                    .spouse
                    .as_ref()
                    .map(|s| s.taxable_income)
                    .unwrap_or(0.0),
            };
            let room = self
                .engine
                .tax_engine()
                .federal_bracket_room(owner_income, &ctx)?;
            let cap = (amounts[i] + room).min(state.balances[i]);
            if self.fill(state, &mut amounts, i, cap)? {
                return Ok(amounts);
            }
        }

        for i in self.indices(&[AccountKind::TaxFree]) {
            if self.fill(state, &mut amounts, i, state.balances[i])? {
                return Ok(amounts);
            }
        }

        for &i in &registered {
            if self.fill(state, &mut amounts, i, state.balances[i])? {
                return Ok(amounts);
            }
        }

        Ok(amounts)
    }

    /// Draw only from accounts of `kind`, in account order
    pub fn single_kind(&self, state: &PlanState, kind: AccountKind) -> Result<Vec<f64>> {
        let mut amounts = vec![0.0; self.household.accounts.len()];
        for i in self.indices(&[kind]) {
            if self.fill(state, &mut amounts, i, state.balances[i])? {
                break;
            }
        }
        Ok(amounts)
    }
}

/// A complete path: per-year amounts plus the search-time totals
#[derive(Debug, Clone)]
pub(crate) struct Path {
    pub amounts: Vec<Vec<f64>>,
    pub total_tax: f64,
    pub unmet: f64,
}

/// Follow a per-year policy from `state` to the end of the horizon
pub(crate) fn roll_out<F>(
    planner: &YearPlanner<'_>,
    mut state: PlanState,
    years: u32,
    cancel: &CancellationToken,
    mut policy: F,
) -> Result<(Path, PlanState)>
where
    F: FnMut(&YearPlanner<'_>, &PlanState) -> Result<Vec<f64>>,
{
    let mut path = Path {
        amounts: Vec::with_capacity(years as usize),
        total_tax: 0.0,
        unmet: 0.0,
    };

    for _ in 0..years {
        cancel.check()?;
        let amounts = policy(planner, &state)?;
        let (year, next) = planner.evaluate(&state, &amounts)?;
        path.total_tax += year.total_tax;
        path.unmet += year.shortfall_amount;
        path.amounts.push(amounts);
        state = next;
    }

    Ok((path, state))
}

/// Greedy priority policy over the whole horizon
pub(crate) fn solve_greedy(
    planner: &YearPlanner<'_>,
    start: PlanState,
    years: u32,
    cancel: &CancellationToken,
) -> Result<Path> {
    let accounts = planner.household.accounts.len();
    roll_out(planner, start, years, cancel, |p, state| {
        p.cascade(state, vec![0.0; accounts])
    })
    .map(|(path, _)| path)
}

/// Single account-kind policy over the whole horizon
pub(crate) fn solve_single_kind(
    planner: &YearPlanner<'_>,
    start: PlanState,
    years: u32,
    kind: AccountKind,
    cancel: &CancellationToken,
) -> Result<Path> {
    roll_out(planner, start, years, cancel, |p, state| p.single_kind(state, kind))
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::{Account, IncomeSource, IncomeSourceKind, Person};
    use crate::tax::{Jurisdiction, TaxPolicy};
    use std::sync::Arc;

    fn engine() -> ProjectionEngine {
        ProjectionEngine::new(Arc::new(TaxPolicy::embedded().unwrap()))
    }

    fn household() -> Household {
        Household::new(
            vec![Person::new("kim", 1956)],
            vec![
                Account::new("tfsa", 0, AccountKind::TaxFree, 60_000.0),
                Account::new("rrsp", 0, AccountKind::TaxDeferred, 400_000.0),
                Account::new("cash", 0, AccountKind::Taxable, 20_000.0).with_cost_basis(15_000.0),
            ],
            Jurisdiction::alberta(),
            50_000.0,
            2025,
        )
        .with_income(IncomeSource::new("cpp", 0, IncomeSourceKind::Cpp, 11_000.0, 2025))
    }

    #[test]
    fn test_cascade_covers_need_exactly() {
        let engine = engine();
        let household = household();
        let assumptions = Assumptions::default();
        let planner = YearPlanner::new(&engine, &household, &assumptions);
        let state = PlanState::from_household(&household);

        let amounts = planner.cascade(&state, vec![0.0; 3]).unwrap();
        let (year, _) = planner.evaluate(&state, &amounts).unwrap();

        assert!(!year.shortfall);
        assert!(year.net_cash_flow - year.need < 0.01);
        // Taxable drained first, then the RRSP, TFSA untouched
        assert_eq!(amounts[2], 20_000.0);
        assert!(amounts[1] > 0.0);
        assert_eq!(amounts[0], 0.0);
    }

    #[test]
    fn test_single_kind_only_touches_that_kind() {
        let engine = engine();
        let household = household();
        let assumptions = Assumptions::default();
        let planner = YearPlanner::new(&engine, &household, &assumptions);
        let state = PlanState::from_household(&household);

        let amounts = planner.single_kind(&state, AccountKind::TaxFree).unwrap();
        assert!(amounts[0] > 0.0);
        assert_eq!(amounts[1], 0.0);
        assert_eq!(amounts[2], 0.0);
    }

    #[test]
    fn test_fill_reports_uncoverable_year() {
        let engine = engine();
        let mut household = household();
        household.target_annual_need = 1_000_000.0;
        let assumptions = Assumptions::default();
        let planner = YearPlanner::new(&engine, &household, &assumptions);
        let state = PlanState::from_household(&household);

        let amounts = planner.cascade(&state, vec![0.0; 3]).unwrap();
        assert_eq!(amounts, vec![60_000.0, 400_000.0, 20_000.0]);
        let (year, _) = planner.evaluate(&state, &amounts).unwrap();
        assert!(year.shortfall);
        assert!(!year.clipped);
    }
}
