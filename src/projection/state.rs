//! Per-year decision, carried state and recorded year outcome

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::benefits::BenefitStartAges;
use crate::household::{AccountId, Household};
use crate::tax::TaxBreakdown;

/// Withdrawals (and optional benefit elections) chosen for one plan year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub year: i32,

    /// Gross withdrawal per account; missing accounts withdraw nothing
    #[serde(default)]
    pub withdrawals: BTreeMap<AccountId, f64>,

    /// Start-age elections per person; the first decision carrying them wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefit_start_ages: Option<Vec<BenefitStartAges>>,
}

impl Decision {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            withdrawals: BTreeMap::new(),
            benefit_start_ages: None,
        }
    }

    pub fn with_withdrawal(mut self, account: impl Into<String>, amount: f64) -> Self {
        self.withdrawals.insert(AccountId::new(account), amount);
        self
    }

    pub fn withdrawal(&self, account: &AccountId) -> f64 {
        self.withdrawals.get(account).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.withdrawals.values().sum()
    }

    /// Build from amounts aligned with `household.accounts`, dropping zeros
    pub fn from_amounts(year: i32, household: &Household, amounts: &[f64]) -> Self {
        let withdrawals = household
            .accounts
            .iter()
            .zip(amounts)
            .filter(|(_, amount)| **amount > 0.0)
            .map(|(account, amount)| (account.id.clone(), *amount))
            .collect();
        Self {
            year,
            withdrawals,
            benefit_start_ages: None,
        }
    }

    /// Amounts aligned with `household.accounts`
    pub fn amounts(&self, household: &Household) -> Vec<f64> {
        household
            .accounts
            .iter()
            .map(|account| self.withdrawal(&account.id))
            .collect()
    }
}

/// State carried between plan years, aligned with `household.accounts`
#[derive(Debug, Clone, PartialEq)]
pub struct PlanState {
    /// Calendar year about to be simulated
    pub year: i32,

    /// Zero-based plan year about to be simulated
    pub offset: usize,

    pub balances: Vec<f64>,

    /// Adjusted cost base per account (zero for non-taxable accounts)
    pub cost_basis: Vec<f64>,

    pub benefit_elections: Option<Vec<BenefitStartAges>>,
}

impl PlanState {
    /// State at the start of the plan
    pub fn from_household(household: &Household) -> Self {
        Self {
            year: household.start_year,
            offset: 0,
            balances: household.accounts.iter().map(|a| a.balance).collect(),
            cost_basis: household
                .accounts
                .iter()
                .map(|a| a.initial_cost_basis())
                .collect(),
            benefit_elections: None,
        }
    }

    pub fn with_benefit_elections(mut self, elections: Option<Vec<BenefitStartAges>>) -> Self {
        self.benefit_elections = elections;
        self
    }

    pub fn total_balance(&self) -> f64 {
        self.balances.iter().sum()
    }

    /// Every account is empty (a household with no accounts never counts as depleted)
    pub fn all_depleted(&self) -> bool {
        !self.balances.is_empty() && self.balances.iter().all(|b| *b <= 0.0)
    }

    /// Balances then cost bases rounded to the cent, for dominance comparisons.
    /// Two states share a key only when their future tax is identical too.
    pub fn dominance_key(&self) -> Vec<i64> {
        self.balances
            .iter()
            .chain(&self.cost_basis)
            .map(|b| (b * 100.0).round() as i64)
            .collect()
    }
}

/// Everything computed for one simulated year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearState {
    pub year: i32,
    pub ages: Vec<u32>,
    pub opening_balances: BTreeMap<AccountId, f64>,

    /// Withdrawals actually taken, after clipping
    pub withdrawals: BTreeMap<AccountId, f64>,

    /// Income from all active sources
    pub guaranteed_income: f64,

    /// Gain realized on taxable-account withdrawals (before inclusion)
    pub realized_gains: f64,

    /// Sum of every filer's taxable income
    pub taxable_income: f64,
    pub total_tax: f64,
    pub tax: TaxBreakdown,

    /// Guaranteed income plus all withdrawals
    pub gross_income: f64,
    pub net_cash_flow: f64,
    pub need: f64,
    pub closing_balances: BTreeMap<AccountId, f64>,
    pub shortfall: bool,
    pub shortfall_amount: f64,
    pub clipped: bool,
}

impl YearState {
    pub fn total_withdrawals(&self) -> f64 {
        self.withdrawals.values().sum()
    }

    pub fn closing_total(&self) -> f64 {
        self.closing_balances.values().sum()
    }

    /// Portion of the need covered by net cash flow
    pub fn covered_need(&self) -> f64 {
        self.net_cash_flow.clamp(0.0, self.need.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::{Account, AccountKind, Person};
    use crate::tax::Jurisdiction;

    fn household() -> Household {
        Household::new(
            vec![Person::new("a", 1960)],
            vec![
                Account::new("rrsp", 0, AccountKind::TaxDeferred, 1_000.0),
                Account::new("cash", 0, AccountKind::Taxable, 500.0).with_cost_basis(200.0),
            ],
            Jurisdiction::ontario(),
            10_000.0,
            2025,
        )
    }

    #[test]
    fn test_initial_state() {
        let state = PlanState::from_household(&household());
        assert_eq!(state.year, 2025);
        assert_eq!(state.balances, vec![1_000.0, 500.0]);
        assert_eq!(state.cost_basis, vec![0.0, 200.0]);
        assert!(!state.all_depleted());
        assert_eq!(state.dominance_key(), vec![100_000, 50_000, 0, 20_000]);
    }

    #[test]
    fn test_dominance_key_separates_unrealized_gains() {
        let state = PlanState::from_household(&household());
        let mut lower_basis = state.clone();
        lower_basis.cost_basis[1] = 50.0;

        assert_eq!(state.balances, lower_basis.balances);
        assert_ne!(state.dominance_key(), lower_basis.dominance_key());
    }

    #[test]
    fn test_decision_amount_alignment() {
        let household = household();
        let decision = Decision::new(2025).with_withdrawal("cash", 120.0);
        assert_eq!(decision.amounts(&household), vec![0.0, 120.0]);

        let rebuilt = Decision::from_amounts(2025, &household, &[0.0, 120.0]);
        assert_eq!(rebuilt, decision);
        assert_eq!(rebuilt.total(), 120.0);
    }

    #[test]
    fn test_empty_household_never_depleted() {
        let mut state = PlanState::from_household(&household());
        state.balances = vec![0.0, 0.0];
        assert!(state.all_depleted());
        state.balances.clear();
        assert!(!state.all_depleted());
    }
}
