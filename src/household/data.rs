//! Household snapshot: people, accounts and guaranteed income streams

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::tax::Jurisdiction;

fn default_true() -> bool {
    true
}

/// Stable account identifier used as the key of every withdrawal map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Tax treatment of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// RRSP / RRIF: withdrawals fully taxable
    TaxDeferred,
    /// TFSA: withdrawals excluded from income
    TaxFree,
    /// Non-registered: only realized gains are taxed
    Taxable,
    /// LIF / LIRA style locked-in pension assets
    Pension,
}

impl AccountKind {
    /// Withdrawals are fully taxable as income
    pub fn is_registered(&self) -> bool {
        matches!(self, AccountKind::TaxDeferred | AccountKind::Pension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::TaxDeferred => "tax_deferred",
            AccountKind::TaxFree => "tax_free",
            AccountKind::Taxable => "taxable",
            AccountKind::Pension => "pension",
        }
    }
}

/// Kind of guaranteed income stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSourceKind {
    Employment,
    /// Canada/Quebec Pension Plan
    Cpp,
    /// Old Age Security
    Oas,
    /// Defined-benefit employer pension
    EmployerPension,
    Annuity,
    Other,
}

/// A household member. Index 0 in `Household::people` is the primary filer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub birth_year: i32,
}

impl Person {
    pub fn new(id: impl Into<String>, birth_year: i32) -> Self {
        Self {
            id: id.into(),
            birth_year,
        }
    }

    /// Age attained during `year`
    pub fn age_in(&self, year: i32) -> u32 {
        (year - self.birth_year).max(0) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Index into `Household::people`
    #[serde(default)]
    pub owner: usize,

    pub kind: AccountKind,

    /// Opening balance at plan start
    pub balance: f64,

    /// Nominal annual growth, in percent
    #[serde(default)]
    pub growth_rate_pct: f64,

    /// Adjusted cost base for taxable accounts; defaults to the balance
    #[serde(default)]
    pub cost_basis: Option<f64>,
}

impl Account {
    pub fn new(id: impl Into<String>, owner: usize, kind: AccountKind, balance: f64) -> Self {
        Self {
            id: AccountId::new(id),
            owner,
            kind,
            balance,
            growth_rate_pct: 0.0,
            cost_basis: None,
        }
    }

    pub fn with_growth(mut self, growth_rate_pct: f64) -> Self {
        self.growth_rate_pct = growth_rate_pct;
        self
    }

    pub fn with_cost_basis(mut self, cost_basis: f64) -> Self {
        self.cost_basis = Some(cost_basis);
        self
    }

    pub fn growth_rate(&self) -> f64 {
        self.growth_rate_pct / 100.0
    }

    /// Cost base at plan start; only meaningful for taxable accounts
    pub fn initial_cost_basis(&self) -> f64 {
        match self.kind {
            AccountKind::Taxable => self.cost_basis.unwrap_or(self.balance).max(0.0),
            _ => 0.0,
        }
    }
}

/// Guaranteed income stream, stated in plan-start-year dollars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub id: String,

    #[serde(default)]
    pub owner: usize,

    pub kind: IncomeSourceKind,

    /// Annual gross amount
    pub gross_amount: f64,

    /// First calendar year the stream pays
    pub start_year: i32,

    /// Last calendar year the stream pays (inclusive); open-ended if absent
    #[serde(default)]
    pub end_year: Option<i32>,

    #[serde(default = "default_true")]
    pub indexed_to_inflation: bool,
}

impl IncomeSource {
    pub fn new(
        id: impl Into<String>,
        owner: usize,
        kind: IncomeSourceKind,
        gross_amount: f64,
        start_year: i32,
    ) -> Self {
        Self {
            id: id.into(),
            owner,
            kind,
            gross_amount,
            start_year,
            end_year: None,
            indexed_to_inflation: true,
        }
    }

    pub fn ending(mut self, end_year: i32) -> Self {
        self.end_year = Some(end_year);
        self
    }

    pub fn unindexed(mut self) -> Self {
        self.indexed_to_inflation = false;
        self
    }

    pub fn is_active(&self, year: i32) -> bool {
        year >= self.start_year && self.end_year.map_or(true, |end| year <= end)
    }

    /// Nominal amount paid in `year`, indexed from `plan_start` where flagged
    pub fn amount_in(&self, year: i32, plan_start: i32, inflation: f64) -> f64 {
        if !self.is_active(year) {
            return 0.0;
        }
        if self.indexed_to_inflation {
            self.gross_amount * (1.0 + inflation).powi(year - plan_start)
        } else {
            self.gross_amount
        }
    }
}

/// Immutable household input; the engines clone, never mutate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub people: Vec<Person>,
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub income_sources: Vec<IncomeSource>,

    pub jurisdiction: Jurisdiction,

    /// After-tax spending need in plan-start-year dollars
    pub target_annual_need: f64,

    #[serde(default = "default_true")]
    pub need_indexed: bool,

    /// Explicit nominal need for particular years, replacing the target
    #[serde(default)]
    pub need_overrides: BTreeMap<i32, f64>,

    /// First calendar year of the plan
    pub start_year: i32,
}

impl Household {
    pub fn new(
        people: Vec<Person>,
        accounts: Vec<Account>,
        jurisdiction: Jurisdiction,
        target_annual_need: f64,
        start_year: i32,
    ) -> Self {
        Self {
            people,
            accounts,
            income_sources: Vec::new(),
            jurisdiction,
            target_annual_need,
            need_indexed: true,
            need_overrides: BTreeMap::new(),
            start_year,
        }
    }

    pub fn with_income(mut self, source: IncomeSource) -> Self {
        self.income_sources.push(source);
        self
    }

    pub fn primary(&self) -> Option<&Person> {
        self.people.first()
    }

    pub fn spouse(&self) -> Option<&Person> {
        self.people.get(1)
    }

    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.id == id)
    }

    pub fn ages_in(&self, year: i32) -> Vec<u32> {
        self.people.iter().map(|p| p.age_in(year)).collect()
    }

    /// Nominal after-tax need for `year`
    pub fn need_for(&self, year: i32, inflation: f64) -> f64 {
        if let Some(need) = self.need_overrides.get(&year) {
            return *need;
        }
        if self.need_indexed {
            self.target_annual_need * (1.0 + inflation).powi(year - self.start_year)
        } else {
            self.target_annual_need
        }
    }

    pub fn total_balance(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    /// Boundary validation; the engines assume a household that passed this
    pub fn validate(&self) -> Result<()> {
        if self.people.is_empty() || self.people.len() > 2 {
            return Err(PlannerError::invalid(
                "people",
                format!("household must have 1 or 2 people, found {}", self.people.len()),
            ));
        }

        let mut person_ids = HashSet::new();
        for person in &self.people {
            if !person_ids.insert(person.id.as_str()) {
                return Err(PlannerError::invalid(
                    "people.id",
                    format!("duplicate person id `{}`", person.id),
                ));
            }
        }

        if !self.target_annual_need.is_finite() || self.target_annual_need < 0.0 {
            return Err(PlannerError::invalid(
                "target_annual_need",
                format!("must be a non-negative amount, got {}", self.target_annual_need),
            ));
        }

        if let Some((year, need)) = self
            .need_overrides
            .iter()
            .find(|(_, need)| !need.is_finite() || **need < 0.0)
        {
            return Err(PlannerError::invalid(
                "need_overrides",
                format!("need for {year} must be non-negative, got {need}"),
            ));
        }

        let mut account_ids = HashSet::new();
        for account in &self.accounts {
            let field = format!("accounts[{}]", account.id);
            if !account_ids.insert(&account.id) {
                return Err(PlannerError::invalid(field, "duplicate account id"));
            }
            if account.owner >= self.people.len() {
                return Err(PlannerError::invalid(
                    field,
                    format!("owner {} does not exist", account.owner),
                ));
            }
            if !account.balance.is_finite() || account.balance < 0.0 {
                return Err(PlannerError::invalid(
                    field,
                    format!("balance must be non-negative, got {}", account.balance),
                ));
            }
            if !account.growth_rate_pct.is_finite() || account.growth_rate_pct <= -100.0 {
                return Err(PlannerError::invalid(
                    field,
                    format!("growth rate {}% must exceed -100%", account.growth_rate_pct),
                ));
            }
            if let Some(basis) = account.cost_basis {
                if !basis.is_finite() || basis < 0.0 {
                    return Err(PlannerError::invalid(
                        field,
                        format!("cost basis must be non-negative, got {basis}"),
                    ));
                }
            }
        }

        for source in &self.income_sources {
            let field = format!("income_sources[{}]", source.id);
            if source.owner >= self.people.len() {
                return Err(PlannerError::invalid(
                    field,
                    format!("owner {} does not exist", source.owner),
                ));
            }
            if !source.gross_amount.is_finite() || source.gross_amount < 0.0 {
                return Err(PlannerError::invalid(
                    field,
                    format!("amount must be non-negative, got {}", source.gross_amount),
                ));
            }
            if let Some(end) = source.end_year {
                if end < source.start_year {
                    return Err(PlannerError::invalid(
                        field,
                        format!("end year {end} precedes start year {}", source.start_year),
                    ));
                }
            }
        }

        Ok(())
    }
}
