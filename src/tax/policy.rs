//! Versioned bracket and credit tables keyed by (jurisdiction, year)

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::loader::{self, BracketRow, CreditRow};
use crate::error::{PlannerError, Result};

/// Table key for the federal schedule
pub const FEDERAL: &str = "FED";

/// Federal + one provincial jurisdiction, identified by province code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jurisdiction {
    province: String,
}

impl Jurisdiction {
    pub fn province(code: impl Into<String>) -> Self {
        Self {
            province: code.into().to_ascii_uppercase(),
        }
    }

    pub fn ontario() -> Self {
        Self::province("ON")
    }

    pub fn british_columbia() -> Self {
        Self::province("BC")
    }

    pub fn alberta() -> Self {
        Self::province("AB")
    }

    /// Province code, e.g. "ON"
    pub fn code(&self) -> &str {
        &self.province
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", FEDERAL, self.province)
    }
}

/// One progressive bracket: `rate` applies to income above `lower_bound`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub lower_bound: f64,
    pub rate: f64,
}

/// Progressive rate schedule, first bracket starts at zero, last is open-ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketSchedule {
    brackets: Vec<Bracket>,
}

impl BracketSchedule {
    /// Build a schedule, rejecting unsorted thresholds and out-of-range rates
    pub fn new(mut brackets: Vec<Bracket>) -> Result<Self> {
        brackets.sort_by(|a, b| a.lower_bound.total_cmp(&b.lower_bound));

        match brackets.first() {
            None => return Err(PlannerError::PolicyData("empty bracket schedule".into())),
            Some(first) if first.lower_bound != 0.0 => {
                return Err(PlannerError::PolicyData(format!(
                    "first bracket must start at 0, found {}",
                    first.lower_bound
                )))
            }
            Some(_) => {}
        }

        for pair in brackets.windows(2) {
            if pair[1].lower_bound <= pair[0].lower_bound {
                return Err(PlannerError::PolicyData(format!(
                    "duplicate bracket threshold {}",
                    pair[1].lower_bound
                )));
            }
        }

        if let Some(bad) = brackets
            .iter()
            .find(|b| !b.rate.is_finite() || !(0.0..1.0).contains(&b.rate))
        {
            return Err(PlannerError::PolicyData(format!(
                "bracket rate {} outside [0, 1)",
                bad.rate
            )));
        }

        Ok(Self { brackets })
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Gross tax on `income`, thresholds scaled by `index`
    pub fn tax(&self, income: f64, index: f64) -> f64 {
        let income = income.max(0.0);
        let mut tax = 0.0;
        for (i, bracket) in self.brackets.iter().enumerate() {
            let lower = bracket.lower_bound * index;
            if income <= lower {
                break;
            }
            let upper = self
                .brackets
                .get(i + 1)
                .map(|next| next.lower_bound * index)
                .unwrap_or(f64::INFINITY);
            tax += (income.min(upper) - lower) * bracket.rate;
        }
        tax
    }

    /// Rate applying to the next dollar above `income`
    pub fn marginal_rate(&self, income: f64, index: f64) -> f64 {
        let income = income.max(0.0);
        self.brackets
            .iter()
            .rev()
            .find(|b| income >= b.lower_bound * index)
            .map(|b| b.rate)
            .unwrap_or(0.0)
    }

    /// Upper threshold of the bracket `income` falls in; `None` in the top bracket
    pub fn bracket_ceiling(&self, income: f64, index: f64) -> Option<f64> {
        let income = income.max(0.0);
        self.brackets
            .iter()
            .map(|b| b.lower_bound * index)
            .find(|&lower| lower > income)
    }

    pub fn lowest_rate(&self) -> f64 {
        self.brackets.first().map(|b| b.rate).unwrap_or(0.0)
    }

    pub fn top_rate(&self) -> f64 {
        self.brackets.last().map(|b| b.rate).unwrap_or(0.0)
    }
}

/// Non-refundable credit parameters for one jurisdiction-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTable {
    /// Rate at which credit amounts convert to tax reductions
    pub credit_rate: f64,
    pub basic_personal: f64,
    /// Basic personal amount once fully phased down
    pub basic_personal_min: f64,
    pub bpa_phaseout_start: f64,
    pub bpa_phaseout_end: f64,
    pub age_amount: f64,
    pub age_threshold: f64,
    pub age_reduction_rate: f64,
    pub pension_amount: f64,
    pub dividend_gross_up: f64,
    /// Dividend tax credit as a fraction of the grossed-up dividend
    pub dividend_credit_rate: f64,
    /// OAS recovery threshold (federal only; zero elsewhere)
    pub oas_threshold: f64,
    pub oas_recovery_rate: f64,
}

impl CreditTable {
    /// Basic personal amount after the high-income phase-down
    pub fn basic_personal_amount(&self, net_income: f64, index: f64) -> f64 {
        let full = self.basic_personal * index;
        let floor = self.basic_personal_min * index;
        let start = self.bpa_phaseout_start * index;
        let end = self.bpa_phaseout_end * index;

        if end <= start || net_income <= start {
            full
        } else if net_income >= end {
            floor
        } else {
            full - (full - floor) * (net_income - start) / (end - start)
        }
    }

    /// Age amount, reduced by a share of net income above the threshold
    pub fn age_amount(&self, age: u32, net_income: f64, index: f64) -> f64 {
        if age < 65 {
            return 0.0;
        }
        let reduction = self.age_reduction_rate * (net_income - self.age_threshold * index).max(0.0);
        (self.age_amount * index - reduction).max(0.0)
    }

    /// Pension income amount, capped at eligible pension income
    pub fn pension_amount(&self, eligible_pension: f64, index: f64) -> f64 {
        eligible_pension.max(0.0).min(self.pension_amount * index)
    }

    /// OAS recovery tax, proportional above the threshold and capped at the benefit
    pub fn oas_recovery(&self, net_income: f64, oas_received: f64, index: f64) -> f64 {
        if self.oas_recovery_rate <= 0.0 || oas_received <= 0.0 {
            return 0.0;
        }
        let excess = (net_income - self.oas_threshold * index).max(0.0);
        (excess * self.oas_recovery_rate).min(oas_received)
    }
}

/// Brackets plus credits for a single jurisdiction-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionSchedule {
    pub brackets: BracketSchedule,
    pub credits: CreditTable,
}

/// Read-only tax dataset; lookups fail loudly when a pair is missing
#[derive(Debug, Clone, PartialEq)]
pub struct TaxPolicy {
    tables: BTreeMap<(String, i32), JurisdictionSchedule>,
}

impl TaxPolicy {
    /// Dataset compiled into the crate from `data/tax_policy/`
    pub fn embedded() -> Result<Self> {
        let brackets = loader::parse_brackets(loader::EMBEDDED_BRACKETS.as_bytes())?;
        let credits = loader::parse_credits(loader::EMBEDDED_CREDITS.as_bytes())?;
        Self::from_rows(brackets, credits)
    }

    /// Load an override dataset from a directory holding `brackets.csv` and `credits.csv`
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let (brackets, credits) = loader::load_from(path)?;
        Self::from_rows(brackets, credits)
    }

    pub fn from_rows(brackets: Vec<BracketRow>, credits: Vec<CreditRow>) -> Result<Self> {
        let mut grouped: BTreeMap<(String, i32), Vec<Bracket>> = BTreeMap::new();
        for row in brackets {
            grouped
                .entry((row.jurisdiction.to_ascii_uppercase(), row.year))
                .or_default()
                .push(Bracket {
                    lower_bound: row.lower_bound,
                    rate: row.rate,
                });
        }

        let mut tables = BTreeMap::new();
        for row in credits {
            let key = (row.jurisdiction.to_ascii_uppercase(), row.year);
            let bracket_list = grouped.remove(&key).ok_or_else(|| {
                PlannerError::PolicyData(format!("credits for {} {} have no brackets", key.0, key.1))
            })?;
            let schedule = JurisdictionSchedule {
                brackets: BracketSchedule::new(bracket_list)?,
                credits: row.into_table(),
            };
            if tables.insert(key.clone(), schedule).is_some() {
                return Err(PlannerError::PolicyData(format!(
                    "duplicate credit row for {} {}",
                    key.0, key.1
                )));
            }
        }

        if let Some((jurisdiction, year)) = grouped.keys().next() {
            return Err(PlannerError::PolicyData(format!(
                "brackets for {jurisdiction} {year} have no credit row"
            )));
        }

        Ok(Self { tables })
    }

    /// Schedule for a table key ("FED" or a province code)
    pub fn schedule(&self, code: &str, year: i32) -> Result<&JurisdictionSchedule> {
        self.tables
            .get(&(code.to_ascii_uppercase(), year))
            .ok_or_else(|| PlannerError::PolicyNotFound {
                jurisdiction: code.to_string(),
                year,
            })
    }

    pub fn brackets(&self, code: &str, year: i32) -> Result<&BracketSchedule> {
        self.schedule(code, year).map(|s| &s.brackets)
    }

    pub fn credits(&self, code: &str, year: i32) -> Result<&CreditTable> {
        self.schedule(code, year).map(|s| &s.credits)
    }

    /// Federal and provincial schedules for the jurisdiction, both required
    pub fn pair(
        &self,
        jurisdiction: &Jurisdiction,
        year: i32,
    ) -> Result<(&JurisdictionSchedule, &JurisdictionSchedule)> {
        Ok((
            self.schedule(FEDERAL, year)?,
            self.schedule(jurisdiction.code(), year)?,
        ))
    }

    /// Most recent year available for both halves of the jurisdiction
    pub fn latest_year(&self, jurisdiction: &Jurisdiction) -> Option<i32> {
        self.tables
            .keys()
            .filter(|(code, _)| code == jurisdiction.code())
            .map(|(_, year)| *year)
            .filter(|year| self.tables.contains_key(&(FEDERAL.to_string(), *year)))
            .max()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
