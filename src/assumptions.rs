//! Economic assumptions shared by projection, optimization and shock testing

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::tax::DEFAULT_SPLIT_STEPS;

fn default_inflation_pct() -> f64 {
    2.0
}

fn default_index_tax_brackets() -> bool {
    true
}

fn default_split_steps() -> u32 {
    DEFAULT_SPLIT_STEPS
}

/// Container for the economic inputs of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumptions {
    /// Annual inflation, in percent
    #[serde(default = "default_inflation_pct")]
    pub inflation_pct: f64,

    /// Per-year return replacing every account's growth rate, as a fraction.
    /// Entry `k` applies to plan year `start_year + k`.
    #[serde(default)]
    pub return_overrides: Vec<f64>,

    /// Tax-table vintage used for every projection year (defaults to the plan start year)
    #[serde(default)]
    pub tax_policy_year: Option<i32>,

    /// Scale bracket thresholds and credit amounts with inflation
    #[serde(default = "default_index_tax_brackets")]
    pub index_tax_brackets: bool,

    /// Grid intervals for the pension-splitting search
    #[serde(default = "default_split_steps")]
    pub split_steps: u32,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            inflation_pct: default_inflation_pct(),
            return_overrides: Vec::new(),
            tax_policy_year: None,
            index_tax_brackets: default_index_tax_brackets(),
            split_steps: default_split_steps(),
        }
    }
}

impl Assumptions {
    pub fn with_inflation(mut self, inflation_pct: f64) -> Self {
        self.inflation_pct = inflation_pct;
        self
    }

    pub fn with_return_overrides(mut self, returns: Vec<f64>) -> Self {
        self.return_overrides = returns;
        self
    }

    pub fn inflation(&self) -> f64 {
        self.inflation_pct / 100.0
    }

    /// Return override for the plan year at `offset`, if any
    pub fn return_override(&self, offset: usize) -> Option<f64> {
        self.return_overrides.get(offset).copied()
    }

    /// Tax year whose tables price a plan starting in `start_year`
    pub fn policy_year(&self, start_year: i32) -> i32 {
        self.tax_policy_year.unwrap_or(start_year)
    }

    /// Multiplier applied to thresholds in `year`
    pub fn threshold_index(&self, year: i32, start_year: i32) -> f64 {
        if self.index_tax_brackets {
            (1.0 + self.inflation()).powi((year - start_year).max(0))
        } else {
            1.0
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.inflation_pct.is_finite() || self.inflation_pct <= -100.0 {
            return Err(PlannerError::invalid(
                "inflation_pct",
                format!("must be finite and above -100, got {}", self.inflation_pct),
            ));
        }
        if let Some((offset, r)) = self
            .return_overrides
            .iter()
            .enumerate()
            .find(|(_, r)| !r.is_finite() || **r <= -1.0)
        {
            return Err(PlannerError::invalid(
                "return_overrides",
                format!("return {r} at offset {offset} must exceed -100%"),
            ));
        }
        Ok(())
    }
}
