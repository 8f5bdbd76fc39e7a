//! CSV-based tax policy loader
//!
//! Loads bracket and credit tables from `brackets.csv` / `credits.csv`. The
//! default dataset in data/tax_policy/ is compiled into the crate.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::policy::CreditTable;
use crate::error::{PlannerError, Result};

/// Default path to the tax policy directory
pub const DEFAULT_POLICY_PATH: &str = "data/tax_policy";

pub(crate) const EMBEDDED_BRACKETS: &str = include_str!("../../data/tax_policy/brackets.csv");
pub(crate) const EMBEDDED_CREDITS: &str = include_str!("../../data/tax_policy/credits.csv");

/// Raw CSV row matching brackets.csv columns
#[derive(Debug, Clone, Deserialize)]
pub struct BracketRow {
    pub jurisdiction: String,
    pub year: i32,
    pub lower_bound: f64,
    pub rate: f64,
}

/// Raw CSV row matching credits.csv columns
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRow {
    pub jurisdiction: String,
    pub year: i32,
    credit_rate: f64,
    basic_personal: f64,
    basic_personal_min: f64,
    bpa_phaseout_start: f64,
    bpa_phaseout_end: f64,
    age_amount: f64,
    age_threshold: f64,
    age_reduction_rate: f64,
    pension_amount: f64,
    dividend_gross_up: f64,
    dividend_credit_rate: f64,
    oas_threshold: f64,
    oas_recovery_rate: f64,
}

impl CreditRow {
    pub(crate) fn into_table(self) -> CreditTable {
        CreditTable {
            credit_rate: self.credit_rate,
            basic_personal: self.basic_personal,
            basic_personal_min: self.basic_personal_min,
            bpa_phaseout_start: self.bpa_phaseout_start,
            bpa_phaseout_end: self.bpa_phaseout_end,
            age_amount: self.age_amount,
            age_threshold: self.age_threshold,
            age_reduction_rate: self.age_reduction_rate,
            pension_amount: self.pension_amount,
            dividend_gross_up: self.dividend_gross_up,
            dividend_credit_rate: self.dividend_credit_rate,
            oas_threshold: self.oas_threshold,
            oas_recovery_rate: self.oas_recovery_rate,
        }
    }

    fn check(&self) -> Result<()> {
        let rates = [
            ("credit_rate", self.credit_rate),
            ("age_reduction_rate", self.age_reduction_rate),
            ("dividend_credit_rate", self.dividend_credit_rate),
            ("oas_recovery_rate", self.oas_recovery_rate),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(PlannerError::PolicyData(format!(
                    "{} {}: {name} {rate} outside [0, 1)",
                    self.jurisdiction, self.year
                )));
            }
        }
        if self.basic_personal_min > self.basic_personal {
            return Err(PlannerError::PolicyData(format!(
                "{} {}: basic_personal_min exceeds basic_personal",
                self.jurisdiction, self.year
            )));
        }
        Ok(())
    }
}

/// Parse bracket rows from any reader
pub fn parse_brackets<R: Read>(reader: R) -> Result<Vec<BracketRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in csv_reader.deserialize() {
        let row: BracketRow = result?;
        rows.push(row);
    }

    Ok(rows)
}

/// Parse credit rows from any reader
pub fn parse_credits<R: Read>(reader: R) -> Result<Vec<CreditRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for result in csv_reader.deserialize() {
        let row: CreditRow = result?;
        row.check()?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load both tables from a specific directory
pub fn load_from(path: &Path) -> Result<(Vec<BracketRow>, Vec<CreditRow>)> {
    let brackets = parse_brackets(File::open(path.join("brackets.csv"))?)?;
    let credits = parse_credits(File::open(path.join("credits.csv"))?)?;
    Ok((brackets, credits))
}
