//! Serializable plan output: JSON envelope and per-year CSV table

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlanWarning, Result};
use crate::household::AccountId;
use crate::optimizer::{OptimizationResult, SearchReport};
use crate::projection::{ProjectionAggregates, YearState};
use crate::robustness::RobustnessReport;
use crate::tax::TaxBreakdown;

pub const SCHEMA_VERSION: &str = "1.0";

/// One plan year as presented to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub year: i32,
    pub ages: Vec<u32>,
    pub withdrawals: BTreeMap<AccountId, f64>,
    pub guaranteed_income: f64,
    pub gross_income: f64,
    pub taxable_income: f64,
    pub total_tax: f64,
    pub tax: TaxBreakdown,
    pub net_cash_flow: f64,
    pub need: f64,
    pub shortfall: bool,
    pub shortfall_amount: f64,
    pub closing_balances: BTreeMap<AccountId, f64>,
}

impl From<&YearState> for ScheduleRow {
    fn from(year: &YearState) -> Self {
        Self {
            year: year.year,
            ages: year.ages.clone(),
            withdrawals: year.withdrawals.clone(),
            guaranteed_income: year.guaranteed_income,
            gross_income: year.gross_income,
            taxable_income: year.taxable_income,
            total_tax: year.total_tax,
            tax: year.tax.clone(),
            net_cash_flow: year.net_cash_flow,
            need: year.need,
            shortfall: year.shortfall,
            shortfall_amount: year.shortfall_amount,
            closing_balances: year.closing_balances.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    pub strategy: String,
    pub total_tax: f64,
    pub rows: Vec<ScheduleRow>,
    pub aggregates: ProjectionAggregates,
    pub search: SearchReport,

    #[serde(default)]
    pub notes: Vec<PlanWarning>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robustness: Option<RobustnessReport>,
}

impl PlanReport {
    pub fn from_result(result: &OptimizationResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: None,
            strategy: result.strategy.name().to_string(),
            total_tax: result.total_tax,
            rows: result.timeline.iter().map(ScheduleRow::from).collect(),
            aggregates: result.aggregates.clone(),
            search: result.search.clone(),
            notes: result.notes.clone(),
            robustness: None,
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessReport) -> Self {
        self.robustness = Some(robustness);
        self
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    /// Every account appearing in any row, sorted
    pub fn account_ids(&self) -> Vec<AccountId> {
        let ids: BTreeSet<&AccountId> = self
            .rows
            .iter()
            .flat_map(|row| row.withdrawals.keys().chain(row.closing_balances.keys()))
            .collect();
        ids.into_iter().cloned().collect()
    }
}

/// Write the per-year table, one withdrawal and one closing column per account
pub fn write_schedule_csv<W: Write>(writer: W, report: &PlanReport) -> Result<()> {
    let accounts = report.account_ids();
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = [
        "year",
        "guaranteed_income",
        "gross_income",
        "taxable_income",
        "total_tax",
        "net_cash_flow",
        "need",
        "shortfall",
        "shortfall_amount",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(accounts.iter().map(|id| format!("withdrawal_{id}")));
    header.extend(accounts.iter().map(|id| format!("closing_{id}")));
    csv.write_record(&header)?;

    for row in &report.rows {
        let mut record = vec![
            row.year.to_string(),
            format!("{:.2}", row.guaranteed_income),
            format!("{:.2}", row.gross_income),
            format!("{:.2}", row.taxable_income),
            format!("{:.2}", row.total_tax),
            format!("{:.2}", row.net_cash_flow),
            format!("{:.2}", row.need),
            row.shortfall.to_string(),
            format!("{:.2}", row.shortfall_amount),
        ];
        record.extend(
            accounts
                .iter()
                .map(|id| format!("{:.2}", row.withdrawals.get(id).copied().unwrap_or(0.0))),
        );
        record.extend(
            accounts
                .iter()
                .map(|id| format!("{:.2}", row.closing_balances.get(id).copied().unwrap_or(0.0))),
        );
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Pretty-printed JSON envelope
pub fn write_json<W: Write>(writer: W, report: &PlanReport) -> Result<()> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}
