//! Projection output: year timeline plus lifetime aggregates

use serde::{Deserialize, Serialize};

use super::state::YearState;
use crate::error::PlanWarning;

/// Lifetime totals over a projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionAggregates {
    pub total_tax: f64,
    pub total_withdrawals: f64,

    /// Need summed over the full horizon, including unsimulated years
    pub total_need: f64,

    /// Need left uncovered, including unsimulated years
    pub total_unmet: f64,

    /// Shortfall years, counting unsimulated years after an early stop
    pub shortfall_years: u32,

    /// Years left unsimulated after every account was depleted
    pub unfunded_years: u32,

    /// First year that closed with every account at zero
    pub depletion_year: Option<i32>,

    pub terminal_balance: f64,

    /// Tax due if registered balances were deemed income in the final year (reported only)
    pub terminal_deferred_liability: f64,
}

impl ProjectionAggregates {
    /// Share of lifetime need covered, in [0, 1]
    pub fn coverage_ratio(&self) -> f64 {
        if self.total_need <= 0.0 {
            1.0
        } else {
            ((self.total_need - self.total_unmet) / self.total_need).clamp(0.0, 1.0)
        }
    }

    /// Share of horizon years without a shortfall, in [0, 1]
    pub fn funded_years_ratio(&self, horizon_years: u32) -> f64 {
        if horizon_years == 0 {
            return 1.0;
        }
        let funded = horizon_years.saturating_sub(self.shortfall_years);
        funded as f64 / horizon_years as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub timeline: Vec<YearState>,
    pub aggregates: ProjectionAggregates,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
}

impl Projection {
    /// Summarize a finished timeline
    pub(crate) fn from_timeline(
        timeline: Vec<YearState>,
        unfunded_years: u32,
        unfunded_need: f64,
        terminal_deferred_liability: f64,
    ) -> Self {
        let mut aggregates = ProjectionAggregates {
            unfunded_years,
            shortfall_years: unfunded_years,
            total_need: unfunded_need,
            total_unmet: unfunded_need,
            terminal_deferred_liability,
            ..Default::default()
        };
        let mut warnings = Vec::new();

        for year in &timeline {
            aggregates.total_tax += year.total_tax;
            aggregates.total_withdrawals += year.total_withdrawals();
            aggregates.total_need += year.need;
            aggregates.total_unmet += year.need - year.covered_need();

            if year.shortfall {
                aggregates.shortfall_years += 1;
            }
            if year.shortfall_amount > 0.0 {
                warnings.push(PlanWarning::Shortfall {
                    year: year.year,
                    unmet: year.shortfall_amount,
                });
            }
            if aggregates.depletion_year.is_none()
                && !year.closing_balances.is_empty()
                && year.closing_balances.values().all(|b| *b <= 0.0)
            {
                aggregates.depletion_year = Some(year.year);
            }
        }

        aggregates.terminal_balance = timeline.last().map(|y| y.closing_total()).unwrap_or(0.0);

        if unfunded_years > 0 {
            if let Some(last) = timeline.last() {
                warnings.push(PlanWarning::Depleted {
                    year: last.year,
                    unfunded_years,
                });
            }
        }

        Self {
            timeline,
            aggregates,
            warnings,
        }
    }

    pub fn total_tax(&self) -> f64 {
        self.aggregates.total_tax
    }

    pub fn has_shortfall(&self) -> bool {
        self.aggregates.shortfall_years > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::AccountId;
    use crate::tax::TaxBreakdown;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn year(year: i32, net: f64, need: f64, closing: f64) -> YearState {
        let shortfall_amount = if net < need - 0.005 { need - net } else { 0.0 };
        YearState {
            year,
            ages: vec![70],
            opening_balances: BTreeMap::new(),
            withdrawals: BTreeMap::from([(AccountId::new("rrsp"), 5_000.0)]),
            guaranteed_income: 0.0,
            realized_gains: 0.0,
            taxable_income: 5_000.0,
            total_tax: 100.0,
            tax: TaxBreakdown::default(),
            gross_income: 5_000.0,
            net_cash_flow: net,
            need,
            closing_balances: BTreeMap::from([(AccountId::new("rrsp"), closing)]),
            shortfall: shortfall_amount > 0.0,
            shortfall_amount,
            clipped: false,
        }
    }

    #[test]
    fn test_aggregates_sum_timeline() {
        let projection = Projection::from_timeline(
            vec![year(2025, 10_000.0, 10_000.0, 50.0), year(2026, 6_000.0, 10_000.0, 0.0)],
            0,
            0.0,
            0.0,
        );
        let agg = &projection.aggregates;
        assert_relative_eq!(agg.total_tax, 200.0);
        assert_relative_eq!(agg.total_withdrawals, 10_000.0);
        assert_eq!(agg.shortfall_years, 1);
        assert_eq!(agg.depletion_year, Some(2026));
        assert_relative_eq!(agg.coverage_ratio(), 0.8);
        assert_relative_eq!(agg.funded_years_ratio(2), 0.5);
        assert_eq!(projection.warnings.len(), 1);
    }

    #[test]
    fn test_unfunded_years_count_as_shortfall() {
        let projection =
            Projection::from_timeline(vec![year(2025, 4_000.0, 10_000.0, 0.0)], 3, 30_000.0, 0.0);
        let agg = &projection.aggregates;
        assert_eq!(agg.unfunded_years, 3);
        assert_eq!(agg.shortfall_years, 4);
        assert_relative_eq!(agg.total_unmet, 36_000.0);
        assert!(matches!(
            projection.warnings.last(),
            Some(PlanWarning::Depleted { year: 2025, unfunded_years: 3 })
        ));
    }
}
