//! Success measure and score aggregation

use serde::{Deserialize, Serialize};

use crate::projection::ProjectionAggregates;

/// Weight of need coverage in the success measure
pub const COVERAGE_WEIGHT: f64 = 0.7;

/// Weight of the funded-years ratio in the success measure
pub const FUNDED_YEARS_WEIGHT: f64 = 0.3;

/// Degradation below this is not worth explaining
pub const EXPLAIN_THRESHOLD: f64 = 0.005;

/// Outcome of re-projecting the plan under one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub label: String,
    pub horizon_years: u32,
    pub coverage: f64,
    pub funded_ratio: f64,
    pub shortfall_years: u32,
    pub total_tax: f64,
    pub success: f64,
}

impl ScenarioOutcome {
    pub fn new(label: impl Into<String>, aggregates: &ProjectionAggregates, horizon_years: u32) -> Self {
        let coverage = aggregates.coverage_ratio();
        let funded_ratio = aggregates.funded_years_ratio(horizon_years);
        Self {
            label: label.into(),
            horizon_years,
            coverage,
            funded_ratio,
            shortfall_years: aggregates.shortfall_years,
            total_tax: aggregates.total_tax,
            success: COVERAGE_WEIGHT * coverage + FUNDED_YEARS_WEIGHT * funded_ratio,
        }
    }

    /// Loss of success relative to `base`, never negative
    pub fn degradation(&self, base: &ScenarioOutcome) -> f64 {
        (base.success - self.success).max(0.0)
    }
}

/// 100 × (1 − worst degradation), in [0, 100]
pub fn score(base: &ScenarioOutcome, outcomes: &[ScenarioOutcome]) -> f64 {
    let worst = outcomes
        .iter()
        .map(|o| o.degradation(base))
        .fold(0.0, f64::max);
    (100.0 * (1.0 - worst)).clamp(0.0, 100.0)
}

/// Human-readable note for a scenario that hurt the plan
pub fn explain(base: &ScenarioOutcome, outcome: &ScenarioOutcome) -> Option<String> {
    let degradation = outcome.degradation(base);
    let new_shortfalls = outcome.shortfall_years.saturating_sub(base.shortfall_years);
    if degradation <= EXPLAIN_THRESHOLD && new_shortfalls == 0 {
        return None;
    }

    let mut text = format!(
        "{}: success falls from {:.1}% to {:.1}%",
        outcome.label,
        100.0 * base.success,
        100.0 * outcome.success
    );
    if new_shortfalls > 0 {
        text.push_str(&format!(
            ", {new_shortfalls} new shortfall year(s) over {} years",
            outcome.horizon_years
        ));
    }
    Some(text)
}
