//! Error and warning taxonomy for the planning engine
//!
//! Hard failures (`PlannerError`) propagate to the caller. Recoverable
//! conditions (`PlanWarning`) ride along with an otherwise usable result.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors raised by the engine
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Requested (jurisdiction, year) is absent from the tax dataset
    #[error("no tax policy for jurisdiction {jurisdiction} in {year}")]
    PolicyNotFound { jurisdiction: String, year: i32 },

    /// Household, assumptions or decisions failed boundary validation
    #[error("invalid input `{field}`: {reason}")]
    InputValidation { field: String, reason: String },

    /// Tax dataset could not be parsed or failed sanity checks
    #[error("malformed tax policy data: {0}")]
    PolicyData(String),

    /// Caller superseded the request before it finished
    #[error("request cancelled")]
    Cancelled,

    /// A request finished after a newer one superseded it
    #[error("stale result from request {generation}; current request is {current}")]
    StaleResult { generation: u64, current: u64 },

    /// Background planning thread panicked
    #[error("planning worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PlannerError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::InputValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Structured, non-fatal conditions attached to results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Net need for the year could not be fully met
    Shortfall { year: i32, unmet: f64 },

    /// A requested withdrawal exceeded the opening balance and was clipped
    Clipped {
        year: i32,
        account_id: String,
        requested: f64,
        available: f64,
    },

    /// Every account reached zero; projection stopped early
    Depleted { year: i32, unfunded_years: u32 },

    /// Beam search ran out of its evaluation budget
    SearchBudgetExceeded { evaluations: u64 },

    /// Returned plan is best-found, not optimal over the search grid
    NotProvenOptimal { reason: String },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::Shortfall { year, unmet } => {
                write!(f, "{year}: need not met, ${unmet:.2} short")
            }
            PlanWarning::Clipped {
                year,
                account_id,
                requested,
                available,
            } => write!(
                f,
                "{year}: withdrawal of ${requested:.2} from {account_id} clipped to ${available:.2}"
            ),
            PlanWarning::Depleted {
                year,
                unfunded_years,
            } => write!(
                f,
                "{year}: all accounts depleted, {unfunded_years} remaining year(s) unfunded"
            ),
            PlanWarning::SearchBudgetExceeded { evaluations } => write!(
                f,
                "search budget exhausted after {evaluations} evaluations; plan is best-found"
            ),
            PlanWarning::NotProvenOptimal { reason } => {
                write!(f, "plan not proven optimal: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_not_found_message() {
        let err = PlannerError::PolicyNotFound {
            jurisdiction: "QC".into(),
            year: 2024,
        };
        assert_eq!(err.to_string(), "no tax policy for jurisdiction QC in 2024");
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let warning = PlanWarning::Shortfall {
            year: 2030,
            unmet: 1250.0,
        };
        let json = serde_json::to_string(&warning).unwrap();
        assert!(json.contains("\"kind\":\"shortfall\""));
        assert!(warning.to_string().contains("$1250.00 short"));
    }
}
