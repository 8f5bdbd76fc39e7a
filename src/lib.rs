//! Decumulation Planner - tax-aware retirement withdrawal engine for Canadian households
//!
//! This library provides:
//! - Federal and provincial income tax with credits, OAS recovery and pension splitting
//! - Deterministic year-by-year projection of balances, income, tax and need coverage
//! - Withdrawal schedule optimization (greedy priority fill, multi-year beam search)
//! - Shock testing of finished plans (inflation, longevity, return sequence)
//! - JSON and CSV report output

pub mod assumptions;
pub mod error;
pub mod household;
pub mod optimizer;
pub mod projection;
pub mod report;
pub mod robustness;
pub mod session;
pub mod tax;

// Re-export commonly used types
pub use assumptions::Assumptions;
pub use error::{PlanWarning, PlannerError, Result};
pub use household::{Account, AccountId, AccountKind, Household, IncomeSource, IncomeSourceKind, Person, PlanRequest};
pub use optimizer::{BeamConfig, OptimizationResult, Optimizer, OptimizerConfig, Strategy};
pub use projection::{Decision, Projection, ProjectionEngine, YearState};
pub use report::PlanReport;
pub use robustness::{Plan, RobustnessReport, RobustnessService, ShockParameters, ShockScenario};
pub use session::PlanningSession;
pub use tax::{Jurisdiction, TaxEngine, TaxPolicy};
