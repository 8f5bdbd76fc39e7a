//! Year-by-year projection of balances, income and tax

pub mod benefits;
mod engine;
mod state;
mod timeline;

pub use benefits::{BenefitRules, BenefitStartAges, NoAdjustment, StatutoryAdjustment};
pub use engine::{validate_decisions, ProjectionEngine, SHORTFALL_TOLERANCE};
pub use state::{Decision, PlanState, YearState};
pub use timeline::{Projection, ProjectionAggregates};
