//! Tax policy tables and the annual tax calculator

mod engine;
pub mod loader;
mod policy;

pub use engine::{
    CreditProfile, FilerIncome, FilerTax, IncomeItem, IncomeKind, SplitDirection, TaxBreakdown,
    TaxContext, TaxEngine, TaxResult, CAPITAL_GAINS_INCLUSION, DEFAULT_SPLIT_STEPS,
    MAX_PENSION_SPLIT,
};
pub use loader::DEFAULT_POLICY_PATH;
pub use policy::{
    Bracket, BracketSchedule, CreditTable, Jurisdiction, JurisdictionSchedule, TaxPolicy, FEDERAL,
};
