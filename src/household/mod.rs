//! Household snapshot and request loading

mod data;
pub mod loader;

pub use data::{
    Account, AccountId, AccountKind, Household, IncomeSource, IncomeSourceKind, Person,
};
pub use loader::{load_household, load_request_from_reader, PlanRequest};
