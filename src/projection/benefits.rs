//! Government benefit start-age rules (CPP/QPP and OAS)
//!
//! `BenefitRules` is chosen when the engine is built. `NoAdjustment` only
//! moves the payment window; `StatutoryAdjustment` also applies the
//! actuarial early/late factors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::household::{IncomeSource, IncomeSourceKind, Person};

/// Age at which unadjusted CPP and OAS amounts are stated
pub const STANDARD_START_AGE: u32 = 65;

pub const CPP_EARLIEST_AGE: u32 = 60;
pub const OAS_EARLIEST_AGE: u32 = 65;
pub const LATEST_START_AGE: u32 = 70;

const CPP_EARLY_REDUCTION_PER_MONTH: f64 = 0.006;
const CPP_LATE_INCREASE_PER_MONTH: f64 = 0.007;
const OAS_LATE_INCREASE_PER_MONTH: f64 = 0.006;

/// Elected start ages for one person; `None` keeps the source's own window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitStartAges {
    #[serde(default)]
    pub cpp_age: Option<u32>,
    #[serde(default)]
    pub oas_age: Option<u32>,
}

impl BenefitStartAges {
    pub fn new(cpp_age: Option<u32>, oas_age: Option<u32>) -> Self {
        Self { cpp_age, oas_age }
    }
}

/// Multiplier applied to a benefit started at a given age
pub trait BenefitRules: fmt::Debug + Send + Sync {
    fn cpp_factor(&self, start_age: u32) -> f64;
    fn oas_factor(&self, start_age: u32) -> f64;
}

/// Timing only; amounts are never scaled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdjustment;

impl BenefitRules for NoAdjustment {
    fn cpp_factor(&self, _start_age: u32) -> f64 {
        1.0
    }

    fn oas_factor(&self, _start_age: u32) -> f64 {
        1.0
    }
}

/// Statutory monthly adjustment around age 65
#[derive(Debug, Clone, Copy, Default)]
pub struct StatutoryAdjustment;

impl BenefitRules for StatutoryAdjustment {
    fn cpp_factor(&self, start_age: u32) -> f64 {
        let age = start_age.clamp(CPP_EARLIEST_AGE, LATEST_START_AGE);
        let months = (age as f64 - STANDARD_START_AGE as f64) * 12.0;
        if months < 0.0 {
            1.0 + months * CPP_EARLY_REDUCTION_PER_MONTH
        } else {
            1.0 + months * CPP_LATE_INCREASE_PER_MONTH
        }
    }

    fn oas_factor(&self, start_age: u32) -> f64 {
        let age = start_age.clamp(OAS_EARLIEST_AGE, LATEST_START_AGE);
        1.0 + (age - STANDARD_START_AGE) as f64 * 12.0 * OAS_LATE_INCREASE_PER_MONTH
    }
}

/// Nominal amount a source pays in `year`, honouring any start-age election
pub(crate) fn source_amount(
    source: &IncomeSource,
    owner: &Person,
    elections: Option<&[BenefitStartAges]>,
    rules: &dyn BenefitRules,
    year: i32,
    plan_start: i32,
    inflation: f64,
) -> f64 {
    let elected = elections
        .and_then(|ages| ages.get(source.owner))
        .and_then(|ages| match source.kind {
            IncomeSourceKind::Cpp => ages.cpp_age.map(|age| (age, rules.cpp_factor(age))),
            IncomeSourceKind::Oas => ages.oas_age.map(|age| (age, rules.oas_factor(age))),
            _ => None,
        });

    let Some((age, factor)) = elected else {
        return source.amount_in(year, plan_start, inflation);
    };

    let start = owner.birth_year + age as i32;
    if year < start || source.end_year.is_some_and(|end| year > end) {
        return 0.0;
    }

    let indexation = if source.indexed_to_inflation {
        (1.0 + inflation).powi(year - plan_start)
    } else {
        1.0
    };
    source.gross_amount * factor * indexation
}
