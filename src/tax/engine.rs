//! Annual tax computation for one or two filers
//!
//! Pure: output depends only on the income items, the jurisdiction-year
//! tables and the threshold index. Credits are applied in a fixed order
//! (basic personal, age, pension, then dividend tax credit) and can never
//! take a jurisdiction's tax below zero.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::policy::{Jurisdiction, JurisdictionSchedule, TaxPolicy};
use crate::error::{PlannerError, Result};

/// Share of capital gains included in taxable income
pub const CAPITAL_GAINS_INCLUSION: f64 = 0.5;

/// Largest share of eligible pension income that may be split
pub const MAX_PENSION_SPLIT: f64 = 0.5;

/// Default number of grid intervals between 0% and 50% split (5% steps)
pub const DEFAULT_SPLIT_STEPS: u32 = 10;

/// How an income item is taxed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeKind {
    Employment,
    /// Eligible pension income: qualifies for the pension credit and splitting
    Pension,
    /// Registered withdrawal taxed as ordinary income, not pension-eligible
    OrdinaryWithdrawal,
    /// Other fully taxable income (CPP, annuity payments before 65)
    Ordinary,
    /// Realized gain; only the inclusion share is taxable
    CapitalGain,
    EligibleDividend,
    /// Old Age Security; taxable and subject to recovery tax
    Oas,
    /// Excluded from taxable income entirely
    TaxFree,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncomeItem {
    pub kind: IncomeKind,
    pub amount: f64,
}

impl IncomeItem {
    pub fn new(kind: IncomeKind, amount: f64) -> Self {
        Self { kind, amount }
    }
}

/// Credit eligibility flags for one filer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditProfile {
    pub age: u32,
    /// Whether `Pension` items qualify for the pension income amount
    pub pension_eligible: bool,
}

impl CreditProfile {
    pub fn new(age: u32) -> Self {
        Self {
            age,
            pension_eligible: true,
        }
    }
}

/// Everything one filer reports for the year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilerIncome {
    pub items: Vec<IncomeItem>,
    pub profile: CreditProfile,
}

impl FilerIncome {
    pub fn new(profile: CreditProfile) -> Self {
        Self {
            items: Vec::new(),
            profile,
        }
    }

    pub fn with(mut self, kind: IncomeKind, amount: f64) -> Self {
        self.push(kind, amount);
        self
    }

    /// Add an item, skipping non-positive amounts
    pub fn push(&mut self, kind: IncomeKind, amount: f64) {
        if amount > 0.0 {
            self.items.push(IncomeItem::new(kind, amount));
        }
    }

    pub fn total(&self, kind: IncomeKind) -> f64 {
        self.items
            .iter()
            .filter(|item| item.kind == kind)
            .map(|item| item.amount)
            .sum()
    }
}

/// Jurisdiction-year being taxed, with threshold indexation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxContext {
    pub jurisdiction: Jurisdiction,
    pub year: i32,
    /// Multiplier (>= 1 in practice) applied to thresholds and credit amounts
    pub threshold_index: f64,
}

impl TaxContext {
    pub fn new(jurisdiction: Jurisdiction, year: i32) -> Self {
        Self {
            jurisdiction,
            year,
            threshold_index: 1.0,
        }
    }

    pub fn indexed(mut self, threshold_index: f64) -> Self {
        self.threshold_index = threshold_index;
        self
    }
}

/// Tax computed for one filer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilerTax {
    pub taxable_income: f64,
    pub federal_gross: f64,
    pub federal_credits: f64,
    pub federal_tax: f64,
    pub provincial_gross: f64,
    pub provincial_credits: f64,
    pub provincial_tax: f64,
    pub oas_recovery: f64,
    pub total: f64,
}

/// Which filer transferred pension income to the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDirection {
    #[default]
    None,
    PrimaryToSpouse,
    SpouseToPrimary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub primary: FilerTax,
    pub spouse: Option<FilerTax>,
    pub split_direction: SplitDirection,
    /// Fraction of the transferor's eligible pension income moved
    pub split_fraction: f64,
    pub split_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxResult {
    pub total_tax: f64,
    pub breakdown: TaxBreakdown,
}

/// Stateless tax calculator over a shared policy dataset
#[derive(Debug, Clone)]
pub struct TaxEngine {
    policy: Arc<TaxPolicy>,
    split_steps: u32,
}

impl TaxEngine {
    pub fn new(policy: Arc<TaxPolicy>) -> Self {
        Self {
            policy,
            split_steps: DEFAULT_SPLIT_STEPS,
        }
    }

    /// Grid resolution for the pension-splitting search (0 disables splitting)
    pub fn with_split_steps(mut self, split_steps: u32) -> Self {
        self.split_steps = split_steps;
        self
    }

    pub fn policy(&self) -> &TaxPolicy {
        &self.policy
    }

    /// Household tax for the year; pension splitting is searched when a spouse is present
    pub fn compute_annual_tax(
        &self,
        filer: &FilerIncome,
        spouse: Option<&FilerIncome>,
        ctx: &TaxContext,
    ) -> Result<TaxResult> {
        if !ctx.threshold_index.is_finite() || ctx.threshold_index <= 0.0 {
            return Err(PlannerError::invalid(
                "threshold_index",
                format!("must be positive and finite, got {}", ctx.threshold_index),
            ));
        }
        for item in filer.items.iter().chain(spouse.iter().flat_map(|s| s.items.iter())) {
            if !item.amount.is_finite() || item.amount < 0.0 {
                return Err(PlannerError::invalid(
                    "income_items",
                    format!("{:?} amount {} must be non-negative", item.kind, item.amount),
                ));
            }
        }

        let (federal, provincial) = self.policy.pair(&ctx.jurisdiction, ctx.year)?;
        let index = ctx.threshold_index;

        let Some(spouse) = spouse else {
            let primary = filer_tax(filer, 0.0, federal, provincial, index);
            return Ok(TaxResult {
                total_tax: primary.total,
                breakdown: TaxBreakdown {
                    primary,
                    ..Default::default()
                },
            });
        };

        let primary_pension = filer.total(IncomeKind::Pension);
        let spouse_pension = spouse.total(IncomeKind::Pension);
        let direction = if primary_pension <= 0.0 && spouse_pension <= 0.0 {
            SplitDirection::None
        } else if primary_pension >= spouse_pension {
            SplitDirection::PrimaryToSpouse
        } else {
            SplitDirection::SpouseToPrimary
        };
        let splittable = match direction {
            SplitDirection::None => 0.0,
            SplitDirection::PrimaryToSpouse => primary_pension,
            SplitDirection::SpouseToPrimary => spouse_pension,
        };

        let steps = if splittable > 0.0 { self.split_steps } else { 0 };
        let mut best: Option<(f64, FilerTax, FilerTax, f64)> = None;

        for step in 0..=steps {
            let fraction = if steps == 0 {
                0.0
            } else {
                MAX_PENSION_SPLIT * step as f64 / steps as f64
            };
            let moved = splittable * fraction;
            let (primary_shift, spouse_shift) = match direction {
                SplitDirection::SpouseToPrimary => (moved, -moved),
                _ => (-moved, moved),
            };

            let primary = filer_tax(filer, primary_shift, federal, provincial, index);
            let other = filer_tax(spouse, spouse_shift, federal, provincial, index);
            let joint = primary.total + other.total;

            // Strict comparison keeps the smallest split among equal-tax options
            if best.as_ref().map_or(true, |(tax, ..)| joint < *tax) {
                best = Some((joint, primary, other, fraction));
            }
        }

        let (total_tax, primary, other, fraction) =
            best.unwrap_or((0.0, FilerTax::default(), FilerTax::default(), 0.0));

        Ok(TaxResult {
            total_tax,
            breakdown: TaxBreakdown {
                primary,
                spouse: Some(other),
                split_direction: if fraction > 0.0 { direction } else { SplitDirection::None },
                split_fraction: fraction,
                split_amount: splittable * fraction,
            },
        })
    }

    /// Combined federal + provincial top marginal rate plus OAS recovery
    pub fn top_marginal_rate(&self, ctx: &TaxContext) -> Result<f64> {
        let (federal, provincial) = self.policy.pair(&ctx.jurisdiction, ctx.year)?;
        Ok(federal.brackets.top_rate()
            + provincial.brackets.top_rate()
            + federal.credits.oas_recovery_rate)
    }

    /// Dollars of ordinary income that fit before the filer's federal bracket ends
    pub fn federal_bracket_room(&self, taxable_income: f64, ctx: &TaxContext) -> Result<f64> {
        let federal = self.policy.schedule(super::policy::FEDERAL, ctx.year)?;
        Ok(federal
            .brackets
            .bracket_ceiling(taxable_income, ctx.threshold_index)
            .map(|ceiling| (ceiling - taxable_income.max(0.0)).max(0.0))
            .unwrap_or(f64::INFINITY))
    }

    /// Taxable income one filer would report (after inclusion and gross-up)
    pub fn taxable_income(&self, filer: &FilerIncome, ctx: &TaxContext) -> Result<f64> {
        let federal = self.policy.schedule(super::policy::FEDERAL, ctx.year)?;
        Ok(IncomeSummary::from_filer(filer, 0.0, federal.credits.dividend_gross_up).taxable)
    }
}

/// Income aggregates for one filer after any pension transfer
struct IncomeSummary {
    taxable: f64,
    eligible_pension: f64,
    grossed_up_dividends: f64,
    oas: f64,
}

impl IncomeSummary {
    fn from_filer(filer: &FilerIncome, pension_shift: f64, gross_up: f64) -> Self {
        let mut ordinary = 0.0;
        let mut pension = 0.0;
        let mut gains = 0.0;
        let mut dividends = 0.0;
        let mut oas = 0.0;

        for item in &filer.items {
            match item.kind {
                IncomeKind::Employment
                | IncomeKind::Ordinary
                | IncomeKind::OrdinaryWithdrawal => ordinary += item.amount,
                IncomeKind::Pension => pension += item.amount,
                IncomeKind::CapitalGain => gains += item.amount,
                IncomeKind::EligibleDividend => dividends += item.amount,
                IncomeKind::Oas => oas += item.amount,
                IncomeKind::TaxFree => {}
            }
        }

        let eligible_pension = (pension + pension_shift).max(0.0);
        let grossed_up_dividends = dividends * (1.0 + gross_up);
        let taxable = (ordinary
            + eligible_pension
            + oas
            + gains * CAPITAL_GAINS_INCLUSION
            + grossed_up_dividends)
            .max(0.0);

        Self {
            taxable,
            eligible_pension,
            grossed_up_dividends,
            oas,
        }
    }
}

fn filer_tax(
    filer: &FilerIncome,
    pension_shift: f64,
    federal: &JurisdictionSchedule,
    provincial: &JurisdictionSchedule,
    index: f64,
) -> FilerTax {
    let income = IncomeSummary::from_filer(filer, pension_shift, federal.credits.dividend_gross_up);
    let profile = &filer.profile;

    let (federal_gross, federal_credits, federal_tax) =
        jurisdiction_tax(&income, profile, federal, index);
    let (provincial_gross, provincial_credits, provincial_tax) =
        jurisdiction_tax(&income, profile, provincial, index);

    let oas_recovery = federal
        .credits
        .oas_recovery(income.taxable, income.oas, index);

    FilerTax {
        taxable_income: income.taxable,
        federal_gross,
        federal_credits,
        federal_tax,
        provincial_gross,
        provincial_credits,
        provincial_tax,
        oas_recovery,
        total: federal_tax + provincial_tax + oas_recovery,
    }
}

/// Returns (gross tax, credits applied, net tax) for one jurisdiction
fn jurisdiction_tax(
    income: &IncomeSummary,
    profile: &CreditProfile,
    schedule: &JurisdictionSchedule,
    index: f64,
) -> (f64, f64, f64) {
    let gross = schedule.brackets.tax(income.taxable, index);
    if gross <= 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let credits = &schedule.credits;
    let net_income = income.taxable;
    let pension_base = if profile.pension_eligible {
        income.eligible_pension
    } else {
        0.0
    };

    // Dividend credit never exceeds the bracket tax the dividends themselves add
    let dividend_tax = gross
        - schedule
            .brackets
            .tax((income.taxable - income.grossed_up_dividends).max(0.0), index);
    let dividend_credit =
        (income.grossed_up_dividends * credits.dividend_credit_rate).min(dividend_tax.max(0.0));

    let ordered = [
        credits.basic_personal_amount(net_income, index) * credits.credit_rate,
        credits.age_amount(profile.age, net_income, index) * credits.credit_rate,
        credits.pension_amount(pension_base, index) * credits.credit_rate,
        dividend_credit,
    ];

    let mut remaining = gross;
    let mut applied = 0.0;
    for credit in ordered {
        let used = credit.min(remaining);
        remaining -= used;
        applied += used;
    }

    (gross, applied, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn engine() -> TaxEngine {
        TaxEngine::new(Arc::new(TaxPolicy::embedded().unwrap()))
    }

    fn ctx() -> TaxContext {
        TaxContext::new(Jurisdiction::ontario(), 2024)
    }

    fn single(age: u32, kind: IncomeKind, amount: f64) -> FilerIncome {
        FilerIncome::new(CreditProfile::new(age)).with(kind, amount)
    }

    #[test]
    fn test_zero_income_is_exactly_zero_tax() {
        let engine = engine();
        let result = engine
            .compute_annual_tax(&FilerIncome::new(CreditProfile::new(70)), None, &ctx())
            .unwrap();
        assert_eq!(result.total_tax, 0.0);
        assert_eq!(result.breakdown.primary.taxable_income, 0.0);
    }

    #[test]
    fn test_tax_free_withdrawal_excluded() {
        let engine = engine();
        let filer = single(70, IncomeKind::TaxFree, 80_000.0);
        let result = engine.compute_annual_tax(&filer, None, &ctx()).unwrap();
        assert_eq!(result.total_tax, 0.0);
    }

    #[test]
    fn test_income_below_personal_amounts_owes_nothing() {
        let engine = engine();
        let filer = single(50, IncomeKind::Employment, 12_000.0);
        let result = engine.compute_annual_tax(&filer, None, &ctx()).unwrap();
        assert_eq!(result.total_tax, 0.0);
        assert!(result.breakdown.primary.federal_gross > 0.0);
    }

    #[test]
    fn test_hand_computed_ontario_employment_income() {
        let engine = engine();
        let filer = single(50, IncomeKind::Employment, 60_000.0);
        let result = engine.compute_annual_tax(&filer, None, &ctx()).unwrap();
        let tax = &result.breakdown.primary;

        let federal_gross = 55_867.0 * 0.15 + (60_000.0 - 55_867.0) * 0.205;
        assert_relative_eq!(tax.federal_gross, federal_gross, epsilon = 1e-6);
        assert_relative_eq!(tax.federal_tax, federal_gross - 15_705.0 * 0.15, epsilon = 1e-6);

        let provincial_gross = 51_446.0 * 0.0505 + (60_000.0 - 51_446.0) * 0.0915;
        assert_relative_eq!(
            tax.provincial_tax,
            provincial_gross - 12_399.0 * 0.0505,
            epsilon = 1e-6
        );
        assert_eq!(tax.oas_recovery, 0.0);
    }

    #[test]
    fn test_capital_gains_half_included() {
        let engine = engine();
        let gains = single(50, IncomeKind::CapitalGain, 80_000.0);
        let ordinary = single(50, IncomeKind::Employment, 40_000.0);

        let a = engine.compute_annual_tax(&gains, None, &ctx()).unwrap();
        let b = engine.compute_annual_tax(&ordinary, None, &ctx()).unwrap();
        assert_relative_eq!(a.total_tax, b.total_tax, epsilon = 1e-9);
    }

    #[test]
    fn test_age_and_pension_credits_reduce_tax() {
        let engine = engine();
        let young = single(60, IncomeKind::Pension, 40_000.0);
        let old = single(70, IncomeKind::Pension, 40_000.0);
        let mut ineligible = old.clone();
        ineligible.profile.pension_eligible = false;

        let young_tax = engine.compute_annual_tax(&young, None, &ctx()).unwrap().total_tax;
        let old_tax = engine.compute_annual_tax(&old, None, &ctx()).unwrap().total_tax;
        let ineligible_tax = engine
            .compute_annual_tax(&ineligible, None, &ctx())
            .unwrap()
            .total_tax;

        assert!(old_tax < young_tax);
        assert!(old_tax < ineligible_tax);
        // Pension credit worth 2000 * 15% federally plus 1762 * 5.05% provincially
        assert_relative_eq!(
            ineligible_tax - old_tax,
            2_000.0 * 0.15 + 1_762.0 * 0.0505,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_clawback_is_proportional_at_threshold() {
        let engine = engine();
        let threshold = 90_997.0;
        let oas = 8_600.0;

        let at = single(70, IncomeKind::Oas, oas).with(IncomeKind::Employment, threshold - oas);
        let above = single(70, IncomeKind::Oas, oas).with(IncomeKind::Employment, threshold - oas + 1.0);

        let at_result = engine.compute_annual_tax(&at, None, &ctx()).unwrap();
        let above_result = engine.compute_annual_tax(&above, None, &ctx()).unwrap();

        assert_eq!(at_result.breakdown.primary.oas_recovery, 0.0);
        assert_relative_eq!(above_result.breakdown.primary.oas_recovery, 0.15, epsilon = 1e-9);
        // One extra dollar moves total tax by well under a dollar: no step jump
        assert!(above_result.total_tax - at_result.total_tax < 1.0);
    }

    #[test]
    fn test_clawback_capped_at_benefit() {
        let engine = engine();
        let filer = single(70, IncomeKind::Oas, 8_600.0).with(IncomeKind::Employment, 400_000.0);
        let result = engine.compute_annual_tax(&filer, None, &ctx()).unwrap();
        assert_relative_eq!(result.breakdown.primary.oas_recovery, 8_600.0);
    }

    #[test]
    fn test_pension_splitting_lowers_joint_tax() {
        let engine = engine();
        let primary = single(70, IncomeKind::Pension, 120_000.0);
        let spouse = FilerIncome::new(CreditProfile::new(68));

        let split = engine.compute_annual_tax(&primary, Some(&spouse), &ctx()).unwrap();
        let unsplit = engine
            .clone()
            .with_split_steps(0)
            .compute_annual_tax(&primary, Some(&spouse), &ctx())
            .unwrap();

        assert!(split.total_tax < unsplit.total_tax);
        assert_eq!(split.breakdown.split_direction, SplitDirection::PrimaryToSpouse);
        assert!(split.breakdown.split_fraction > 0.0);
        assert!(split.breakdown.split_fraction <= MAX_PENSION_SPLIT);
        assert_relative_eq!(
            split.breakdown.split_amount,
            120_000.0 * split.breakdown.split_fraction
        );
    }

    #[test]
    fn test_splitting_runs_from_spouse_with_larger_pension() {
        let engine = engine();
        let primary = FilerIncome::new(CreditProfile::new(66));
        let spouse = single(67, IncomeKind::Pension, 90_000.0);
        let result = engine.compute_annual_tax(&primary, Some(&spouse), &ctx()).unwrap();
        assert_eq!(result.breakdown.split_direction, SplitDirection::SpouseToPrimary);
    }

    #[test]
    fn test_unknown_jurisdiction_fails_loudly() {
        let engine = engine();
        let filer = single(70, IncomeKind::Employment, 50_000.0);
        let quebec = TaxContext::new(Jurisdiction::province("QC"), 2024);
        assert!(matches!(
            engine.compute_annual_tax(&filer, None, &quebec),
            Err(PlannerError::PolicyNotFound { .. })
        ));

        let future = TaxContext::new(Jurisdiction::ontario(), 2040);
        assert!(matches!(
            engine.compute_annual_tax(&filer, None, &future),
            Err(PlannerError::PolicyNotFound { year: 2040, .. })
        ));
    }

    #[test]
    fn test_rejects_negative_amounts() {
        let engine = engine();
        let mut filer = FilerIncome::new(CreditProfile::new(70));
        filer.items.push(IncomeItem::new(IncomeKind::Employment, -5.0));
        assert!(matches!(
            engine.compute_annual_tax(&filer, None, &ctx()),
            Err(PlannerError::InputValidation { .. })
        ));
    }

    #[test]
    fn test_indexation_lowers_tax_on_same_nominal_income() {
        let engine = engine();
        let filer = single(70, IncomeKind::Employment, 80_000.0);
        let base = engine.compute_annual_tax(&filer, None, &ctx()).unwrap().total_tax;
        let indexed = engine
            .compute_annual_tax(&filer, None, &ctx().indexed(1.2))
            .unwrap()
            .total_tax;
        assert!(indexed < base);
    }

    #[test]
    fn test_bracket_room() {
        let engine = engine();
        assert_relative_eq!(engine.federal_bracket_room(50_000.0, &ctx()).unwrap(), 5_867.0);
        assert!(engine.federal_bracket_room(300_000.0, &ctx()).unwrap().is_infinite());
    }

    #[test]
    fn test_dividends_never_lower_tax() {
        let engine = engine();
        let wages = single(50, IncomeKind::Employment, 53_000.0);
        let with_dividends = wages.clone().with(IncomeKind::EligibleDividend, 1_000.0);

        let before = engine.compute_annual_tax(&wages, None, &ctx()).unwrap();
        let after = engine.compute_annual_tax(&with_dividends, None, &ctx()).unwrap();

        assert_relative_eq!(after.breakdown.primary.taxable_income, 54_380.0, epsilon = 1e-6);
        assert!(after.total_tax + 1e-9 >= before.total_tax);
        for tax in [&before.breakdown.primary, &after.breakdown.primary] {
            assert!(tax.federal_tax >= 0.0);
            assert!(tax.provincial_tax >= 0.0);
        }
    }

    #[test]
    fn test_dividend_credit_still_shelters_low_bracket_dividends() {
        let engine = engine();
        let wages = single(50, IncomeKind::Employment, 30_000.0);
        let with_dividends = wages.clone().with(IncomeKind::EligibleDividend, 5_000.0);

        let before = engine.compute_annual_tax(&wages, None, &ctx()).unwrap();
        let after = engine.compute_annual_tax(&with_dividends, None, &ctx()).unwrap();

        // Grossed-up dividends taxed at the first bracket are fully offset
        assert_relative_eq!(after.total_tax, before.total_tax, epsilon = 1e-6);
        assert!(after.breakdown.primary.federal_credits > before.breakdown.primary.federal_credits);
    }

    #[test]
    fn test_deterministic() {
        let engine = engine();
        let primary = single(72, IncomeKind::Pension, 75_000.0)
            .with(IncomeKind::Oas, 8_000.0)
            .with(IncomeKind::CapitalGain, 12_000.0)
            .with(IncomeKind::EligibleDividend, 3_000.0);
        let spouse = single(69, IncomeKind::Oas, 8_000.0);
        let a = engine.compute_annual_tax(&primary, Some(&spouse), &ctx()).unwrap();
        let b = engine.compute_annual_tax(&primary, Some(&spouse), &ctx()).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_tax_non_decreasing_in_income(
            base in 0.0f64..400_000.0,
            extra in 0.0f64..50_000.0,
            age in 50u32..95,
            oas in 0.0f64..9_000.0,
            kind_index in 0usize..7,
        ) {
            let engine = engine();
            let kind = [
                IncomeKind::Employment,
                IncomeKind::Pension,
                IncomeKind::OrdinaryWithdrawal,
                IncomeKind::Ordinary,
                IncomeKind::CapitalGain,
                IncomeKind::EligibleDividend,
                IncomeKind::Oas,
            ][kind_index];

            let low = single(age, kind, base).with(IncomeKind::Oas, oas);
            let high = single(age, kind, base + extra).with(IncomeKind::Oas, oas);

            let low_tax = engine.compute_annual_tax(&low, None, &ctx()).unwrap().total_tax;
            let high_tax = engine.compute_annual_tax(&high, None, &ctx()).unwrap().total_tax;
            prop_assert!(high_tax + 1e-9 >= low_tax, "{} < {}", high_tax, low_tax);
            prop_assert!(low_tax >= 0.0);
        }

        #[test]
        fn prop_joint_tax_non_decreasing_with_splitting(
            base in 0.0f64..250_000.0,
            extra in 0.0f64..30_000.0,
            spouse_income in 0.0f64..60_000.0,
        ) {
            let engine = engine();
            let spouse = single(67, IncomeKind::Employment, spouse_income);
            let low = single(71, IncomeKind::Pension, base);
            let high = single(71, IncomeKind::Pension, base + extra);

            let low_tax = engine.compute_annual_tax(&low, Some(&spouse), &ctx()).unwrap().total_tax;
            let high_tax = engine.compute_annual_tax(&high, Some(&spouse), &ctx()).unwrap().total_tax;
            prop_assert!(high_tax + 1e-9 >= low_tax);
        }
    }
}
