//! Adverse scenarios applied to a finished plan

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::assumptions::Assumptions;
use crate::error::{PlannerError, Result};

/// Lowest return a randomized draw may take
const MIN_DRAWN_RETURN: f64 = -0.95;

fn default_inflation_bump_pct() -> f64 {
    2.5
}

fn default_longevity_years() -> u32 {
    5
}

/// Which shocks to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShockScenario {
    #[serde(default)]
    pub inflation_high: bool,
    #[serde(default)]
    pub longevity_plus: bool,
    #[serde(default)]
    pub sequence_shock: bool,
}

impl ShockScenario {
    pub fn all() -> Self {
        Self {
            inflation_high: true,
            longevity_plus: true,
            sequence_shock: true,
        }
    }

    pub fn only(kind: ShockKind) -> Self {
        Self::from_kinds(&[kind])
    }

    pub fn from_kinds(kinds: &[ShockKind]) -> Self {
        Self {
            inflation_high: kinds.contains(&ShockKind::InflationHigh),
            longevity_plus: kinds.contains(&ShockKind::LongevityPlus),
            sequence_shock: kinds.contains(&ShockKind::SequenceShock),
        }
    }

    /// Requested shocks in a fixed order
    pub fn kinds(&self) -> Vec<ShockKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.inflation_high {
            kinds.push(ShockKind::InflationHigh);
        }
        if self.longevity_plus {
            kinds.push(ShockKind::LongevityPlus);
        }
        if self.sequence_shock {
            kinds.push(ShockKind::SequenceShock);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockKind {
    InflationHigh,
    LongevityPlus,
    SequenceShock,
}

impl ShockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShockKind::InflationHigh => "inflation_high",
            ShockKind::LongevityPlus => "longevity_plus",
            ShockKind::SequenceShock => "sequence_shock",
        }
    }
}

impl fmt::Display for ShockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns forced onto the first plan years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePath {
    /// Explicit per-year returns, as fractions
    Fixed(Vec<f64>),

    /// Normal draws from a seeded ChaCha8 stream
    Randomized {
        seed: u64,
        years: usize,
        mean: f64,
        volatility: f64,
    },
}

impl Default for SequencePath {
    fn default() -> Self {
        SequencePath::Fixed(vec![-0.15, -0.10, -0.05])
    }
}

impl SequencePath {
    /// The return path; identical for identical seeds
    pub fn returns(&self) -> Vec<f64> {
        match self {
            SequencePath::Fixed(returns) => returns.clone(),
            SequencePath::Randomized {
                seed,
                years,
                mean,
                volatility,
            } => {
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                (0..*years)
                    .map(|_| (mean + volatility * standard_normal(&mut rng)).max(MIN_DRAWN_RETURN))
                    .collect()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SequencePath::Fixed(returns) => {
                if let Some(r) = returns.iter().find(|r| !r.is_finite() || **r <= -1.0) {
                    return Err(PlannerError::invalid(
                        "sequence",
                        format!("return {r} must exceed -100%"),
                    ));
                }
            }
            SequencePath::Randomized {
                years,
                mean,
                volatility,
                ..
            } => {
                if *years == 0 {
                    return Err(PlannerError::invalid("sequence.years", "must be at least 1"));
                }
                if !mean.is_finite() || !volatility.is_finite() || *volatility < 0.0 {
                    return Err(PlannerError::invalid(
                        "sequence",
                        "mean must be finite and volatility non-negative",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Box-Muller transform over two uniform draws
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// How a shocked plan is re-evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Keep the plan's withdrawals; greedy fill for years past the schedule
    #[default]
    FixedSchedule,
    /// Re-run the optimizer with the plan's strategy
    Resolve,
}

/// Shock sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockParameters {
    /// Percentage points added to inflation
    #[serde(default = "default_inflation_bump_pct")]
    pub inflation_bump_pct: f64,

    /// Years added to the horizon
    #[serde(default = "default_longevity_years")]
    pub longevity_years: u32,

    #[serde(default)]
    pub sequence: SequencePath,

    #[serde(default)]
    pub replay: ReplayMode,
}

impl Default for ShockParameters {
    fn default() -> Self {
        Self {
            inflation_bump_pct: default_inflation_bump_pct(),
            longevity_years: default_longevity_years(),
            sequence: SequencePath::default(),
            replay: ReplayMode::default(),
        }
    }
}

impl ShockParameters {
    pub fn with_replay(mut self, replay: ReplayMode) -> Self {
        self.replay = replay;
        self
    }

    pub fn with_sequence(mut self, sequence: SequencePath) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.inflation_bump_pct.is_finite() {
            return Err(PlannerError::invalid("inflation_bump_pct", "must be finite"));
        }
        self.sequence.validate()
    }

    /// Shocked assumptions and horizon for a set of shocks
    pub fn apply(
        &self,
        kinds: &[ShockKind],
        assumptions: &Assumptions,
        horizon_years: u32,
    ) -> (Assumptions, u32) {
        let mut shocked = assumptions.clone();
        let mut horizon = horizon_years;

        for kind in kinds {
            match kind {
                ShockKind::InflationHigh => {
                    shocked.inflation_pct += self.inflation_bump_pct;
                }
                ShockKind::LongevityPlus => {
                    horizon += self.longevity_years;
                }
                ShockKind::SequenceShock => {
                    let path = self.sequence.returns();
                    let mut returns = path.clone();
                    if shocked.return_overrides.len() > path.len() {
                        returns.extend_from_slice(&shocked.return_overrides[path.len()..]);
                    }
                    shocked.return_overrides = returns;
                }
            }
        }

        (shocked, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kinds_in_fixed_order() {
        let scenario = ShockScenario {
            inflation_high: false,
            longevity_plus: true,
            sequence_shock: true,
        };
        assert_eq!(
            scenario.kinds(),
            vec![ShockKind::LongevityPlus, ShockKind::SequenceShock]
        );
        assert!(ShockScenario::default().is_empty());
        assert_eq!(ShockScenario::from_kinds(&scenario.kinds()), scenario);
    }

    #[test]
    fn test_randomized_path_reproducible() {
        let path = SequencePath::Randomized {
            seed: 42,
            years: 6,
            mean: -0.05,
            volatility: 0.12,
        };
        let first = path.returns();
        assert_eq!(first.len(), 6);
        assert_eq!(first, path.returns());
        assert!(first.iter().all(|r| *r >= MIN_DRAWN_RETURN));

        let other = SequencePath::Randomized {
            seed: 43,
            years: 6,
            mean: -0.05,
            volatility: 0.12,
        };
        assert_ne!(first, other.returns());
    }

    #[test]
    fn test_zero_volatility_draws_mean() {
        let path = SequencePath::Randomized {
            seed: 1,
            years: 3,
            mean: -0.07,
            volatility: 0.0,
        };
        for r in path.returns() {
            assert_relative_eq!(r, -0.07);
        }
    }

    #[test]
    fn test_apply_combines_shocks() {
        let params = ShockParameters::default();
        let base = Assumptions::default().with_return_overrides(vec![0.01, 0.02, 0.03, 0.04]);

        let (shocked, horizon) = params.apply(
            &[ShockKind::InflationHigh, ShockKind::LongevityPlus, ShockKind::SequenceShock],
            &base,
            20,
        );
        assert_relative_eq!(shocked.inflation_pct, 4.5);
        assert_eq!(horizon, 25);
        assert_eq!(shocked.return_overrides, vec![-0.15, -0.10, -0.05, 0.04]);

        let (untouched, horizon) = params.apply(&[], &base, 20);
        assert_eq!(untouched, base);
        assert_eq!(horizon, 20);
    }

    #[test]
    fn test_invalid_sequence_rejected() {
        let params = ShockParameters::default().with_sequence(SequencePath::Fixed(vec![-1.5]));
        assert!(params.validate().is_err());
        let params = ShockParameters::default().with_sequence(SequencePath::Randomized {
            seed: 0,
            years: 0,
            mean: 0.0,
            volatility: 0.1,
        });
        assert!(params.validate().is_err());
    }
}
