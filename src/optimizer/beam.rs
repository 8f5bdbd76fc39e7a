//! Multi-year beam search over discretized withdrawal levels
//!
//! State is (year, balances). Each year every surviving path expands into
//! one candidate per combination of account levels; the greedy cascade
//! then tops up whatever need the levels leave uncovered. Paths are ranked
//! by unmet need, then cumulative tax. Equal-balance states keep only the
//! cheapest path, and the beam keeps the best `beam_width`. The evaluation
//! budget is a hard cap: a year that would overrun it expands only the
//! best-ranked parents that fit.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use rayon::prelude::*;

use super::greedy::{roll_out, Path, YearPlanner};
use super::types::{BeamConfig, CancellationToken, SearchReport};
use crate::error::Result;
use crate::projection::PlanState;

/// Ceiling on the combined marginal rate used to size withdrawal levels
const MAX_GROSS_UP_RATE: f64 = 0.9;

#[derive(Debug, Clone)]
struct Node {
    state: PlanState,
    amounts: Vec<Vec<f64>>,
    total_tax: f64,
    unmet: f64,
}

impl Node {
    fn unmet_cents(&self) -> i64 {
        (self.unmet * 100.0).round() as i64
    }

    fn rank(&self, other: &Node) -> Ordering {
        self.unmet_cents()
            .cmp(&other.unmet_cents())
            .then(self.total_tax.total_cmp(&other.total_tax))
    }

    fn into_path(self) -> Path {
        Path {
            amounts: self.amounts,
            total_tax: self.total_tax,
            unmet: self.unmet,
        }
    }
}

/// Rank two complete paths the same way beam nodes are ranked
pub(crate) fn better(candidate: &Path, incumbent: &Path) -> bool {
    let cents = |p: &Path| (p.unmet * 100.0).round() as i64;
    match cents(candidate).cmp(&cents(incumbent)) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => candidate.total_tax < incumbent.total_tax,
    }
}

/// Run the search. Returns the best path found plus how the search ended.
pub(crate) fn solve(
    planner: &YearPlanner<'_>,
    start: PlanState,
    years: u32,
    config: &BeamConfig,
    cancel: &CancellationToken,
) -> Result<(Path, SearchReport)> {
    let mut report = SearchReport::default();
    let mut beam = vec![Node {
        state: start,
        amounts: Vec::with_capacity(years as usize),
        total_tax: 0.0,
        unmet: 0.0,
    }];

    let mut expanded_years = 0;
    for _ in 0..years {
        cancel.check()?;
        if let Some(budget) = config.max_evaluations {
            if report.evaluations >= budget {
                report.budget_exhausted = true;
                break;
            }
        }

        let mut pending: Vec<Vec<Vec<f64>>> = beam
            .par_iter()
            .map(|node| candidates(planner, node, config.granularity, cancel))
            .collect::<Result<_>>()?;

        // Clamp in beam order so a partial year keeps the best-ranked parents
        let mut truncated = false;
        if let Some(budget) = config.max_evaluations {
            let mut left = budget.saturating_sub(report.evaluations) as usize;
            for list in pending.iter_mut() {
                if list.len() > left {
                    list.truncate(left);
                    truncated = true;
                }
                left -= list.len();
            }
        }

        let children: Vec<Vec<Node>> = beam
            .par_iter()
            .zip(pending.par_iter())
            .map(|(node, vectors)| expand(planner, node, vectors, cancel))
            .collect::<Result<_>>()?;

        let mut survivors: BTreeMap<Vec<i64>, Node> = BTreeMap::new();
        for child in children.into_iter().flatten() {
            report.evaluations += 1;
            let key = child.state.dominance_key();
            match survivors.get(&key) {
                Some(existing) if existing.rank(&child) != Ordering::Greater => {
                    report.pruned_by_dominance += 1;
                }
                Some(_) => {
                    report.pruned_by_dominance += 1;
                    survivors.insert(key, child);
                }
                None => {
                    survivors.insert(key, child);
                }
            }
        }

        let mut next: Vec<Node> = survivors.into_values().collect();
        next.sort_by(|a, b| a.rank(b));
        if next.len() > config.beam_width {
            report.pruned_by_width += (next.len() - config.beam_width) as u64;
            next.truncate(config.beam_width);
        }

        debug!(
            "beam year {}: {} survivor(s), best tax {:.2}",
            expanded_years,
            next.len(),
            next.first().map(|n| n.total_tax).unwrap_or(0.0)
        );
        beam = next;
        expanded_years += 1;

        if truncated {
            report.budget_exhausted = true;
            break;
        }
    }

    // Budget cut: finish every surviving path greedily
    let remaining = years - expanded_years;
    if remaining > 0 {
        let accounts = planner.household.accounts.len();
        beam = beam
            .into_iter()
            .map(|node| -> Result<Node> {
                let (tail, state) = roll_out(planner, node.state.clone(), remaining, cancel, |p, s| {
                    p.cascade(s, vec![0.0; accounts])
                })?;
                let mut amounts = node.amounts;
                amounts.extend(tail.amounts);
                Ok(Node {
                    state,
                    amounts,
                    total_tax: node.total_tax + tail.total_tax,
                    unmet: node.unmet + tail.unmet,
                })
            })
            .collect::<Result<_>>()?;
        beam.sort_by(|a, b| a.rank(b));
    }

    report.proven_optimal = report.pruned_by_width == 0 && !report.budget_exhausted;
    info!(
        "beam search: {} evaluations, {} width-pruned, {} dominated, proven optimal: {}",
        report.evaluations, report.pruned_by_width, report.pruned_by_dominance, report.proven_optimal
    );

    let best = beam
        .into_iter()
        .next()
        .map(Node::into_path)
        .unwrap_or(Path {
            amounts: Vec::new(),
            total_tax: 0.0,
            unmet: 0.0,
        });
    Ok((best, report))
}

/// Distinct withdrawal vectors for one node: level combinations, each
/// topped up by the greedy cascade
fn candidates(
    planner: &YearPlanner<'_>,
    node: &Node,
    granularity: u32,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f64>>> {
    cancel.check()?;
    let state = &node.state;
    let accounts = planner.household.accounts.len();

    let (baseline, _) = planner.evaluate(state, &vec![0.0; accounts])?;
    let deficit = (baseline.need - baseline.net_cash_flow).max(0.0);
    let ctx = planner
        .engine
        .tax_context(planner.household, planner.assumptions, state.year);
    let top_rate = planner
        .engine
        .tax_engine()
        .top_marginal_rate(&ctx)?
        .min(MAX_GROSS_UP_RATE);
    let ceiling = deficit / (1.0 - top_rate);

    let levels: Vec<Vec<f64>> = state
        .balances
        .iter()
        .map(|balance| {
            let cap = balance.min(ceiling);
            if cap <= 0.0 {
                vec![0.0]
            } else {
                (0..=granularity)
                    .map(|k| cap * k as f64 / granularity as f64)
                    .collect()
            }
        })
        .collect();

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for base in cartesian(&levels) {
        let amounts = planner.cascade(state, base)?;
        let key: Vec<i64> = amounts.iter().map(|a| (a * 100.0).round() as i64).collect();
        if seen.insert(key) {
            unique.push(amounts);
        }
    }

    Ok(unique)
}

/// Simulate one year for each candidate vector
fn expand(
    planner: &YearPlanner<'_>,
    node: &Node,
    vectors: &[Vec<f64>],
    cancel: &CancellationToken,
) -> Result<Vec<Node>> {
    cancel.check()?;
    let state = &node.state;
    let mut children = Vec::with_capacity(vectors.len());
    for amounts in vectors {
        let (year, next) = planner.evaluate(state, amounts)?;
        let mut path = node.amounts.clone();
        path.push(amounts.clone());
        children.push(Node {
            state: next,
            amounts: path,
            total_tax: node.total_tax + year.total_tax,
            unmet: node.unmet + year.shortfall_amount,
        });
    }

    Ok(children)
}

/// Every combination picking one value per list, first list varying slowest
fn cartesian(levels: &[Vec<f64>]) -> Vec<Vec<f64>> {
    levels.iter().fold(vec![Vec::new()], |acc, options| {
        acc.iter()
            .flat_map(|prefix| {
                options.iter().map(move |value| {
                    let mut combo = prefix.clone();
                    combo.push(*value);
                    combo
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_product() {
        let combos = cartesian(&[vec![0.0, 1.0], vec![5.0], vec![7.0, 8.0]]);
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0], vec![0.0, 5.0, 7.0]);
        assert_eq!(combos[3], vec![1.0, 5.0, 8.0]);
        assert_eq!(cartesian(&[]), vec![Vec::<f64>::new()]);
    }

    #[test]
    fn test_path_ranking_prefers_feasible() {
        let feasible = Path {
            amounts: vec![],
            total_tax: 9_000.0,
            unmet: 0.0,
        };
        let cheaper_but_short = Path {
            amounts: vec![],
            total_tax: 1_000.0,
            unmet: 250.0,
        };
        assert!(better(&feasible, &cheaper_but_short));
        assert!(!better(&cheaper_but_short, &feasible));

        let cheaper = Path {
            total_tax: 8_000.0,
            ..feasible.clone()
        };
        assert!(better(&cheaper, &feasible));
    }
}
