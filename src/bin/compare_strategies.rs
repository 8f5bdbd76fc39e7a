//! Run every withdrawal strategy on one request and compare lifetime tax
//!
//! Usage: cargo run --bin compare_strategies -- --input request.json

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;

use decumulation_planner::household::load_household;
use decumulation_planner::{
    OptimizationResult, Optimizer, OptimizerConfig, ProjectionEngine, Strategy, TaxPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "compare_strategies", about = "Compare greedy, beam and RRSP-only schedules")]
struct Cli {
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    horizon: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let request = load_household(&cli.input)
        .with_context(|| format!("failed to load request {}", cli.input.display()))?;
    let horizon = cli.horizon.unwrap_or(request.horizon_years);

    let policy = TaxPolicy::embedded().context("built-in tax tables are invalid")?;
    let optimizer = Optimizer::new(
        ProjectionEngine::new(Arc::new(policy)),
        OptimizerConfig {
            horizon_years: horizon,
            ..OptimizerConfig::default()
        },
    );

    let strategies = [Strategy::Greedy, Strategy::dp_beam(), Strategy::rrsp_only()];
    let start = Instant::now();
    let results: Vec<(Strategy, OptimizationResult, f64)> = strategies
        .par_iter()
        .map(|strategy| -> Result<_> {
            let began = Instant::now();
            let result = optimizer
                .optimize(&request.household, &request.assumptions, strategy)
                .with_context(|| format!("{} failed", strategy.name()))?;
            Ok((strategy.clone(), result, began.elapsed().as_secs_f64()))
        })
        .collect::<Result<_>>()?;
    println!("Optimized {} strategies in {:?}\n", results.len(), start.elapsed());

    let baseline = results
        .iter()
        .find(|(s, _, _)| *s == Strategy::Greedy)
        .map(|(_, r, _)| r.total_tax)
        .unwrap_or(0.0);

    println!("{:<10} {:>14} {:>14} {:>10} {:>10} {:>14} {:>9}",
        "Strategy", "Total Tax", "vs Greedy", "Shortfall", "Coverage", "Terminal Bal", "Seconds");
    println!("{}", "-".repeat(87));
    for (strategy, result, seconds) in &results {
        println!("{:<10} {:>14.2} {:>14.2} {:>10} {:>9.2}% {:>14.2} {:>9.3}",
            strategy.name(),
            result.total_tax,
            result.total_tax - baseline,
            result.aggregates.shortfall_years,
            100.0 * result.aggregates.coverage_ratio(),
            result.aggregates.terminal_balance,
            seconds,
        );
    }

    for (strategy, result, _) in &results {
        for note in &result.notes {
            println!("{}: {}", strategy.name(), note);
        }
    }

    Ok(())
}
