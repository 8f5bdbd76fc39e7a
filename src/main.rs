//! Decumulation Planner CLI
//!
//! Optimizes a withdrawal schedule for a household described in JSON,
//! optionally shock-tests it, and writes the schedule as CSV and the full
//! report as JSON.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use log::info;

use decumulation_planner::household::load_household;
use decumulation_planner::projection::StatutoryAdjustment;
use decumulation_planner::report::{write_json, write_schedule_csv};
use decumulation_planner::robustness::{ReplayMode, SequencePath, ShockKind};
use decumulation_planner::{
    BeamConfig, Optimizer, OptimizerConfig, Plan, PlanReport, ProjectionEngine, RobustnessService,
    ShockParameters, ShockScenario, Strategy, TaxPolicy,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Greedy,
    DpBeam,
    RrspOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ShockArg {
    Inflation,
    Longevity,
    Sequence,
}

impl From<ShockArg> for ShockKind {
    fn from(arg: ShockArg) -> Self {
        match arg {
            ShockArg::Inflation => ShockKind::InflationHigh,
            ShockArg::Longevity => ShockKind::LongevityPlus,
            ShockArg::Sequence => ShockKind::SequenceShock,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "planner",
    about = "Tax-aware retirement withdrawal planner for Canadian households"
)]
struct Cli {
    /// Planning request JSON (household, assumptions, horizon, strategy)
    #[arg(long)]
    input: PathBuf,

    /// Overrides the request's strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Overrides the request's horizon
    #[arg(long)]
    horizon: Option<u32>,

    #[arg(long, default_value_t = 8)]
    beam_width: usize,

    #[arg(long, default_value_t = 4)]
    granularity: u32,

    #[arg(long, help = "Stop the beam search after this many candidate evaluations")]
    max_evaluations: Option<u64>,

    #[arg(long, help = "Directory holding brackets.csv and credits.csv; defaults to the built-in tables")]
    policy_dir: Option<PathBuf>,

    #[arg(long, help = "Apply statutory CPP/OAS early and deferred start adjustments")]
    statutory_benefits: bool,

    /// Shocks to test the finished plan against (repeatable)
    #[arg(long = "shock", value_enum)]
    shocks: Vec<ShockArg>,

    #[arg(long, help = "Re-optimize under each shock instead of replaying the schedule")]
    resolve: bool,

    #[arg(long, help = "Draw the sequence shock from this seed instead of the fixed path")]
    seed: Option<u64>,

    /// Per-year schedule table
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Full report; printed to stdout when omitted
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let request = load_household(&cli.input)
        .with_context(|| format!("failed to load request {}", cli.input.display()))?;

    let policy = match &cli.policy_dir {
        Some(dir) => TaxPolicy::from_csv_path(dir)
            .with_context(|| format!("failed to load tax tables from {}", dir.display()))?,
        None => TaxPolicy::embedded().context("built-in tax tables are invalid")?,
    };

    let mut engine = ProjectionEngine::new(Arc::new(policy));
    if cli.statutory_benefits {
        engine = engine.with_benefit_rules(Arc::new(StatutoryAdjustment));
    }

    let strategy = match cli.strategy {
        None => request.strategy.clone(),
        Some(StrategyArg::Greedy) => Strategy::Greedy,
        Some(StrategyArg::RrspOnly) => Strategy::rrsp_only(),
        Some(StrategyArg::DpBeam) => Strategy::DpBeam(BeamConfig {
            beam_width: cli.beam_width,
            granularity: cli.granularity,
            max_evaluations: cli.max_evaluations,
        }),
    };
    let horizon = cli.horizon.unwrap_or(request.horizon_years);

    let optimizer = Optimizer::new(
        engine,
        OptimizerConfig {
            horizon_years: horizon,
            ..OptimizerConfig::default()
        },
    );

    info!(
        "optimizing {} years from {} with {}",
        horizon,
        request.household.start_year,
        strategy.name()
    );
    let result = optimizer
        .optimize(&request.household, &request.assumptions, &strategy)
        .context("optimization failed")?;

    let mut report = PlanReport::from_result(&result).with_generated_at(Utc::now());

    if !cli.shocks.is_empty() {
        let kinds: Vec<ShockKind> = cli.shocks.iter().map(|s| ShockKind::from(*s)).collect();
        let mut params = ShockParameters::default();
        if cli.resolve {
            params = params.with_replay(ReplayMode::Resolve);
        }
        if let Some(seed) = cli.seed {
            params = params.with_sequence(SequencePath::Randomized {
                seed,
                years: 3,
                mean: -0.10,
                volatility: 0.08,
            });
        }

        let plan = Plan::from_result(request.household.clone(), request.assumptions.clone(), &result);
        let robustness = RobustnessService::new(optimizer.clone(), params)
            .evaluate_shocks(&plan, &ShockScenario::from_kinds(&kinds))
            .context("shock testing failed")?;
        report = report.with_robustness(robustness);
    }

    print_summary(&report);

    if let Some(path) = &cli.csv {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        write_schedule_csv(BufWriter::new(file), &report)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Schedule written to {}", path.display());
    }

    match &cli.json {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            write_json(BufWriter::new(file), &report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_json(&mut handle, &report).context("failed to write report")?;
            writeln!(handle)?;
        }
    }

    Ok(())
}

fn print_summary(report: &PlanReport) {
    println!("Strategy: {}", report.strategy);
    println!("{:>6} {:>14} {:>14} {:>12} {:>14} {:>12}",
        "Year", "Withdrawals", "Taxable Inc", "Tax", "Net Cash", "Shortfall");
    println!("{}", "-".repeat(78));
    for row in &report.rows {
        println!("{:>6} {:>14.2} {:>14.2} {:>12.2} {:>14.2} {:>12.2}",
            row.year,
            row.withdrawals.values().sum::<f64>(),
            row.taxable_income,
            row.total_tax,
            row.net_cash_flow,
            row.shortfall_amount,
        );
    }
    println!("{}", "-".repeat(78));
    println!("Total tax:        ${:.2}", report.total_tax);
    println!("Need coverage:    {:.2}%", 100.0 * report.aggregates.coverage_ratio());
    println!("Shortfall years:  {}", report.aggregates.shortfall_years);
    println!("Terminal balance: ${:.2}", report.aggregates.terminal_balance);
    println!("Deferred tax due: ${:.2}", report.aggregates.terminal_deferred_liability);
    if let Some(robustness) = &report.robustness {
        println!("Robustness score: {:.1}", robustness.score);
        for line in &robustness.explanations {
            println!("  - {line}");
        }
    }
    for note in &report.notes {
        println!("Note: {note}");
    }
    println!();
}
