//! AssetBank Simulator
//!
//! Runs scripted scenarios against a bank wired to in-memory oracles,
//! exchanges and holder wallets, then reports outcomes and invariants.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod holders;
mod metrics;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;

/// AssetBank Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "AssetBank scenario runner")]
struct Args {
    /// Built-in scenario name or path to a JSON scenario file (default: all built-ins)
    #[arg(short, long)]
    scenario: Option<String>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Number of holders used by random walks
    #[arg(long, default_value = "4")]
    holders: usize,

    /// Print the reports as JSON
    #[arg(long)]
    json: bool,

    /// List built-in scenarios and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list {
        for name in Scenario::BUILTIN {
            println!("{}", name);
        }
        return Ok(());
    }

    let scenarios = match &args.scenario {
        Some(name) => vec![Scenario::load(name)?],
        None => Scenario::all(),
    };

    info!("Starting AssetBank Simulator");
    info!("Scenarios: {}", scenarios.len());

    let mut controller = SimulationController::new(args.seed, args.holders);
    let mut reports = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        reports.push(controller.run_scenario(scenario).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.passed())
        .map(|r| r.scenario.as_str())
        .collect();

    for report in &reports {
        for failure in &report.simulation.expectation_failures {
            error!("{}: {}", report.scenario, failure);
        }
    }

    info!("Simulation complete");
    info!("Passed: {}", reports.len() - failed.len());
    info!("Failed: {}", failed.len());

    if !failed.is_empty() {
        anyhow::bail!("scenarios failed: {}", failed.join(", "));
    }

    Ok(())
}
