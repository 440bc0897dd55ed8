//! Command-line entry point: run a fixed-size honest network for a number
//! of epochs, optionally suppressing some epochs' leaders, and report what
//! each node finalized.

use std::collections::HashSet;

use clap::Parser;
use streamlet_consensus::Simulation;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Run a permissioned Streamlet-style consensus simulation")]
struct Args {
    /// Number of participating nodes
    #[arg(long, default_value_t = 4)]
    nodes: usize,

    /// Number of epochs to run
    #[arg(long, default_value_t = 10)]
    epochs: u64,

    /// Epochs whose leader proposal is suppressed, modeling a crashed leader
    #[arg(long = "fail-epoch")]
    fail_epochs: Vec<u64>,

    /// Print each node's finalized log, not just its length
    #[arg(long)]
    verbose: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let suppressed: HashSet<u64> = args.fail_epochs.into_iter().collect();

    let mut simulation = Simulation::new(args.nodes);
    simulation.run(args.epochs, &suppressed);

    for (i, log) in simulation.finalized_logs().iter().enumerate() {
        println!("node {i} finalized {} transactions", log.len());
        if args.verbose {
            for transaction in log {
                println!("  {transaction}");
            }
        }
    }
}
