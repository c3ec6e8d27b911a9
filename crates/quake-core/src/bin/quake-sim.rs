//! Drive the simulated cluster through the trial driver, optionally
//! injecting one defect class at a chosen trial.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use quake_cluster::sim::SimProvisioner;
use quake_core::{logging, RunConfig, TrialContext, EXIT_FATAL};
use quake_verdict::{Block, FailureReason, NodeId, TrialIndex, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Fault {
    None,
    Diverge,
    LoseTx,
    Crash,
}

#[derive(Debug, Parser)]
#[command(name = "quake-sim", about = "Run fault-injection trials against a simulated cluster")]
struct Args {
    /// Number of nodes per cluster (overrides the config file).
    #[arg(long)]
    nodes: Option<usize>,

    /// Number of trials; omit to run until a trial fails.
    #[arg(long)]
    trials: Option<u64>,

    /// JSON run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Defect to inject.
    #[arg(long, value_enum, default_value_t = Fault::None)]
    fault: Fault,

    /// Trial index at which the fault is injected.
    #[arg(long, default_value_t = 0)]
    fault_at: TrialIndex,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match RunConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(EXIT_FATAL);
            }
        },
        None => RunConfig::default(),
    };
    if let Some(nodes) = args.nodes {
        config.node_count = nodes;
    }
    if args.trials.is_some() {
        config.trial_limit = args.trials;
    }

    let (fault, fault_at) = (args.fault, args.fault_at);
    let provisioner = SimProvisioner::new().with_setup(move |index, nodes| {
        if index as TrialIndex != fault_at {
            return;
        }
        let Some(victim) = nodes.last() else {
            return;
        };
        match fault {
            Fault::None => {}
            Fault::Diverge => victim.commit(Block::new(2, "fork")),
            Fault::LoseTx => victim.add_outstanding(TxId::new("dropped-by-sim")),
            Fault::Crash => victim.terminate(137),
        }
    });

    let status = quake_core::run(config, provisioner, scenario).await;
    ExitCode::from(status)
}

/// Under load, cycle a learner in and out and wait for the cluster to agree.
async fn scenario(ctx: TrialContext) -> Result<(), FailureReason> {
    let Some(leader) = ctx.nodes.first() else {
        return Ok(());
    };
    let learner = NodeId(ctx.nodes.len() as u32);

    ctx.with_load(async {
        ctx.add_member(leader, learner).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.remove_member(leader, learner).await?;
        Ok(())
    })
    .await?;

    let block = ctx.await_convergence().await?;
    tracing::info!(trial = ctx.index, block = %block, "cluster converged");
    Ok(())
}
