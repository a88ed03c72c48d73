//! gremeshd daemon entry point.
//!
//! The narrow surface consumed by the external service wrapper:
//! `setup <node>` and `teardown <node>`, each exiting zero on success and
//! safely re-invocable. The wrapper supplies the host identity and owns
//! retry/restart policy; no retries happen here.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gremeshd::types::DEFAULT_TOPOLOGY_PATH;
use gremeshd::ReconcileOutcome;

/// GRE mesh tunnel reconciler
#[derive(Parser, Debug)]
#[command(name = "gremeshd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology description
    #[arg(short = 't', long, default_value = DEFAULT_TOPOLOGY_PATH)]
    topology: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile tunnel interfaces for the given host identity
    Setup {
        /// This host's node name in the topology
        node: String,
    },
    /// Remove all tunnel interfaces without recreating them
    Teardown {
        /// This host's node name in the topology
        node: String,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<bool> {
    match args.command {
        Command::Setup { node } => {
            let outcome = gremeshd::setup(&node, &args.topology)
                .await
                .with_context(|| format!("setup failed for node '{}'", node))?;
            match outcome {
                ReconcileOutcome::Applied {
                    applied,
                    unresolved,
                    failed,
                } => {
                    info!(
                        applied = applied,
                        unresolved = unresolved,
                        failed = failed,
                        "Setup complete"
                    );
                }
                ReconcileOutcome::NothingToDo => {
                    info!("No links involve this host; nothing to do");
                }
            }
            Ok(outcome.succeeded())
        }
        Command::Teardown { node } => {
            let removed = gremeshd::teardown(&node)
                .await
                .with_context(|| format!("teardown failed for node '{}'", node))?;
            info!(removed = removed, "Teardown complete");
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Reconcile applied no links");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
