//! portfwmgrd daemon entry point.
//!
//! Exposes the `apply` operation consumed by the external service wrapper
//! at boot and on reload: exit zero on success (including "not
//! configured"), non-zero on failure, safely re-invocable.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portfwmgrd::fwd_mgr::{DEFAULT_BACKEND_PATH, DEFAULT_RULES_PATH};
use portfwmgrd::proxy::DEFAULT_RINETD_CONF;
use portfwmgrd::ApplyOutcome;

/// Port-forward enforcement manager
#[derive(Parser, Debug)]
#[command(name = "portfwmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the persisted backend selector
    #[arg(long, default_value = DEFAULT_BACKEND_PATH)]
    backend_file: PathBuf,

    /// Path to the rule list
    #[arg(short = 'r', long, default_value = DEFAULT_RULES_PATH)]
    rules: PathBuf,

    /// Path to the rinetd configuration file
    #[arg(long, default_value = DEFAULT_RINETD_CONF)]
    rinetd_conf: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-apply the rule list under the persisted backend
    Apply,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Apply => {
            let outcome =
                portfwmgrd::apply_port_forwards(args.backend_file, args.rules, args.rinetd_conf)
                    .await
                    .context("port-forward apply failed")?;
            match outcome {
                ApplyOutcome::Applied {
                    backend,
                    applied,
                    failed,
                } => {
                    info!(
                        backend = %backend,
                        applied = applied,
                        failed = failed,
                        "Port forwards applied"
                    );
                }
                ApplyOutcome::NotConfigured => {
                    info!("Port forwarding not configured");
                }
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
