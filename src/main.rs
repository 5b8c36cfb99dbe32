// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use jailrep::{
    config::ReplicatorConfig,
    constants::{ENV_CONFIG_PATH, ENV_LOG_FORMAT},
    executor::HostExecutor,
    replicator::Replicator,
    report::Reporter,
    request::ReplicationRequest,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};

/// Provision a MySQL replica inside an iocage jail from a ZFS snapshot.
#[derive(Debug, Parser)]
#[command(name = "jailrep", version, about)]
struct Cli {
    /// Source as `<host>:<jail>`, or `localhost:<snapshot-name>` for a staged snapshot
    #[arg(long, value_name = "HOST:NAME")]
    from: String,

    /// Target jail as `localhost:<jail>`
    #[arg(long, value_name = "localhost:NAME")]
    to: String,

    /// Destroy the target jail first if it already exists
    #[arg(long)]
    force: bool,

    /// Print every step without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the end-to-end replication check
    #[arg(long)]
    skip_test: bool,

    /// YAML configuration file
    #[arg(long, env = ENV_CONFIG_PATH, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SSH private key used to reach the source host
    #[arg(long, short = 'i', value_name = "PATH")]
    identity: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Usage errors exit 1 like every other aborting error; --help/--version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("jailrep")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<jailrep::errors::ReplicationError>()
                .map_or(1, jailrep::errors::ReplicationError::exit_code);
            error!("{e:#}");
            ExitCode::from(code)
        }
    }
}

/// Format: timestamp file:line LEVEL message, or JSON with `RUST_LOG_FORMAT=json`.
///
/// Respects `RUST_LOG`, defaulting to INFO.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    debug!("Logging initialized with file and line number tracking");
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = ReplicatorConfig::load(cli.config.as_deref())?;
    let request = ReplicationRequest::new(
        &cli.from,
        &cli.to,
        cli.force,
        cli.dry_run,
        cli.skip_test,
        cli.identity,
    )?;

    let mut replicator = Replicator::new(
        request,
        config,
        HostExecutor::new().as_executor(),
        Reporter::new(),
    );
    let report = replicator.run().await?;

    info!(
        "Replica '{}' ready from snapshot '{}' (server-id {})",
        report.target,
        report.snapshot.name,
        report
            .server_id
            .map_or_else(|| "unchanged".to_string(), |id| id.to_string())
    );
    Ok(())
}
