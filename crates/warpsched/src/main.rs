//! warpsched — the WarpGrid scheduler daemon.
//!
//! Loads a scheduler profile and a cluster file, queues every workload
//! in the file, and runs the scheduling loop against an in-memory
//! cluster until Ctrl-C (or `--exit-after`). The recorded bindings are
//! printed as JSON on exit.
//!
//! # Usage
//!
//! ```text
//! warpsched run --config scheduler.toml --cluster cluster.toml --exit-after 30
//! warpsched default-config > scheduler.toml
//! ```

mod cluster_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use warpgrid_scheduler::{InMemoryCluster, Registry, Scheduler, SchedulerConfig};

use crate::cluster_file::ClusterFile;

#[derive(Parser)]
#[command(name = "warpsched", about = "WarpGrid scheduler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule the workloads in a cluster file.
    Run {
        /// Scheduler config (TOML). Built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cluster file with nodes and pending workloads.
        #[arg(long)]
        cluster: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        exit_after: Option<u64>,

        /// Tie-break seed, overriding the config.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the default scheduler config.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,warpsched=debug,warpgrid=debug")
                }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            cluster,
            exit_after,
            seed,
        } => run(config.as_deref(), &cluster, exit_after, seed).await,
        Command::DefaultConfig => {
            print!("{}", SchedulerConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(
    config_path: Option<&Path>,
    cluster_path: &Path,
    exit_after: Option<u64>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }

    let cluster_file = ClusterFile::from_file(cluster_path)?;
    info!(
        nodes = cluster_file.nodes.len(),
        workloads = cluster_file.workloads.len(),
        "cluster file loaded"
    );

    let cluster = Arc::new(InMemoryCluster::new(cluster_file.nodes));
    let scheduler = Arc::new(
        Scheduler::new(
            &config,
            &Registry::with_builtins(),
            cluster.clone(),
            cluster.clone(),
        )
        .context("build scheduler")?,
    );

    for workload in cluster_file.workloads {
        scheduler.enqueue(workload);
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let deadline = async {
        match exit_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("install Ctrl-C handler")?;
            info!("shutdown signal received");
        }
        _ = deadline => {
            info!(?exit_after, "exit-after elapsed");
        }
    }

    let _ = shutdown_tx.send(true);
    runner.await.context("scheduler task")?;

    let bindings = cluster.bindings();
    info!(bound = bindings.len(), "WarpGrid scheduler stopped");
    println!("{}", serde_json::to_string_pretty(&bindings)?);
    Ok(())
}
