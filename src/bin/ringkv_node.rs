/// ringkv-node — launch one node of a ringkv cluster.
///
/// Usage:
///   ringkv-node <identity> [--host <addr>] [--nodes <n1,n2,...>]
///               [--replication-factor <r>] [--heartbeat-interval-ms <ms>]
///               [--heartbeat-timeout-ms <ms>] [--data-dir <path>]
///
/// Every flag overrides an ambient default (spec §4.9/§4.11); none affects
/// the coordination semantics implemented in `ringkv::coordinator`.
use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use ringkv::config::{self, NodeConfig};
use ringkv::node::Node;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Start a ringkv node process.
#[derive(Parser)]
#[command(name = "ringkv-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// This node's identity (also its listener port).
    identity: u16,

    /// Bind host shared by the main and heartbeat listeners.
    #[arg(long, default_value = config::DEFAULT_HOST)]
    host: IpAddr,

    /// Comma-separated full node set, including this node's own identity.
    #[arg(long, value_delimiter = ',', default_value = "8888,8889,8890")]
    nodes: Vec<u16>,

    /// Number of nodes responsible for each key (primary + replicas).
    #[arg(long, default_value_t = config::DEFAULT_REPLICATION_FACTOR)]
    replication_factor: usize,

    /// Interval between heartbeat emissions, in milliseconds.
    #[arg(long, default_value_t = config::DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64)]
    heartbeat_interval_ms: u64,

    /// Window after which a silent peer is considered dead, in milliseconds.
    #[arg(long, default_value_t = config::DEFAULT_HEARTBEAT_TIMEOUT.as_millis() as u64)]
    heartbeat_timeout_ms: u64,

    /// Directory for this node's snapshot file.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Override RINGKV_LOG for this run (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_level {
        Some(level) => ringkv::init_logging_with_level(level),
        None => ringkv::init_logging(),
    }

    if !cli.nodes.contains(&cli.identity) {
        bail!(
            "identity {} is not a member of the configured node set {:?}",
            cli.identity,
            cli.nodes
        );
    }

    let config = NodeConfig {
        identity: cli.identity,
        nodes: cli.nodes,
        replication_factor: cli.replication_factor,
        host: cli.host,
        heartbeat_interval: Duration::from_millis(cli.heartbeat_interval_ms),
        heartbeat_timeout: Duration::from_millis(cli.heartbeat_timeout_ms),
    };

    println!(
        "{} starting node {} {}",
        "ringkv".bold().cyan(),
        config.identity,
        format!("(peers: {:?})", config.peers().collect::<Vec<_>>()).dimmed()
    );

    let node = Node::new(config, cli.data_dir).await;

    tokio::select! {
        result = node.run() => {
            result.context("node exited with an error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "shutting down...".yellow());
            node.shutdown();
        }
    }

    Ok(())
}
