/// Process-wide configuration for a ringkv node.
///
/// Everything here is fixed at startup and never reloaded — the node set in
/// particular is assumed stable for the lifetime of the process (see the
/// Non-goals around dynamic membership).
use std::net::IpAddr;
use std::time::Duration;

/// Default bind host for both listeners.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default replication factor (primary + one replica).
pub const DEFAULT_REPLICATION_FACTOR: usize = 2;

/// Default interval between heartbeat emissions.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Default window after which a silent peer is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Offset added to a node's identity to get its heartbeat listener port.
pub const HEARTBEAT_PORT_OFFSET: u16 = 1000;

/// Delay after the main listener is up before anti-entropy runs, giving
/// peers a chance to notice this node came back.
pub const ANTI_ENTROPY_WARMUP: Duration = Duration::from_secs(3);

/// Warm-up period during which heartbeat send failures are not logged.
pub const HEARTBEAT_READY_DELAY: Duration = Duration::from_secs(2);

/// Minimum gap between repeated "could not reach peer" diagnostics.
pub const HEARTBEAT_LOG_SUPPRESSION: Duration = Duration::from_secs(5);

/// Bounded timeout applied to every outbound peer call (connect + read).
pub const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for one node process.
///
/// Built from CLI arguments in `bin/ringkv_node.rs`; the reference
/// implementation instead reads a shared `config.py` module, but a crate
/// meant to run three independent OS processes is better served by a config
/// each process builds for itself from its own argv.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This process's own identity (and port).
    pub identity: u16,
    /// The full, ordered, fixed set of node identities in the cluster.
    pub nodes: Vec<u16>,
    /// Number of nodes responsible for each key (primary + replicas).
    pub replication_factor: usize,
    /// Bind host for both listeners.
    pub host: IpAddr,
    /// Interval between heartbeat emissions.
    pub heartbeat_interval: Duration,
    /// Window after which a silent peer is considered dead.
    pub heartbeat_timeout: Duration,
}

impl NodeConfig {
    /// This node's heartbeat listener port.
    pub fn heartbeat_port(&self) -> u16 {
        self.identity + HEARTBEAT_PORT_OFFSET
    }

    /// The other configured nodes, excluding self.
    pub fn peers(&self) -> impl Iterator<Item = u16> + '_ {
        self.nodes.iter().copied().filter(move |&n| n != self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_config() -> NodeConfig {
        NodeConfig {
            identity: 8888,
            nodes: vec![8888, 8889, 8890],
            replication_factor: 2,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }

    #[test]
    fn heartbeat_port_is_identity_plus_offset() {
        let cfg = sample_config();
        assert_eq!(cfg.heartbeat_port(), 9888);
    }

    #[test]
    fn peers_excludes_self() {
        let cfg = sample_config();
        let peers: Vec<_> = cfg.peers().collect();
        assert_eq!(peers, vec![8889, 8890]);
    }
}
