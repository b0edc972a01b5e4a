/// Peer liveness protocol: a dedicated heartbeat listener per node, a
/// periodic emitter that pings every configured peer, and a monitor that
/// turns the liveness snapshot into ALIVE/DEAD transition logs.
///
/// Grounded directly in the reference's `HeartbeatManager`: heartbeats are a
/// second TCP listener at `identity + 1000`, a one-line `{"type":"heartbeat",
/// "from": identity}` message, and a 2-second warm-up before failures start
/// being logged so a node's own startup doesn't look like a cluster outage.
use crate::config::{self, NodeConfig};
use crate::liveness::LivenessTracker;
use crate::transport::Listener;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::interval;

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatMessage {
    #[serde(rename = "type")]
    kind: String,
    from: u16,
}

/// Run the heartbeat receiver: accept connections on `addr`, read one
/// heartbeat line per connection, and mark the sender alive. Runs until
/// `shutdown` fires.
pub async fn run_receiver(
    addr: SocketAddr,
    tracker: Arc<LivenessTracker>,
    mut shutdown: broadcast::Receiver<()>,
) -> crate::error::CoreResult<()> {
    let listener = Listener::bind(addr).await?;
    tracing::info!(%addr, "heartbeat listener bound");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok(mut conn) => {
                        let tracker = Arc::clone(&tracker);
                        tokio::spawn(async move {
                            if let Ok(Some(line)) = conn.recv_line().await {
                                if let Ok(msg) = serde_json::from_str::<HeartbeatMessage>(&line) {
                                    tracing::debug!(from = msg.from, "heartbeat received");
                                    tracker.mark(msg.from);
                                }
                            }
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to accept heartbeat connection"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("heartbeat receiver shutting down");
                return Ok(());
            }
        }
    }
}

/// Run the heartbeat emitter: every `config.heartbeat_interval`, send a
/// heartbeat to every peer's heartbeat port. Failures are swallowed (a dead
/// peer is expected, ordinary state) but rate-limited to one diagnostic log
/// line per peer per [`config::HEARTBEAT_LOG_SUPPRESSION`], suppressed
/// entirely during the first [`config::HEARTBEAT_READY_DELAY`], and only
/// logged while the peer is still believed alive — once `tracker` marks it
/// DEAD the emitter goes quiet, matching `heartbeat_node.py`'s
/// `is_alive(target_port, HEARTBEAT_TIMEOUT)` guard on its own failure log.
pub async fn run_emitter(config: NodeConfig, tracker: Arc<LivenessTracker>, mut shutdown: broadcast::Receiver<()>) {
    let started_at = Instant::now();
    let mut last_logged: HashMap<u16, Instant> = HashMap::new();
    let mut ticker = interval(config.heartbeat_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for peer in config.peers() {
                    let addr = SocketAddr::new(config.host, peer + config::HEARTBEAT_PORT_OFFSET);
                    if let Err(err) = send_one(addr, config.identity).await {
                        if started_at.elapsed() < config::HEARTBEAT_READY_DELAY {
                            continue;
                        }
                        let should_log = tracker.alive(peer, config.heartbeat_timeout)
                            && last_logged
                                .get(&peer)
                                .is_none_or(|last| last.elapsed() >= config::HEARTBEAT_LOG_SUPPRESSION);
                        if should_log {
                            tracing::warn!(peer, error = %err, "heartbeat send failed");
                            last_logged.insert(peer, Instant::now());
                        }
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("heartbeat emitter shutting down");
                return;
            }
        }
    }
}

async fn send_one(addr: SocketAddr, from: u16) -> crate::error::CoreResult<()> {
    use crate::error::CoreError;
    use tokio::time::timeout;

    let message = json!({ "type": "heartbeat", "from": from });
    let call = async {
        let mut conn = crate::transport::Connection::connect(addr).await?;
        conn.send_line(&message).await
    };
    timeout(config::TRANSPORT_TIMEOUT, call)
        .await
        .map_err(|_| CoreError::Transport {
            peer: addr.port(),
            reason: "heartbeat send timed out".to_string(),
        })?
}

/// Run the liveness monitor: periodically snapshot [`LivenessTracker`] and
/// log ALIVE/DEAD transitions. Logging is suppressed for
/// [`config::HEARTBEAT_READY_DELAY`] after startup so every peer's initial
/// DEAD state doesn't read as a cluster-wide failure.
pub async fn run_monitor(
    config: NodeConfig,
    tracker: Arc<LivenessTracker>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let started_at = Instant::now();
    let mut known: HashMap<u16, &'static str> = HashMap::new();
    let mut ticker = interval(config.heartbeat_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if started_at.elapsed() < config::HEARTBEAT_READY_DELAY {
                    continue;
                }
                let snapshot = tracker.snapshot(config.heartbeat_timeout);
                for peer in config.peers() {
                    let status = snapshot.get(&peer).copied().unwrap_or("DEAD");
                    if known.get(&peer) != Some(&status) {
                        tracing::info!(peer, status, "peer status changed");
                        known.insert(peer, status);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("liveness monitor shutting down");
                return;
            }
        }
    }
}

/// Snapshot every configured peer's status for `get_status` responses.
pub fn statuses(config: &NodeConfig, tracker: &LivenessTracker) -> HashMap<String, &'static str> {
    config
        .peers()
        .map(|peer| {
            let status = if tracker.alive(peer, config.heartbeat_timeout) {
                "ALIVE"
            } else {
                "DEAD"
            };
            (peer.to_string(), status)
        })
        .collect()
}

#[allow(dead_code)]
fn heartbeat_addr(host: IpAddr, identity: u16) -> SocketAddr {
    SocketAddr::new(host, identity + config::HEARTBEAT_PORT_OFFSET)
}
