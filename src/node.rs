/// Node process orchestration: owns the config, store, and liveness
/// tracker, binds both listeners, and spawns every concurrent task under a
/// shared shutdown broadcast channel.
///
/// Grounded in the teacher's `cluster.rs::ClusterNode` task-spawning shape
/// (`tokio::select!` over `listener.accept()` and a shutdown receiver, one
/// task per concern), adapted to this system's components: one main
/// request listener, a heartbeat emitter/receiver/monitor trio, and a
/// one-shot anti-entropy pass after the startup warm-up (spec §4.8).
use crate::config::{self, NodeConfig};
use crate::coordinator::Coordinator;
use crate::error::CoreResult;
use crate::heartbeat;
use crate::liveness::LivenessTracker;
use crate::reconciliation;
use crate::store::LocalStore;
use crate::transport::Listener;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A running node process: the bound listeners, spawned tasks, and the
/// shutdown handle that stops them all.
pub struct Node {
    config: NodeConfig,
    coordinator: Arc<Coordinator>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Node {
    /// Build a node from `config`, opening its store at `data_dir`. Binds
    /// neither listener yet — that happens in [`Node::run`].
    pub async fn new(config: NodeConfig, data_dir: impl Into<PathBuf>) -> Self {
        let store_path = data_dir.into().join(format!("store_{}.json", config.identity));
        let store = Arc::new(LocalStore::open(store_path).await);
        let tracker = Arc::new(LivenessTracker::new());
        let coordinator = Arc::new(Coordinator::new(config.clone(), store, tracker));
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { config, coordinator, shutdown_tx }
    }

    /// Bind both listeners and run every task until `shutdown` fires (Ctrl-C
    /// or an explicit call to [`Node::shutdown`]). Returns once every task
    /// has wound down.
    pub async fn run(&self) -> CoreResult<()> {
        let main_addr = SocketAddr::new(self.config.host, self.config.identity);
        let heartbeat_addr = SocketAddr::new(self.config.host, self.config.heartbeat_port());

        let listener = Listener::bind(main_addr).await?;
        tracing::info!(identity = self.config.identity, %main_addr, "main listener bound");

        let mut tasks = Vec::new();

        {
            let coordinator = Arc::clone(&self.coordinator);
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                accept_loop(listener, coordinator, &mut shutdown).await;
            }));
        }

        {
            let tracker = Arc::clone(self.coordinator.tracker());
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = heartbeat::run_receiver(heartbeat_addr, tracker, shutdown).await {
                    tracing::error!(error = %err, "heartbeat listener failed");
                }
            }));
        }

        {
            let config = self.config.clone();
            let tracker = Arc::clone(self.coordinator.tracker());
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(heartbeat::run_emitter(config, tracker, shutdown)));
        }

        {
            let config = self.config.clone();
            let tracker = Arc::clone(self.coordinator.tracker());
            let shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(heartbeat::run_monitor(config, tracker, shutdown)));
        }

        {
            let coordinator = Arc::clone(&self.coordinator);
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(config::ANTI_ENTROPY_WARMUP) => {
                        reconciliation::run(&coordinator).await;
                    }
                    _ = shutdown.recv() => {}
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Trigger shutdown of every spawned task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}

async fn accept_loop(listener: Listener, coordinator: Arc<Coordinator>, shutdown: &mut broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok(conn) => {
                        let coordinator = Arc::clone(&coordinator);
                        tokio::spawn(async move {
                            serve_connection(conn, coordinator).await;
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to accept connection"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("main listener shutting down");
                return;
            }
        }
    }
}

/// Loop over one accepted connection: read a framed request, hand it to the
/// coordinator, write the framed response, repeat until the peer closes.
/// A per-request error becomes an `{status: ERROR}` reply; the connection
/// itself stays open (spec §4.5).
async fn serve_connection(mut conn: crate::transport::Connection, coordinator: Arc<Coordinator>) {
    loop {
        let line = match conn.recv_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "connection read failed, closing");
                return;
            }
        };

        let response = match crate::protocol::parse_request(&line) {
            Ok(request) => coordinator.handle(request).await,
            Err(err) => err.into(),
        };

        if let Err(err) = conn.send_line(&response).await {
            tracing::debug!(error = %err, "connection write failed, closing");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(identity: u16) -> NodeConfig {
        NodeConfig {
            identity,
            nodes: vec![identity],
            replication_factor: 1,
            host: std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn node_binds_and_shuts_down_cleanly() {
        let dir = tempdir().unwrap();
        let node = Node::new(test_config(17001), dir.path()).await;

        let handle = {
            let node = Arc::new(node);
            let runner = Arc::clone(&node);
            let task = tokio::spawn(async move { runner.run().await });
            tokio::time::sleep(Duration::from_millis(100)).await;
            node.shutdown();
            task
        };

        handle.await.unwrap().unwrap();
    }
}
