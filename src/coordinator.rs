/// The request state machine: placement-aware PUT/DELETE with primary
/// forwarding and partition fallback, GET with peer fan-out, and the
/// replica-apply/introspection actions peers use on each other.
///
/// Grounded directly in the reference's `KVNodeLogic.handle()`, one branch
/// per action (spec §4.6). The reference dispatches by string comparison;
/// here each branch is a match arm over [`Request`]'s variants instead.
use crate::config::NodeConfig;
use crate::error::CoreResult;
use crate::heartbeat;
use crate::liveness::LivenessTracker;
use crate::placement;
use crate::protocol::{Request, Response};
use crate::store::LocalStore;
use crate::transport;
use crate::types::{Key, NodeId, Record};
use serde_json::Value as JsonValue;
use std::net::SocketAddr;
use std::sync::Arc;

/// Holds the references a request needs: config (for placement/peers),
/// the local store, and the liveness tracker. Constructed once per node and
/// shared (via `Arc`) across every accepted connection.
pub struct Coordinator {
    config: NodeConfig,
    store: Arc<LocalStore>,
    tracker: Arc<LivenessTracker>,
}

impl Coordinator {
    pub fn new(config: NodeConfig, store: Arc<LocalStore>, tracker: Arc<LivenessTracker>) -> Self {
        Self { config, store, tracker }
    }

    fn peer_addr(&self, node: NodeId) -> SocketAddr {
        SocketAddr::new(self.config.host, node)
    }

    fn responsible(&self, key: &str) -> Vec<NodeId> {
        placement::responsible(key, &self.config.nodes, self.config.replication_factor)
    }

    fn is_alive(&self, peer: NodeId) -> bool {
        self.tracker.alive(peer, self.config.heartbeat_timeout)
    }

    /// Dispatch one decoded request to its handler.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Put { key, value, forwarded } => self.handle_put(key, value, forwarded).await,
            Request::Delete { key, forwarded } => self.handle_delete(key, forwarded).await,
            Request::Get { key, internal } => self.handle_get(key, internal).await,
            Request::ReplicaPut { key, value, version } => self.handle_replica_put(key, value, version).await,
            Request::ReplicaDelete { key, version } => self.handle_replica_delete(key, version).await,
            Request::ListKeys => self.handle_list_keys().await,
            Request::GetStatus => self.handle_get_status(),
            Request::GetAllData => self.handle_get_all_data().await,
        }
    }

    async fn handle_put(&self, key: Key, value: JsonValue, forwarded: bool) -> Response {
        let nodes = self.responsible(&key);
        let primary = nodes[0];

        if primary == self.config.identity {
            return self.write_as_primary(&key, Some(value), &nodes).await;
        }

        if forwarded || !self.is_alive(primary) {
            return self.fallback(&key, Some(value), &nodes).await;
        }

        let forward = Request::Put { key: key.clone(), value: value.clone(), forwarded: false }.mark_forwarded();
        match transport::request(self.peer_addr(primary), &forward).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(primary, key, error = %err, "forward to primary failed, falling back");
                self.fallback(&key, Some(value), &nodes).await
            }
        }
    }

    async fn handle_delete(&self, key: Key, forwarded: bool) -> Response {
        let nodes = self.responsible(&key);
        let primary = nodes[0];

        if primary == self.config.identity {
            return self.write_as_primary(&key, None, &nodes).await;
        }

        if forwarded || !self.is_alive(primary) {
            return self.fallback(&key, None, &nodes).await;
        }

        let forward = Request::Delete { key: key.clone(), forwarded: false }.mark_forwarded();
        match transport::request(self.peer_addr(primary), &forward).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(primary, key, error = %err, "forward to primary failed, falling back");
                self.fallback(&key, None, &nodes).await
            }
        }
    }

    /// Primary-driven write path shared by `put` (`value = Some(_)`) and
    /// `delete` (`value = None`): bump the version, write, persist, then
    /// best-effort fan the new record out to every replica regardless of
    /// believed liveness (spec §4.6.1/§4.6.2) — an unreachable replica is
    /// expected to heal via anti-entropy.
    async fn write_as_primary(&self, key: &Key, value: Option<JsonValue>, nodes: &[NodeId]) -> Response {
        let existing = self.store.get(key).await;
        let new_version = existing.as_ref().map(|r| r.version).unwrap_or(0) + 1;
        let deleted = value.is_none();
        let record = match value {
            Some(value) => Record::live(value, new_version),
            None => Record::tombstone(new_version),
        };

        if let Err(err) = self.store.put_record(key.clone(), record.clone()).await {
            return Response::from(err);
        }

        self.fan_out_replicas(key, &record, nodes[1..].iter().copied()).await;

        let message = if deleted {
            format!("Deleted {key}")
        } else if existing.is_some() {
            format!("Updated {key}")
        } else {
            format!("Stored {key}")
        };
        Response::ok_message(message)
    }

    /// The fallback path (spec §4.6.4): a non-primary node promotes itself
    /// for this one request because the primary is unreachable. Differs
    /// from the primary path only in which replicas get the fan-out — here
    /// only members of `nodes` that are *currently alive* are attempted,
    /// since an unreachable primary is exactly the reason we're here.
    async fn fallback(&self, key: &Key, value: Option<JsonValue>, nodes: &[NodeId]) -> Response {
        let existing = self.store.get(key).await;
        let new_version = existing.as_ref().map(|r| r.version).unwrap_or(0) + 1;
        let deleted = value.is_none();
        let record = match value {
            Some(value) => Record::live(value, new_version),
            None => Record::tombstone(new_version),
        };

        if let Err(err) = self.store.put_record(key.clone(), record.clone()).await {
            return Response::from(err);
        }

        let identity = self.config.identity;
        let targets = nodes
            .iter()
            .copied()
            .filter(|&n| n != identity && self.is_alive(n));
        self.fan_out_replicas(key, &record, targets).await;

        let message = if deleted {
            format!("[Fallback] Deleted {key}")
        } else {
            format!("[Fallback] Stored {key}")
        };
        Response::ok_message(message)
    }

    async fn fan_out_replicas(&self, key: &Key, record: &Record, targets: impl IntoIterator<Item = NodeId>) {
        for node in targets {
            let request = if record.deleted {
                Request::ReplicaDelete { key: key.clone(), version: record.version }
            } else {
                Request::ReplicaPut {
                    key: key.clone(),
                    value: record.value.clone().expect("non-tombstone record always carries a value"),
                    version: record.version,
                }
            };
            if let Err(err) = transport::request(self.peer_addr(node), &request).await {
                tracing::debug!(node, key, error = %err, "replica fan-out failed, will heal via anti-entropy");
            }
        }
    }

    async fn handle_get(&self, key: Key, internal: bool) -> Response {
        if let Some(record) = self.store.get(&key).await {
            if record.deleted && !internal {
                return Response::not_found();
            }
            return Response::ok_value(record);
        }

        if internal {
            // Internal reads never cascade further — this is what stops
            // anti-entropy and forwarded GETs from chaining across peers.
            return Response::not_found();
        }

        let nodes = self.responsible(&key);
        for peer in nodes.into_iter().filter(|&n| n != self.config.identity) {
            if !self.is_alive(peer) {
                continue;
            }
            let forward = Request::Get { key: key.clone(), internal: false }.mark_internal();
            match transport::request(self.peer_addr(peer), &forward).await {
                Ok(response) if response.is_ok() => return response,
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!(peer, key, error = %err, "get fan-out to peer failed");
                }
            }
        }

        Response::not_found()
    }

    async fn handle_replica_put(&self, key: Key, value: JsonValue, version: u64) -> Response {
        let existing = self.store.get(&key).await;
        if existing.as_ref().is_none_or(|r| version > r.version) {
            let record = Record::live(value, version);
            if let Err(err) = self.store.put_record(key.clone(), record).await {
                return Response::from(err);
            }
            return Response::ok_message(format!("Applied replica write for {key}"));
        }
        Response::ok_message(format!("Ignored stale replica write for {key}"))
    }

    async fn handle_replica_delete(&self, key: Key, version: u64) -> Response {
        let existing = self.store.get(&key).await;
        if existing.as_ref().is_none_or(|r| version > r.version) {
            let record = Record::tombstone(version);
            if let Err(err) = self.store.put_record(key.clone(), record).await {
                return Response::from(err);
            }
            return Response::ok_message(format!("Applied replica delete for {key}"));
        }
        Response::ok_message(format!("Ignored stale replica delete for {key}"))
    }

    async fn handle_list_keys(&self) -> Response {
        Response::ok_keys(self.store.keys().await)
    }

    fn handle_get_status(&self) -> Response {
        let mut statuses = heartbeat::statuses(&self.config, &self.tracker);
        statuses.insert(self.config.identity.to_string(), "ALIVE");
        Response::ok_status(statuses)
    }

    async fn handle_get_all_data(&self) -> Response {
        let all = self.store.all().await;
        Response::ok_data(serde_json::to_value(all).expect("the local map always serializes"))
    }

    /// Accessors used by `node` and `reconciliation` to reach the
    /// coordinator's shared state without duplicating construction.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<LivenessTracker> {
        &self.tracker
    }

    /// Apply a locally-decided record for `key`, used by anti-entropy to
    /// write a reconciled value without going through the request-shaped
    /// put/delete paths (no version bump, no replica fan-out — anti-entropy
    /// already talked to the peer that owns this record).
    pub async fn apply_reconciled(&self, key: &Key, record: Record) -> CoreResult<()> {
        self.store.put_record(key.clone(), record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn coordinator(identity: NodeId, nodes: Vec<NodeId>) -> Coordinator {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path().join("store.json")).await);
        let config = NodeConfig {
            identity,
            nodes,
            replication_factor: 2,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(200),
        };
        Coordinator::new(config, store, Arc::new(LivenessTracker::new()))
    }

    #[tokio::test]
    async fn put_on_primary_stores_then_updates() {
        let nodes = placement::responsible("k", &[7001, 7002], 2);
        let coord = coordinator(nodes[0], vec![7001, 7002]).await;

        let resp = coord
            .handle(Request::Put { key: "k".into(), value: json!("a"), forwarded: false })
            .await;
        match resp {
            Response::Ok { message, .. } => assert_eq!(message.unwrap(), "Stored k"),
            _ => panic!("expected Ok"),
        }

        let resp = coord
            .handle(Request::Put { key: "k".into(), value: json!("b"), forwarded: false })
            .await;
        match resp {
            Response::Ok { message, .. } => assert_eq!(message.unwrap(), "Updated k"),
            _ => panic!("expected Ok"),
        }

        let stored = coord.store().get("k").await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.value, Some(json!("b")));
    }

    #[tokio::test]
    async fn delete_writes_a_tombstone() {
        let nodes = placement::responsible("k", &[7001, 7002], 2);
        let coord = coordinator(nodes[0], vec![7001, 7002]).await;
        coord
            .handle(Request::Put { key: "k".into(), value: json!("a"), forwarded: false })
            .await;
        coord.handle(Request::Delete { key: "k".into(), forwarded: false }).await;

        let stored = coord.store().get("k").await.unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn external_get_hides_tombstones() {
        let nodes = placement::responsible("k", &[7001, 7002], 2);
        let coord = coordinator(nodes[0], vec![7001, 7002]).await;
        coord.handle(Request::Delete { key: "k".into(), forwarded: false }).await;

        let resp = coord.handle(Request::Get { key: "k".into(), internal: false }).await;
        assert!(matches!(resp, Response::NotFound { .. }));

        let resp = coord.handle(Request::Get { key: "k".into(), internal: true }).await;
        match resp {
            Response::Ok { value, .. } => assert!(value.unwrap().deleted),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn missing_key_internal_get_does_not_cascade() {
        let coord = coordinator(7001, vec![7001, 7002]).await;
        // 7002 is never marked alive, so if this cascaded it would time out.
        let resp = coord.handle(Request::Get { key: "missing".into(), internal: true }).await;
        assert!(matches!(resp, Response::NotFound { .. }));
    }

    #[tokio::test]
    async fn put_on_non_primary_falls_back_when_primary_dead() {
        let nodes = placement::responsible("k", &[7001, 7002], 2);
        let primary = nodes[0];
        let replica = nodes.into_iter().find(|&n| n != primary).unwrap();
        let coord = coordinator(replica, vec![primary, replica]).await;

        let resp = coord
            .handle(Request::Put { key: "k".into(), value: json!("a"), forwarded: false })
            .await;
        match resp {
            Response::Ok { message, .. } => assert!(message.unwrap().starts_with("[Fallback]")),
            _ => panic!("expected Ok"),
        }
        assert!(coord.store().get("k").await.is_some());
    }

    #[tokio::test]
    async fn forwarded_put_on_non_primary_goes_straight_to_fallback() {
        let nodes = placement::responsible("k", &[7001, 7002], 2);
        let primary = nodes[0];
        let replica = nodes.into_iter().find(|&n| n != primary).unwrap();
        let coord = coordinator(replica, vec![primary, replica]).await;

        // forwarded:true with an unreachable (never-marked-alive) primary
        // must not attempt to forward again — straight to fallback.
        let resp = coord
            .handle(Request::Put { key: "k".into(), value: json!("a"), forwarded: true })
            .await;
        match resp {
            Response::Ok { message, .. } => assert!(message.unwrap().starts_with("[Fallback]")),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn replica_put_ignores_stale_version() {
        let coord = coordinator(7001, vec![7001, 7002]).await;
        coord
            .handle(Request::ReplicaPut { key: "k".into(), value: json!("new"), version: 5 })
            .await;
        coord
            .handle(Request::ReplicaPut { key: "k".into(), value: json!("stale"), version: 3 })
            .await;

        let stored = coord.store().get("k").await.unwrap();
        assert_eq!(stored.version, 5);
        assert_eq!(stored.value, Some(json!("new")));
    }

    #[tokio::test]
    async fn replica_delete_ignores_stale_version() {
        let coord = coordinator(7001, vec![7001, 7002]).await;
        coord
            .handle(Request::ReplicaPut { key: "k".into(), value: json!("v"), version: 5 })
            .await;
        coord.handle(Request::ReplicaDelete { key: "k".into(), version: 2 }).await;

        let stored = coord.store().get("k").await.unwrap();
        assert!(!stored.deleted);
        assert_eq!(stored.version, 5);
    }

    #[tokio::test]
    async fn list_keys_includes_tombstones() {
        let coord = coordinator(7001, vec![7001, 7002]).await;
        coord.handle(Request::Delete { key: "k".into(), forwarded: false }).await;
        let resp = coord.handle(Request::ListKeys).await;
        match resp {
            Response::Ok { keys, .. } => assert_eq!(keys.unwrap(), vec!["k".to_string()]),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn get_status_reports_self_alive_and_others_from_tracker() {
        let coord = coordinator(7001, vec![7001, 7002, 7003]).await;
        coord.tracker().mark(7002);

        let resp = coord.handle(Request::GetStatus).await;
        match resp {
            Response::Ok { data, .. } => {
                let data = data.unwrap();
                assert_eq!(data["7001"], json!("ALIVE"));
                assert_eq!(data["7002"], json!("ALIVE"));
                assert_eq!(data["7003"], json!("DEAD"));
            }
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn get_all_data_reports_the_full_map() {
        let coord = coordinator(7001, vec![7001, 7002]).await;
        coord
            .handle(Request::Put { key: "k".into(), value: json!("v"), forwarded: false })
            .await;
        let resp = coord.handle(Request::GetAllData).await;
        match resp {
            Response::Ok { data, .. } => assert!(data.unwrap().get("k").is_some()),
            _ => panic!("expected Ok"),
        }
    }
}
