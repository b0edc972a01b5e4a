/// Anti-entropy: the on-startup pass that pulls peer key lists and
/// pairwise-reconciles every key this node is responsible for.
///
/// Grounded in the reference's `sync_missing_data()`: ask every reachable
/// peer for its key list, union it with the local keys, then for each
/// candidate this node is responsible for, pull the record from every other
/// responsible peer and keep whichever is dominant under `(version,
/// deleted)` ordering (spec §4.7).
use crate::coordinator::Coordinator;
use crate::protocol::{Request, Response};
use crate::transport;
use crate::types::Record;
use std::collections::BTreeSet;
use std::net::SocketAddr;

/// Run one anti-entropy pass against every other configured node.
pub async fn run(coordinator: &Coordinator) {
    tracing::info!("anti-entropy pass starting");

    let candidates = collect_candidate_keys(coordinator).await;
    tracing::debug!(count = candidates.len(), "anti-entropy candidate keys collected");

    for key in candidates {
        reconcile_key(coordinator, &key).await;
    }

    tracing::info!("anti-entropy pass complete");
}

async fn collect_candidate_keys(coordinator: &Coordinator) -> BTreeSet<String> {
    let config = coordinator.config();
    let mut candidates: BTreeSet<String> = coordinator.store().keys().await.into_iter().collect();

    for peer in config.peers() {
        if !coordinator.tracker().alive(peer, config.heartbeat_timeout) {
            continue;
        }
        let addr = SocketAddr::new(config.host, peer);
        match transport::request(addr, &Request::ListKeys).await {
            Ok(Response::Ok { keys: Some(keys), .. }) => candidates.extend(keys),
            Ok(_) => {}
            Err(err) => tracing::debug!(peer, error = %err, "anti-entropy: list_keys failed"),
        }
    }

    candidates
}

async fn reconcile_key(coordinator: &Coordinator, key: &str) {
    let config = coordinator.config();
    let nodes = crate::placement::responsible(key, &config.nodes, config.replication_factor);
    if !nodes.contains(&config.identity) {
        return;
    }

    let mut local = coordinator
        .store()
        .get(key)
        .await
        .unwrap_or(Record { value: None, version: 0, deleted: false });

    for peer in nodes.iter().copied().filter(|&n| n != config.identity) {
        if !coordinator.tracker().alive(peer, config.heartbeat_timeout) {
            continue;
        }

        let addr = SocketAddr::new(config.host, peer);
        let request = Request::Get { key: key.to_string(), internal: false }.mark_internal();
        let remote = match transport::request(addr, &request).await {
            Ok(Response::Ok { value: Some(record), .. }) => record,
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(peer, key, error = %err, "anti-entropy: get failed");
                continue;
            }
        };

        if remote.dominates(&local) {
            local = remote;
        }
    }

    if local.version > 0 {
        if let Err(err) = coordinator.apply_reconciled(&key.to_string(), local).await {
            tracing::warn!(key, error = %err, "anti-entropy: failed to persist reconciled record");
        }
    }
}
