/// Peer liveness tracking.
///
/// A process-wide registry of "when did we last hear from this peer". The
/// heartbeat receiver writes to it; the coordinator and anti-entropy read
/// from it. Reads and writes are individually atomic with respect to each
/// other — no compound transaction is required (spec §4.2) — which a
/// concurrent map gives us for free.
use crate::types::NodeId;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Process-wide last-heard-from registry for cluster peers.
///
/// A peer that has never been heard from is conservatively DEAD. Placement
/// never consults this — the coordinator always computes the full
/// responsible list and uses liveness only to decide whether to *attempt* a
/// send to a given member of that list.
#[derive(Debug, Default)]
pub struct LivenessTracker {
    last_heard: DashMap<NodeId, Instant>,
}

impl LivenessTracker {
    /// Create an empty tracker. Every peer starts DEAD.
    pub fn new() -> Self {
        Self {
            last_heard: DashMap::new(),
        }
    }

    /// Record that `peer` was just heard from.
    pub fn mark(&self, peer: NodeId) {
        self.last_heard.insert(peer, Instant::now());
    }

    /// True iff `peer` has been heard from within `timeout`.
    pub fn alive(&self, peer: NodeId, timeout: Duration) -> bool {
        self.last_heard
            .get(&peer)
            .is_some_and(|last| last.elapsed() < timeout)
    }

    /// Snapshot every known peer as `"ALIVE"` or `"DEAD"` under `timeout`.
    pub fn snapshot(&self, timeout: Duration) -> std::collections::HashMap<NodeId, &'static str> {
        self.last_heard
            .iter()
            .map(|entry| {
                let status = if entry.value().elapsed() < timeout {
                    "ALIVE"
                } else {
                    "DEAD"
                };
                (*entry.key(), status)
            })
            .collect()
    }
}
