/// Key placement: the pure function mapping a key to its responsible nodes.
///
/// This is the one component in the coordination layer with no side effects
/// and no dependency on liveness — by design, placement decisions never
/// change because a peer looks dead (see spec §4.1/§4.2). Liveness only
/// gates whether the coordinator *attempts* a send to a node placement
/// already named.
use crate::types::NodeId;
use sha2::{Digest, Sha256};

/// Compute a 256-bit digest of `key` and interpret it as an unsigned
/// integer, big-endian. The hash is cryptographic so adversarial keys
/// cannot bias which node a key lands on.
fn hash_key(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Reduce a 256-bit digest modulo `modulus` without needing a bignum type:
/// fold the digest bytes through repeated `(acc * 256 + byte) % modulus`,
/// which is equivalent to computing the full integer mod `modulus`.
fn digest_mod(digest: &[u8; 32], modulus: u64) -> u64 {
    digest
        .iter()
        .fold(0u64, |acc, &byte| (acc * 256 + byte as u64) % modulus)
}

/// Return the ordered list of nodes responsible for `key`: `nodes[0]` is the
/// primary, the rest (up to `replication_factor` total) are replicas, taken
/// as consecutive positions on the ring starting at the hash-derived index.
///
/// `nodes` must be non-empty. `replication_factor` is clamped to
/// `nodes.len()` so a misconfigured factor larger than the cluster can't
/// panic or return duplicate entries.
pub fn responsible(key: &str, nodes: &[NodeId], replication_factor: usize) -> Vec<NodeId> {
    assert!(!nodes.is_empty(), "node set must be non-empty");
    let digest = hash_key(key);
    let start = digest_mod(&digest, nodes.len() as u64) as usize;
    let factor = replication_factor.min(nodes.len());
    (0..factor).map(|i| nodes[(start + i) % nodes.len()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: [NodeId; 3] = [8888, 8889, 8890];

    #[test]
    fn pure_function_same_inputs_same_output() {
        let a = responsible("testkey", &NODES, 2);
        let b = responsible("testkey", &NODES, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn returns_requested_replication_factor() {
        let nodes = responsible("any-key", &NODES, 2);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn replicas_are_consecutive_on_the_ring() {
        let nodes = responsible("any-key", &NODES, 2);
        let start_idx = NODES.iter().position(|&n| n == nodes[0]).unwrap();
        let expected_second = NODES[(start_idx + 1) % NODES.len()];
        assert_eq!(nodes[1], expected_second);
    }

    #[test]
    fn clamps_replication_factor_to_node_count() {
        let nodes = responsible("k", &NODES, 10);
        assert_eq!(nodes.len(), NODES.len());
    }

    #[test]
    fn different_keys_can_map_to_different_primaries() {
        // Not a hard guarantee for any single pair, but over many keys we
        // should see more than one distinct primary across a 3-node ring.
        let primaries: std::collections::HashSet<_> = (0..50)
            .map(|i| responsible(&format!("key-{i}"), &NODES, 2)[0])
            .collect();
        assert!(primaries.len() > 1);
    }

    #[test]
    fn three_node_reference_example() {
        // From spec §8: responsible("testkey") = [C, A] with A=8888, B=8889,
        // C=8890 under SHA-256. Pin this down so a placement regression is
        // caught directly rather than only through end-to-end tests.
        let nodes = responsible("testkey", &NODES, 2);
        assert_eq!(nodes, vec![8890, 8888]);
    }
}
