//! # ringkv
//!
//! A small fixed-membership distributed key-value store. A fixed set of
//! peer nodes each hold a local copy of the keyspace; every key is assigned
//! to an ordered group of responsible nodes by consistent placement, the
//! first of which is the primary. Clients may PUT / GET / DELETE against
//! any node: that node routes the request to the right replica group,
//! falls back to a local write when the primary is unreachable, and heals
//! divergent copies through an anti-entropy pass on startup.
//!
//! ## Quick start
//!
//! ```ignore
//! use ringkv::config::NodeConfig;
//! use ringkv::node::Node;
//!
//! #[tokio::main]
//! async fn main() {
//!     ringkv::init_logging();
//!     let config = NodeConfig {
//!         identity: 8888,
//!         nodes: vec![8888, 8889, 8890],
//!         replication_factor: 2,
//!         host: "127.0.0.1".parse().unwrap(),
//!         heartbeat_interval: std::time::Duration::from_secs(2),
//!         heartbeat_timeout: std::time::Duration::from_secs(5),
//!     };
//!     let node = Node::new(config, "data").await;
//!     node.run().await.unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! Leaf to root: [`placement`] (pure key → node-list function), [`liveness`]
//! (peer up/down tracking), [`heartbeat`] (keeps liveness current),
//! [`store`] (the local map and its snapshot persistence), [`transport`]
//! (newline-JSON framing over TCP), [`protocol`] (the request/response wire
//! types), [`coordinator`] (the PUT/GET/DELETE state machine),
//! [`reconciliation`] (the startup anti-entropy pass), and [`node`], which
//! wires all of the above into one running process.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod liveness;
pub mod node;
pub mod placement;
pub mod protocol;
pub mod reconciliation;
pub mod store;
pub mod transport;
pub mod types;

pub use coordinator::Coordinator;
pub use error::{CoreError, CoreResult};
pub use node::Node;
pub use protocol::{parse_request, Request, Response};
pub use types::{Key, NodeId, Record};

/// Commonly used types, for `use ringkv::prelude::*;`.
pub mod prelude {
    pub use crate::config::NodeConfig;
    pub use crate::coordinator::Coordinator;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::node::Node;
    pub use crate::protocol::{Request, Response};
    pub use crate::types::{Key, NodeId, Record};
}

/// Initialize structured logging.
///
/// Call once at process startup. The log level is controlled by the
/// `RINGKV_LOG` environment variable (`error`, `warn`, `info` — the
/// default, `debug`, or `trace`); each component tags its spans with a
/// target (a node's identity, `heartbeat`, or `anti-entropy`) so combined
/// multi-node output can be told apart.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("RINGKV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Initialize logging at an explicit level, ignoring `RINGKV_LOG`. Used by
/// the CLI's `--log-level` override.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
