/// Error types for ringkv's coordination layer.
///
/// This module provides the error hierarchy used across the whole crate. All
/// fallible operations return `Result<T, CoreError>`, giving the coordinator
/// a single type to pattern-match on when deciding how a failure should be
/// surfaced to a client or swallowed and retried against another peer.
use thiserror::Error;

/// The main error type for ringkv operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A peer call failed: connection refused, timed out, reset mid-read,
    /// returned a malformed frame, or returned an empty response. The
    /// coordinator treats every one of these identically to "peer is down
    /// for this request" — see the call sites in `coordinator`.
    #[error("transport error contacting {peer}: {reason}")]
    Transport { peer: u16, reason: String },

    /// The request was missing its `action` field, or was missing `key`
    /// for an action that requires one.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// `action` did not match any recognized variant.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The key is absent locally, or present only as a tombstone visible to
    /// an external (non-internal) caller.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Persisting the store snapshot failed. This is the only internal
    /// failure allowed to abort a request (see spec §7).
    #[error("store persistence failed: {0}")]
    StoreFailure(String),

    /// Failure to bind a listener at startup. The one error class that is
    /// fatal to the process.
    #[error("failed to bind {0}: {1}")]
    BindFailure(std::net::SocketAddr, String),

    /// Malformed JSON on the wire, surfaced distinctly from `Transport` so
    /// callers that parse their own requests (rather than forwarding one to
    /// a peer) can tell "I sent garbage" from "the peer is unreachable".
    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type alias for ringkv operations.
pub type CoreResult<T> = Result<T, CoreError>;
