//! Transport facade the heartbeat core dispatches through. The wire
//! protocol, connection pooling, and TLS live behind this seam; the core
//! only depends on the request/reply contract and on the ability to force
//! a reconnect for a persistently unresponsive peer.

use crate::group::NodeId;
use crate::wire::{HeartbeatRequest, HeartbeatReply};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use thiserror::Error;

pub type PinFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Zstd,
}

/// Per-call options for a batched heartbeat send.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatClientOpts {
    /// Transport-enforced deadline; elapsing it yields a routed error.
    pub deadline: Instant,
    pub compression: CompressionType,
    /// Payloads below this size are sent uncompressed.
    pub min_compression_bytes: usize,
}

/// Transport-level heartbeat failure.
///
/// Cloneable by design: a single failed batch is routed to every group it
/// carried, and each group receives the error value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection to {node} lost: {details}")]
    ConnectionLost { node: NodeId, details: String },
    #[error("heartbeat rpc to {node} timed out after {after_ms} ms")]
    Timeout { node: NodeId, after_ms: u64 },
    #[error("node {node} unavailable: {details}")]
    Unavailable { node: NodeId, details: String },
}

pub trait HeartbeatTransport: Send + Sync {
    /// Send one batched heartbeat request to `target`, resolving with the
    /// batched reply or a transport failure once `opts.deadline` elapses.
    fn heartbeat(
        &self,
        target: NodeId,
        request: HeartbeatRequest,
        opts: HeartbeatClientOpts,
    ) -> PinFuture<Result<HeartbeatReply, TransportError>>;

    /// Tear down the underlying connection to `target`, if any. Resolves
    /// with whether a connection was actually torn down.
    fn ensure_disconnect(&self, target: NodeId) -> PinFuture<bool>;
}
