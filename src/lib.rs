//! Leader heartbeat coordination core for fleets of co-located Raft
//! consensus groups: per-tick request planning with piggyback elision,
//! per-destination batching, concurrent dispatch with bounded waits, and
//! reply demultiplexing back into per-group state.
#![deny(unreachable_pub)]
#![deny(unused_must_use)]

pub mod group;
pub mod manager;
pub mod plan;
pub mod registry;
pub mod telemetry;
pub mod timeouts;
pub mod transport;
pub mod wire;

pub use group::{ConsensusGroup, GroupId, GroupMeta, NodeId, VNode};
pub use manager::{HeartbeatConfig, HeartbeatError, HeartbeatManager};
pub use plan::{plan_heartbeats, FollowerReqMeta, NodeHeartbeat, PlannedHeartbeats};
pub use registry::GroupRegistry;
pub use telemetry::{MetricsSnapshot, SharedMetricsRegistry, TelemetryError};
pub use transport::{
    CompressionType, HeartbeatClientOpts, HeartbeatTransport, PinFuture, TransportError,
};
pub use wire::{AckStatus, AppendEntriesAck, HeartbeatMetadata, HeartbeatReply, HeartbeatRequest};
