//! Value types carried by the heartbeat transport: one batched request per
//! destination node and one batched reply per request.

use crate::group::{GroupId, GroupMeta, VNode};
use serde::{Deserialize, Serialize};

/// One group's beat to one follower within a batched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMetadata {
    pub meta: GroupMeta,
    /// The local leader's vnode for this group.
    pub source: VNode,
    /// The follower incarnation this beat is addressed to. Self-beats carry
    /// the leader's own vnode here.
    pub target: VNode,
}

/// Batched heartbeat request addressed to a single destination node.
///
/// Entry order is insertion order from planning; it is part of the request
/// contract so that batching is deterministic for a deterministic registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub heartbeats: Vec<HeartbeatMetadata>,
}

impl HeartbeatRequest {
    pub fn new(heartbeats: Vec<HeartbeatMetadata>) -> Self {
        Self { heartbeats }
    }
}

/// Follower-side disposition of one group's beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    Success,
    Failure,
    GroupUnavailable,
    Timeout,
}

/// Per-group entry of a batched heartbeat reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesAck {
    pub group: GroupId,
    /// The follower incarnation the request addressed.
    pub target_node: VNode,
    /// The follower incarnation that answered.
    pub node: VNode,
    pub term: u64,
    pub last_flushed_log_index: u64,
    pub last_dirty_log_index: u64,
    pub status: AckStatus,
}

impl AppendEntriesAck {
    /// Synthetic success entry, used for the leader's own beat. Log fields
    /// are left at zero; the group's own bookkeeping is authoritative for
    /// itself.
    pub fn successful(group: GroupId, vnode: VNode) -> Self {
        Self {
            group,
            target_node: vnode.clone(),
            node: vnode,
            term: 0,
            last_flushed_log_index: 0,
            last_dirty_log_index: 0,
            status: AckStatus::Success,
        }
    }
}

/// Batched heartbeat reply from one destination node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub acks: Vec<AppendEntriesAck>,
}
