use crate::transport::TransportError;
use crate::wire::AppendEntriesAck;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Unique identifier for one consensus group hosted in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(u64);

impl GroupId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for GroupId {
    fn from(value: u64) -> Self {
        GroupId::new(value)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a physical peer in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId::new(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A specific incarnation of a node within a group's voter configuration.
///
/// Two `VNode`s with the same `NodeId` but different revisions are distinct
/// followers: a node that left and rejoined a group must not absorb replies
/// addressed to its previous incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VNode {
    pub node: NodeId,
    pub revision: u64,
}

impl VNode {
    pub fn new(node: impl Into<NodeId>, revision: u64) -> Self {
        Self {
            node: node.into(),
            revision,
        }
    }
}

impl fmt::Display for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, rev: {}}}", self.node, self.revision)
    }
}

/// Append-entries preamble for one group as of now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMeta {
    pub group: GroupId,
    pub current_term: u64,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub commit_index: u64,
}

/// Capability surface the heartbeat core requires from a consensus group.
///
/// All methods are synchronous: the request planner runs under the registry
/// read guard and must observe a coherent snapshot with no suspension
/// points. Staleness of replies is the group's concern: the `seq` handed
/// back in `process_append_entries_reply` lets it discard superseded
/// outcomes, and the core never gates on it.
pub trait ConsensusGroup: Send + Sync {
    fn group(&self) -> GroupId;

    /// Diagnostics identity of the replication unit backing this group.
    fn partition(&self) -> String;

    /// Whether heartbeats should be emitted for this group in the current
    /// term.
    fn is_leader(&self) -> bool;

    /// The local leader's identity for this group.
    fn self_vnode(&self) -> VNode;

    /// Enumerate the current voter set, including self.
    fn for_each_voter(&self, f: &mut dyn FnMut(&VNode));

    fn meta(&self) -> GroupMeta;

    /// True while a prior heartbeat or replication RPC to this follower is
    /// still in flight.
    fn heartbeats_suppressed(&self, follower: &VNode) -> bool;

    /// When the most recent successful append (heartbeat or data) to this
    /// follower was observed.
    fn last_append_timestamp(&self, follower: &VNode) -> Instant;

    /// Allocate the next per-follower send sequence number. Values handed
    /// out for a given follower are strictly increasing.
    fn next_follower_sequence(&self, follower: &VNode) -> u64;

    fn update_suppress_heartbeats(&self, follower: &VNode, seq: u64, suppressed: bool);

    /// True when consecutive failures to this follower exceed the group's
    /// reconnect policy threshold.
    fn should_reconnect_follower(&self, follower: &VNode) -> bool;

    /// Record heartbeat success/failure for the reconnect heuristics.
    fn update_heartbeat_status(&self, follower: &VNode, ok: bool);

    /// Integrate a heartbeat outcome. `seq` and `dirty_offset` are the
    /// values captured at send time.
    fn process_append_entries_reply(
        &self,
        from: &NodeId,
        reply: Result<AppendEntriesAck, TransportError>,
        seq: u64,
        dirty_offset: u64,
    );
}
