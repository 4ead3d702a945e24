//! Pure per-tick request planning: which followers are due a beat, batched
//! by destination node, plus the set of nodes whose transport should be
//! torn down before sending.

use crate::group::{GroupId, NodeId, VNode};
use crate::registry::GroupRegistry;
use crate::wire::{HeartbeatMetadata, HeartbeatRequest};
use log::trace;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// In-flight bookkeeping for one `(destination node, group)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerReqMeta {
    /// Per-follower send sequence captured at planning time; stale replies
    /// carry an old value and the group discards them.
    pub seq: u64,
    /// Leader log tip at send time.
    pub dirty_offset: u64,
    pub follower: VNode,
}

/// Batched request for a single destination node together with the
/// bookkeeping consumed when its reply is routed.
#[derive(Debug, Clone)]
pub struct NodeHeartbeat {
    pub target: NodeId,
    pub request: HeartbeatRequest,
    pub meta_map: HashMap<GroupId, FollowerReqMeta>,
}

/// Planner output for one tick.
#[derive(Debug, Clone, Default)]
pub struct PlannedHeartbeats {
    /// At most one entry per destination node; may include a request to
    /// self.
    pub requests: Vec<NodeHeartbeat>,
    /// Nodes whose heartbeat status indicates the transport connection
    /// should be torn down before the next send.
    pub reconnect_nodes: BTreeSet<NodeId>,
}

/// Build the batched requests for one tick.
///
/// Synchronous on purpose: callers hold the registry guard across this
/// call, so the snapshot it observes is coherent.
pub fn plan_heartbeats(
    registry: &GroupRegistry,
    interval: Duration,
    now: Instant,
) -> PlannedHeartbeats {
    if registry.is_empty() {
        return PlannedHeartbeats::default();
    }

    let mut pending: BTreeMap<NodeId, Vec<(HeartbeatMetadata, u64)>> = BTreeMap::new();
    let mut reconnect_nodes = BTreeSet::new();

    for group in registry.iter() {
        if !group.is_leader() {
            continue;
        }
        let self_vnode = group.self_vnode();
        group.for_each_voter(&mut |voter: &VNode| {
            // Self-beats keep a single-voter group making progress; they
            // are never suppressed or elided.
            if *voter == self_vnode {
                pending.entry(voter.node.clone()).or_default().push((
                    HeartbeatMetadata {
                        meta: group.meta(),
                        source: self_vnode.clone(),
                        target: self_vnode.clone(),
                    },
                    0,
                ));
                return;
            }

            if group.heartbeats_suppressed(voter) {
                return;
            }

            let last_append = group.last_append_timestamp(voter);
            if now.saturating_duration_since(last_append) < interval {
                // Replication traffic already reached this follower within
                // the interval; the beat would be redundant.
                trace!(
                    "event=heartbeat_elide group={} follower={} since_append_ms={}",
                    group.group(),
                    voter,
                    now.saturating_duration_since(last_append).as_millis()
                );
                return;
            }

            let seq = group.next_follower_sequence(voter);
            group.update_suppress_heartbeats(voter, seq, true);
            pending.entry(voter.node.clone()).or_default().push((
                HeartbeatMetadata {
                    meta: group.meta(),
                    source: self_vnode.clone(),
                    target: voter.clone(),
                },
                seq,
            ));

            if group.should_reconnect_follower(voter) {
                reconnect_nodes.insert(voter.node.clone());
            }
        });
    }

    let mut requests = Vec::with_capacity(pending.len());
    for (target, beats) in pending {
        let mut heartbeats = Vec::with_capacity(beats.len());
        let mut meta_map = HashMap::with_capacity(beats.len());
        for (hb, seq) in beats {
            meta_map.entry(hb.meta.group).or_insert(FollowerReqMeta {
                seq,
                dirty_offset: hb.meta.prev_log_index,
                follower: hb.target.clone(),
            });
            heartbeats.push(hb);
        }
        requests.push(NodeHeartbeat {
            target,
            request: HeartbeatRequest::new(heartbeats),
            meta_map,
        });
    }

    PlannedHeartbeats {
        requests,
        reconnect_nodes,
    }
}
