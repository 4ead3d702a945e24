#![allow(dead_code)]

use parking_lot::Mutex;
use pulsor::{
    AppendEntriesAck, AckStatus, ConsensusGroup, GroupId, GroupMeta, HeartbeatClientOpts,
    HeartbeatReply, HeartbeatRequest, HeartbeatTransport, NodeId, PinFuture, TransportError, VNode,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn vnode(node: &str, revision: u64) -> VNode {
    VNode::new(node, revision)
}

/// A timestamp old enough that no elision window can cover it.
fn distant_past() -> Instant {
    let now = Instant::now();
    now.checked_sub(Duration::from_secs(86_400))
        .or_else(|| now.checked_sub(Duration::from_secs(60)))
        .unwrap_or(now)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedReply {
    pub from: NodeId,
    pub outcome: Result<AppendEntriesAck, TransportError>,
    pub seq: u64,
    pub dirty_offset: u64,
}

struct GroupInner {
    leader: bool,
    voters: Vec<VNode>,
    meta: GroupMeta,
    suppressed: HashSet<VNode>,
    last_append: HashMap<VNode, Instant>,
    reconnect: HashSet<VNode>,
    next_seq: HashMap<VNode, u64>,
    suppress_events: Vec<(VNode, u64, bool)>,
    status_events: Vec<(VNode, bool)>,
    replies: Vec<RecordedReply>,
}

/// Scripted consensus group: answers the facade from configured state and
/// records every call the heartbeat core makes.
pub struct ScriptedGroup {
    id: GroupId,
    partition: String,
    self_vnode: VNode,
    inner: Mutex<GroupInner>,
}

impl ScriptedGroup {
    pub fn leader(id: u64, partition: &str, self_vnode: VNode, voters: &[VNode]) -> Arc<Self> {
        let group = GroupId::new(id);
        Arc::new(Self {
            id: group,
            partition: partition.to_string(),
            self_vnode,
            inner: Mutex::new(GroupInner {
                leader: true,
                voters: voters.to_vec(),
                meta: GroupMeta {
                    group,
                    current_term: 7,
                    prev_log_index: 100 + id,
                    prev_log_term: 6,
                    commit_index: 90 + id,
                },
                suppressed: HashSet::new(),
                last_append: HashMap::new(),
                reconnect: HashSet::new(),
                next_seq: HashMap::new(),
                suppress_events: Vec::new(),
                status_events: Vec::new(),
                replies: Vec::new(),
            }),
        })
    }

    pub fn set_leader(&self, leader: bool) {
        self.inner.lock().leader = leader;
    }

    pub fn set_last_append(&self, voter: &VNode, at: Instant) {
        self.inner.lock().last_append.insert(voter.clone(), at);
    }

    pub fn set_suppressed(&self, voter: &VNode, on: bool) {
        let mut inner = self.inner.lock();
        if on {
            inner.suppressed.insert(voter.clone());
        } else {
            inner.suppressed.remove(voter);
        }
    }

    pub fn set_reconnect(&self, voter: &VNode, on: bool) {
        let mut inner = self.inner.lock();
        if on {
            inner.reconnect.insert(voter.clone());
        } else {
            inner.reconnect.remove(voter);
        }
    }

    pub fn expected_dirty_offset(&self) -> u64 {
        self.inner.lock().meta.prev_log_index
    }

    pub fn suppress_events(&self) -> Vec<(VNode, u64, bool)> {
        self.inner.lock().suppress_events.clone()
    }

    pub fn status_events(&self) -> Vec<(VNode, bool)> {
        self.inner.lock().status_events.clone()
    }

    pub fn replies(&self) -> Vec<RecordedReply> {
        self.inner.lock().replies.clone()
    }
}

impl ConsensusGroup for ScriptedGroup {
    fn group(&self) -> GroupId {
        self.id
    }

    fn partition(&self) -> String {
        self.partition.clone()
    }

    fn is_leader(&self) -> bool {
        self.inner.lock().leader
    }

    fn self_vnode(&self) -> VNode {
        self.self_vnode.clone()
    }

    fn for_each_voter(&self, f: &mut dyn FnMut(&VNode)) {
        let voters = self.inner.lock().voters.clone();
        for voter in &voters {
            f(voter);
        }
    }

    fn meta(&self) -> GroupMeta {
        self.inner.lock().meta.clone()
    }

    fn heartbeats_suppressed(&self, follower: &VNode) -> bool {
        self.inner.lock().suppressed.contains(follower)
    }

    fn last_append_timestamp(&self, follower: &VNode) -> Instant {
        self.inner
            .lock()
            .last_append
            .get(follower)
            .copied()
            .unwrap_or_else(distant_past)
    }

    fn next_follower_sequence(&self, follower: &VNode) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq.entry(follower.clone()).or_insert(0);
        *seq += 1;
        *seq
    }

    fn update_suppress_heartbeats(&self, follower: &VNode, seq: u64, suppressed: bool) {
        let mut inner = self.inner.lock();
        if suppressed {
            inner.suppressed.insert(follower.clone());
        } else {
            inner.suppressed.remove(follower);
        }
        inner.suppress_events.push((follower.clone(), seq, suppressed));
    }

    fn should_reconnect_follower(&self, follower: &VNode) -> bool {
        self.inner.lock().reconnect.contains(follower)
    }

    fn update_heartbeat_status(&self, follower: &VNode, ok: bool) {
        self.inner.lock().status_events.push((follower.clone(), ok));
    }

    fn process_append_entries_reply(
        &self,
        from: &NodeId,
        reply: Result<AppendEntriesAck, TransportError>,
        seq: u64,
        dirty_offset: u64,
    ) {
        self.inner.lock().replies.push(RecordedReply {
            from: from.clone(),
            outcome: reply,
            seq,
            dirty_offset,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Heartbeat { node: NodeId, request: HeartbeatRequest },
    Disconnect { node: NodeId },
}

#[derive(Clone)]
enum Script {
    Succeed,
    Fail(TransportError),
    Hold(Arc<Notify>),
}

#[derive(Default)]
struct TransportInner {
    events: Vec<TransportEvent>,
    scripts: HashMap<NodeId, Script>,
    in_flight: usize,
}

/// Mock transport with per-node scripted outcomes. The default outcome is
/// a success reply echoing every requested group.
pub struct MockTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Mutex::new(TransportInner::default())),
        })
    }

    pub fn fail_node(&self, node: impl Into<NodeId>, err: TransportError) {
        self.inner
            .lock()
            .scripts
            .insert(node.into(), Script::Fail(err));
    }

    /// Make sends to `node` block until the returned gate is notified.
    pub fn hold_node(&self, node: impl Into<NodeId>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .lock()
            .scripts
            .insert(node.into(), Script::Hold(gate.clone()));
        gate
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.inner.lock().events.clone()
    }

    pub fn heartbeat_events(&self) -> Vec<(NodeId, HeartbeatRequest)> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Heartbeat { node, request } => {
                    Some((node.clone(), request.clone()))
                }
                TransportEvent::Disconnect { .. } => None,
            })
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    pub fn success_reply(request: &HeartbeatRequest) -> HeartbeatReply {
        HeartbeatReply {
            acks: request
                .heartbeats
                .iter()
                .map(|hb| AppendEntriesAck {
                    group: hb.meta.group,
                    target_node: hb.target.clone(),
                    node: hb.target.clone(),
                    term: hb.meta.current_term,
                    last_flushed_log_index: hb.meta.prev_log_index,
                    last_dirty_log_index: hb.meta.prev_log_index,
                    status: AckStatus::Success,
                })
                .collect(),
        }
    }
}

impl HeartbeatTransport for MockTransport {
    fn heartbeat(
        &self,
        target: NodeId,
        request: HeartbeatRequest,
        _opts: HeartbeatClientOpts,
    ) -> PinFuture<Result<HeartbeatReply, TransportError>> {
        let script = {
            let mut inner = self.inner.lock();
            inner.events.push(TransportEvent::Heartbeat {
                node: target.clone(),
                request: request.clone(),
            });
            inner.in_flight += 1;
            inner.scripts.get(&target).cloned().unwrap_or(Script::Succeed)
        };
        let inner = self.inner.clone();
        Box::pin(async move {
            let result = match script {
                Script::Succeed => Ok(MockTransport::success_reply(&request)),
                Script::Fail(err) => Err(err),
                Script::Hold(gate) => {
                    gate.notified().await;
                    Ok(MockTransport::success_reply(&request))
                }
            };
            inner.lock().in_flight -= 1;
            result
        })
    }

    fn ensure_disconnect(&self, target: NodeId) -> PinFuture<bool> {
        self.inner
            .lock()
            .events
            .push(TransportEvent::Disconnect { node: target });
        Box::pin(async { true })
    }
}
