//! Heartbeat manager: owns the tick timer, the group registry, and the
//! dispatch cycle that fans batched heartbeats out to peers and routes the
//! replies back into the originating groups.

use crate::group::{ConsensusGroup, GroupId, NodeId};
use crate::plan::{plan_heartbeats, FollowerReqMeta, NodeHeartbeat};
use crate::registry::GroupRegistry;
use crate::telemetry::SharedMetricsRegistry;
use crate::timeouts::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_RPC_TIMEOUT, HEARTBEAT_MIN_COMPRESSION_BYTES,
};
use crate::transport::{
    CompressionType, HeartbeatClientOpts, HeartbeatTransport, TransportError,
};
use crate::wire::{AppendEntriesAck, HeartbeatReply};
use log::{error, info, trace, warn};
use parking_lot::{Mutex as ParkingMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

/// Tunables supplied at construction.
#[derive(Clone)]
pub struct HeartbeatConfig {
    /// Identity used to recognize self-targeted batches.
    pub self_node: NodeId,
    /// Spacing between dispatch cycles; doubles as the piggyback-elision
    /// window and the per-send abandonment deadline.
    pub interval: Duration,
    /// Transport deadline for a single batched heartbeat RPC.
    pub rpc_timeout: Duration,
    pub metrics: Option<SharedMetricsRegistry>,
}

impl HeartbeatConfig {
    pub fn new(self_node: impl Into<NodeId>) -> Self {
        Self {
            self_node: self_node.into(),
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            rpc_timeout: DEFAULT_HEARTBEAT_RPC_TIMEOUT,
            metrics: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn metrics(mut self, registry: SharedMetricsRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeartbeatError {
    #[error("heartbeat manager stopped")]
    Stopped,
}

/// Orchestrates periodic batched heartbeats for every registered group.
///
/// Dispatch cycles are serialized by an async lock that `register_group`
/// and `deregister_group` also acquire, so registry mutations observe the
/// completion of any running cycle. Reply routing runs outside that lock
/// and tolerates groups having been deregistered mid-flight.
pub struct HeartbeatManager {
    state: Arc<ManagerState>,
    tick_task: ParkingMutex<Option<JoinHandle<()>>>,
}

struct ManagerState {
    interval: Duration,
    rpc_timeout: Duration,
    self_node: NodeId,
    transport: Arc<dyn HeartbeatTransport>,
    registry: RwLock<GroupRegistry>,
    dispatch_lock: AsyncMutex<()>,
    stopped: AtomicBool,
    notify: Notify,
    metrics: Option<SharedMetricsRegistry>,
    last_dispatch: ParkingMutex<Option<Instant>>,
}

impl HeartbeatManager {
    pub fn new(config: HeartbeatConfig, transport: Arc<dyn HeartbeatTransport>) -> Self {
        Self {
            state: Arc::new(ManagerState {
                interval: config.interval,
                rpc_timeout: config.rpc_timeout,
                self_node: config.self_node,
                transport,
                registry: RwLock::new(GroupRegistry::new()),
                dispatch_lock: AsyncMutex::new(()),
                stopped: AtomicBool::new(false),
                notify: Notify::new(),
                metrics: config.metrics,
                last_dispatch: ParkingMutex::new(None),
            }),
            tick_task: ParkingMutex::new(None),
        }
    }

    /// Open the gate: dispatch immediately, then keep dispatching every
    /// interval until `stop`. Idempotent while running; must not be called
    /// after `stop`.
    pub fn start(&self) {
        assert!(
            !self.state.stopped.load(Ordering::SeqCst),
            "heartbeat manager restarted after stop"
        );
        let mut slot = self.tick_task.lock();
        if slot.is_some() {
            return;
        }
        let state = self.state.clone();
        *slot = Some(tokio::spawn(run_tick_loop(state)));
    }

    /// Close the gate and cancel the timer; resolves once the in-flight
    /// dispatch cycle, if any, has completed.
    pub async fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
        let task = self.tick_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!("event=heartbeat_dispatch_error error={err}");
            }
        }
    }

    /// Insert a group handle. Awaits any running dispatch cycle first.
    /// Registering a group twice is a programmer error and panics.
    pub async fn register_group(
        &self,
        group: Arc<dyn ConsensusGroup>,
    ) -> Result<(), HeartbeatError> {
        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(HeartbeatError::Stopped);
        }
        let _guard = self.state.dispatch_lock.lock().await;
        let id = group.group();
        let partition = group.partition();
        let previous = self.state.registry.write().insert(group);
        assert!(
            previous.is_none(),
            "double registration of group {partition}:{id}"
        );
        Ok(())
    }

    /// Remove a group handle. Awaits any running dispatch cycle first.
    /// Deregistering an absent group is a programmer error and panics.
    pub async fn deregister_group(&self, id: GroupId) -> Result<(), HeartbeatError> {
        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(HeartbeatError::Stopped);
        }
        let _guard = self.state.dispatch_lock.lock().await;
        let removed = self.state.registry.write().remove(&id);
        assert!(removed.is_some(), "group not found: {id}");
        Ok(())
    }

    pub fn registered_groups(&self) -> usize {
        self.state.registry.read().len()
    }

    /// When the most recent dispatch cycle started, for diagnostics.
    pub fn last_dispatch(&self) -> Option<Instant> {
        *self.state.last_dispatch.lock()
    }
}

async fn run_tick_loop(state: Arc<ManagerState>) {
    loop {
        if state.stopped.load(Ordering::SeqCst) {
            break;
        }
        *state.last_dispatch.lock() = Some(Instant::now());
        let cycle = state.clone();
        if let Err(err) = tokio::spawn(cycle.dispatch_once()).await {
            warn!("event=heartbeat_dispatch_error error={err}");
        }
        if state.stopped.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(state.interval) => {}
            _ = state.notify.notified() => {}
        }
    }
}

impl ManagerState {
    async fn dispatch_once(self: Arc<Self>) {
        let _guard = self.dispatch_lock.lock().await;
        let plan = {
            let registry = self.registry.read();
            if let Some(metrics) = &self.metrics {
                let _ = metrics.set_gauge("heartbeat.groups", registry.len() as u64);
            }
            plan_heartbeats(&registry, self.interval, Instant::now())
        };
        if let Some(metrics) = &self.metrics {
            let _ = metrics.inc_counter("heartbeat.dispatch_total", 1);
        }
        trace!(
            "event=heartbeat_dispatch requests={} reconnects={}",
            plan.requests.len(),
            plan.reconnect_nodes.len()
        );

        // Tear down unresponsive connections before any send goes out.
        for node in plan.reconnect_nodes {
            if self.transport.ensure_disconnect(node.clone()).await {
                info!("event=heartbeat_reconnect node={node}");
            }
        }

        let deadline = tokio::time::Instant::now() + self.interval;
        let mut sends = Vec::with_capacity(plan.requests.len());
        for beat in plan.requests {
            if beat.target == self.self_node {
                self.route_self_heartbeat(beat);
                continue;
            }
            let state = self.clone();
            sends.push(tokio::spawn(state.send_heartbeat(beat)));
        }

        for send in sends {
            match tokio::time::timeout_at(deadline, send).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("event=heartbeat_send_panic error={err}"),
                Err(_) => {
                    // Outer deadline elapsed: stop observing this send so a
                    // hung peer cannot push the next tick out. The task
                    // keeps running and routes the real outcome whenever
                    // the transport resolves; routing a failure here
                    // instead would double-clear suppression and race that
                    // eventual reply.
                }
            }
        }
    }

    async fn send_heartbeat(self: Arc<Self>, beat: NodeHeartbeat) {
        let NodeHeartbeat {
            target,
            request,
            meta_map,
        } = beat;
        let opts = HeartbeatClientOpts {
            deadline: Instant::now() + self.rpc_timeout,
            compression: CompressionType::Zstd,
            min_compression_bytes: HEARTBEAT_MIN_COMPRESSION_BYTES,
        };
        let outcome = self.transport.heartbeat(target.clone(), request, opts).await;
        if self.stopped.load(Ordering::SeqCst) {
            trace!("event=heartbeat_reply_dropped node={target} reason=stopped");
            return;
        }
        self.process_reply(&target, meta_map, outcome);
    }

    /// Fabricate a success reply for a self-targeted batch; no RPC is
    /// issued, which keeps single-voter groups making progress.
    fn route_self_heartbeat(&self, beat: NodeHeartbeat) {
        let NodeHeartbeat {
            target,
            request,
            meta_map,
        } = beat;
        let acks = request
            .heartbeats
            .iter()
            .map(|hb| AppendEntriesAck::successful(hb.meta.group, hb.target.clone()))
            .collect();
        self.process_reply(&target, meta_map, Ok(HeartbeatReply { acks }));
    }

    fn process_reply(
        &self,
        origin: &NodeId,
        meta_map: HashMap<GroupId, FollowerReqMeta>,
        outcome: Result<HeartbeatReply, TransportError>,
    ) {
        let registry = self.registry.read();
        match outcome {
            Err(err) => {
                trace!("event=heartbeat_request_failed node={origin} error={err}");
                for (group_id, meta) in meta_map {
                    let Some(group) = registry.get(&group_id) else {
                        error!("event=heartbeat_group_missing node={origin} group={group_id}");
                        continue;
                    };
                    group.update_heartbeat_status(&meta.follower, false);
                    group.update_suppress_heartbeats(&meta.follower, meta.seq, false);
                    group.process_append_entries_reply(
                        origin,
                        Err(err.clone()),
                        meta.seq,
                        meta.dirty_offset,
                    );
                    if let Some(metrics) = &self.metrics {
                        let _ =
                            metrics.inc_counter(format!("heartbeat.request_error.{group_id}"), 1);
                    }
                }
            }
            Ok(reply) => {
                for ack in reply.acks {
                    let group_id = ack.group;
                    let Some(meta) = meta_map.get(&group_id) else {
                        error!(
                            "event=heartbeat_reply_unrequested node={origin} group={group_id}"
                        );
                        continue;
                    };
                    let Some(group) = registry.get(&group_id) else {
                        error!("event=heartbeat_group_missing node={origin} group={group_id}");
                        continue;
                    };
                    group.update_heartbeat_status(&meta.follower, true);
                    group.update_suppress_heartbeats(&meta.follower, meta.seq, false);
                    group.process_append_entries_reply(
                        origin,
                        Ok(ack),
                        meta.seq,
                        meta.dirty_offset,
                    );
                }
            }
        }
    }
}
