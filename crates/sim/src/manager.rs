// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Top-level entry point for the simulation service: the public contract
//! of spec §4.2 (`create`, `delete`, `execute`, `get_state`,
//! `subscribe_stream`, `send_control`), backed by a registry of local
//! [`crate::control::ControlLoopHandle`]s and substrate-relayed fan-out for
//! sessions this node does not own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use coact_core::CoreError;
use coact_substrate::{keys, Lease, Substrate};
use futures_util::StreamExt;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::control::{self, ControlLoopHandle, SessionMsg};
use crate::driver::EngineDriver;
use crate::frame::Frame;
use crate::sandbox::{self, FacadeRequest, SimulationHandle};
use crate::session::{ControlVerb, SessionDescriptor, SessionStatus};

pub struct ExecutionResult {
    pub status: &'static str,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

pub struct StateSnapshot {
    pub status: SessionStatus,
    pub degraded: bool,
    pub frame_index: u64,
    pub sim_time: f64,
}

/// Local-only fan-out for one session's frame stream: a relay task
/// subscribes once to the substrate channel and rebroadcasts to however
/// many local WebSocket clients are attached (spec §4.2 "Fan-out").
struct FanOut {
    tx: broadcast::Sender<Frame>,
    subscribers: AtomicUsize,
    cancel: CancellationToken,
}

struct LocalSession {
    descriptor: SessionDescriptor,
    control: Option<ControlLoopHandle>,
    busy: Arc<AtomicBool>,
}

pub struct SimulationManager {
    substrate: Arc<dyn Substrate>,
    driver: Arc<dyn EngineDriver>,
    node_id: String,
    lease_ttl: Duration,
    exec_wall_clock: Duration,
    frame_backpressure: usize,
    sessions: RwLock<HashMap<String, Arc<Mutex<LocalSession>>>>,
    fanouts: Arc<RwLock<HashMap<String, Arc<FanOut>>>>,
}

impl SimulationManager {
    pub fn new(
        substrate: Arc<dyn Substrate>,
        driver: Arc<dyn EngineDriver>,
        node_id: String,
        lease_ttl: Duration,
        exec_wall_clock: Duration,
        frame_backpressure: usize,
    ) -> Self {
        Self {
            substrate,
            driver,
            node_id,
            lease_ttl,
            exec_wall_clock,
            frame_backpressure,
            sessions: RwLock::new(HashMap::new()),
            fanouts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, descriptor: SessionDescriptor) -> Result<(), CoreError> {
        if descriptor.fps == 0 {
            return Err(CoreError::invalid_input("fps must be > 0"));
        }
        let config_key = keys::sim_config(&descriptor.session_id);

        // Uniqueness is decided by the lease, not by the descriptor's
        // presence: the descriptor has no TTL and survives a crash, but an
        // expired lease must let another node reconstruct the instance from
        // it (spec §3 "may be reconstructed on a different node after a
        // crash"; spec §8 scenario 3, lease takeover). Gating on `hgetall`
        // here would make a stale descriptor immortal.
        let lease_key = keys::sim_lease(&descriptor.session_id);
        let lease = Lease::acquire(self.substrate.clone(), lease_key, self.node_id.clone(), self.lease_ttl)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::already_exists(format!(
                "session {} already exists",
                descriptor.session_id
            )))?;

        self.substrate
            .hset(&config_key, "engine", Bytes::from(serde_json::to_vec(&descriptor.engine).unwrap_or_default()))
            .await
            .map_err(CoreError::from)?;
        self.substrate
            .hset(&config_key, "model_ref", Bytes::from(descriptor.model_ref.clone()))
            .await
            .map_err(CoreError::from)?;
        self.substrate
            .hset(&config_key, "created_at", Bytes::from(descriptor.created_at.to_string()))
            .await
            .map_err(CoreError::from)?;

        let cancel = CancellationToken::new();
        let (control, _join) = control::spawn(
            descriptor.clone(),
            self.driver.clone(),
            self.substrate.clone(),
            keys::frames_channel(&descriptor.session_id),
            keys::sim_state(&descriptor.session_id),
            lease,
            self.frame_backpressure,
            cancel,
        );

        let local = LocalSession { descriptor: descriptor.clone(), control: Some(control), busy: Arc::new(AtomicBool::new(false)) };
        self.sessions.write().await.insert(descriptor.session_id.clone(), Arc::new(Mutex::new(local)));
        info!(session_id = %descriptor.session_id, "simulation session created");
        Ok(())
    }

    /// Idempotent: deleting an absent session returns `Ok(false)` ("absent");
    /// `Ok(true)` means an existing session was torn down ("deleted").
    pub async fn delete(&self, session_id: &str) -> Result<bool, CoreError> {
        let removed = self.sessions.write().await.remove(session_id);
        let Some(session) = removed else {
            return Ok(false);
        };
        let mut guard = session.lock().await;
        if let Some(control) = guard.control.take() {
            control.cancel.cancel();
        }
        drop(guard);

        let _ = self.substrate.del(&keys::sim_config(session_id)).await;
        let _ = self.substrate.del(&keys::sim_state(session_id)).await;
        let _ = self.substrate.del(&keys::sim_lease(session_id)).await;
        Ok(true)
    }

    pub async fn send_control(&self, session_id: &str, verb: ControlVerb) -> Result<(), CoreError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| CoreError::not_found(format!("session {session_id} not found")))?
            .clone();
        drop(sessions);
        let guard = session.lock().await;
        let control = guard
            .control
            .as_ref()
            .ok_or_else(|| CoreError::unavailable("session not locally owned"))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        control
            .tx
            .send(SessionMsg::Control(verb, reply_tx))
            .await
            .map_err(|_| CoreError::unavailable("control loop not accepting messages"))?;
        drop(guard);
        reply_rx.await.map_err(|_| CoreError::unavailable("control loop dropped the reply"))?
    }

    pub async fn get_state(&self, session_id: &str) -> Result<StateSnapshot, CoreError> {
        let sessions = self.sessions.read().await;
        if let Some(session) = sessions.get(session_id) {
            let guard = session.lock().await;
            if let Some(control) = &guard.control {
                let snap = control.snapshot.borrow().clone();
                return Ok(StateSnapshot {
                    status: snap.status.0,
                    degraded: snap.degraded,
                    frame_index: snap.frame_index,
                    sim_time: snap.sim_time,
                });
            }
        }
        drop(sessions);
        // Not locally owned: fall back to last-known substrate state (spec §7:
        // "Substrate read failures for cacheable paths fall back to last-known values").
        let state = self
            .substrate
            .hgetall(&keys::sim_state(session_id))
            .await
            .map_err(CoreError::from)?;
        if state.is_empty() {
            return Err(CoreError::not_found(format!("session {session_id} not found")));
        }
        let frame_index = state
            .get("frame_index")
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(StateSnapshot { status: SessionStatus::Running, degraded: true, frame_index, sim_time: 0.0 })
    }

    pub async fn execute(
        &self,
        session_id: &str,
        code: String,
    ) -> Result<ExecutionResult, CoreError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| CoreError::not_found(format!("session {session_id} not found")))?
            .clone();
        drop(sessions);
        let guard = session.lock().await;
        let busy = guard.busy.clone();
        let control_tx = guard
            .control
            .as_ref()
            .ok_or_else(|| CoreError::unavailable("session not locally owned"))?
            .tx
            .clone();
        drop(guard);

        if busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(CoreError::busy(format!("session {session_id} has an execution in flight")));
        }

        let (facade_tx, mut facade_rx) = tokio::sync::mpsc::channel(32);
        let forward_control_tx = control_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(req) = facade_rx.recv().await {
                if forward_control_tx.send(SessionMsg::Facade(req)).await.is_err() {
                    break;
                }
            }
        });

        let handle = SimulationHandle::new(facade_tx);
        let outcome = sandbox::run(&code, handle, self.exec_wall_clock).await;
        forwarder.abort();
        busy.store(false, Ordering::SeqCst);

        let channel = keys::exec_channel(session_id);
        let status = if outcome.success { "success" } else { "error" };
        let _ = self
            .substrate
            .publish(
                &channel,
                Bytes::from(
                    serde_json::json!({
                        "status": status,
                        "stdout": outcome.stdout,
                        "stderr": outcome.stderr,
                        "error": outcome.error,
                    })
                    .to_string(),
                ),
            )
            .await;

        Ok(ExecutionResult {
            status: if outcome.success { "success" } else { "error" },
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            error: outcome.error,
        })
    }

    /// Attach to a session's frame stream, creating the per-node relay the
    /// first time any local client subscribes and tearing it down when the
    /// last one disconnects (spec §4.2 "reference-counted"). When
    /// `from_frame` falls behind the oldest frame the live channel will
    /// deliver, frames still held in the locally-owned session's ring are
    /// returned as `backlog` so the subscriber sees a contiguous sequence
    /// starting at `>= from_frame` (spec §8 invariant 2) instead of a gap.
    pub async fn subscribe_stream(
        &self,
        session_id: &str,
        from_frame: Option<u64>,
    ) -> Result<(Vec<Frame>, broadcast::Receiver<Frame>, Arc<FanOutGuard>), CoreError> {
        let fanout = self.fanout_for(session_id).await?;
        fanout.subscribers.fetch_add(1, Ordering::SeqCst);
        let rx = fanout.tx.subscribe();
        let guard = FanOutGuard {
            manager_fanouts: self.fanouts.clone(),
            session_id: session_id.to_owned(),
            fanout: fanout.clone(),
        };

        let backlog = if let Some(from_frame) = from_frame {
            self.ring_backlog(session_id, from_frame).await
        } else {
            Vec::new()
        };
        Ok((backlog, rx, Arc::new(guard)))
    }

    async fn ring_backlog(&self, session_id: &str, from_frame: u64) -> Vec<Frame> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else { return Vec::new() };
        let guard = session.lock().await;
        let Some(control) = &guard.control else { return Vec::new() };
        let Ok(ring) = control.ring.lock() else { return Vec::new() };
        ring.since(from_frame).cloned().collect()
    }

    async fn fanout_for(&self, session_id: &str) -> Result<Arc<FanOut>, CoreError> {
        if let Some(f) = self.fanouts.read().await.get(session_id) {
            return Ok(f.clone());
        }
        let mut fanouts = self.fanouts.write().await;
        if let Some(f) = fanouts.get(session_id) {
            return Ok(f.clone());
        }
        let (tx, _rx) = broadcast::channel(self.frame_backpressure.max(1));
        let cancel = CancellationToken::new();
        let fanout = Arc::new(FanOut { tx: tx.clone(), subscribers: AtomicUsize::new(0), cancel: cancel.clone() });
        fanouts.insert(session_id.to_owned(), fanout.clone());
        drop(fanouts);

        let channel = keys::frames_channel(session_id);
        let substrate = self.substrate.clone();
        let session_id_owned = session_id.to_owned();
        tokio::spawn(async move {
            let Ok(mut stream) = substrate.subscribe(&channel).await else { return };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => {
                        let Some(payload) = item else { break };
                        if let Some(frame) = decode_frame(&session_id_owned, &payload) {
                            let _ = tx.send(frame);
                        }
                    }
                }
            }
        });

        Ok(fanout)
    }

    /// Number of currently active sessions on this node, for `/health`.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn decode_frame(session_id: &str, payload: &Bytes) -> Option<Frame> {
    if payload.len() < 2 + 8 + 8 || &payload[0..2] != b"F1" {
        return None;
    }
    let frame_index = u64::from_be_bytes(payload[2..10].try_into().ok()?);
    let sim_time = f64::from_be_bytes(payload[10..18].try_into().ok()?);
    let image_bytes = payload.slice(18..);
    if image_bytes.is_empty() {
        return None;
    }
    Some(Frame {
        session_id: session_id.to_owned(),
        frame_index,
        sim_time,
        produced_at: coact_core::epoch_ms(),
        image_bytes,
    })
}

/// Dropping this guard decrements the fan-out's local subscriber count and,
/// if it reaches zero, cancels the relay subscription.
pub struct FanOutGuard {
    manager_fanouts: Arc<RwLock<HashMap<String, Arc<FanOut>>>>,
    session_id: String,
    fanout: Arc<FanOut>,
}

impl Drop for FanOutGuard {
    fn drop(&mut self) {
        if self.fanout.subscribers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.fanout.cancel.cancel();
            let fanouts = self.manager_fanouts.clone();
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                fanouts.write().await.remove(&session_id);
            });
        }
    }
}
