// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The per-session control loop (spec §4.2): single-threaded cooperative
//! owner of the engine handle. Every external request reaches it as a
//! message and awaits a reply; no other task touches the handle directly
//! (spec §9: "Ownership of the engine handle ... exclusively owned by the
//! control-loop task").

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use coact_core::CoreError;
use coact_substrate::Substrate;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::{EngineDriver, EngineHandle, EngineState};
use crate::frame::{Frame, FrameRing};
use crate::sandbox::FacadeRequest;
use crate::session::{ControlVerb, SessionDescriptor, SessionStatus};

const ENGINE_TICK: Duration = Duration::from_millis(10);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus_,
    pub degraded: bool,
    pub frame_index: u64,
    pub sim_time: f64,
    pub vars: HashMap<String, f64>,
}

/// Newtype so `SessionSnapshot` can derive `Default` without requiring
/// `SessionStatus` itself to pick an arbitrary default variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus_(pub SessionStatus);

impl Default for SessionStatus_ {
    fn default() -> Self {
        Self(SessionStatus::Created)
    }
}

pub enum SessionMsg {
    Control(ControlVerb, oneshot::Sender<Result<(), CoreError>>),
    Facade(FacadeRequest),
}

/// A handle external callers use to talk to a running control loop.
pub struct ControlLoopHandle {
    pub tx: mpsc::Sender<SessionMsg>,
    pub snapshot: watch::Receiver<SessionSnapshot>,
    pub cancel: CancellationToken,
    pub busy: Arc<AtomicBool>,
    /// Shared with the loop's [`FrameRing`] so a fresh local subscriber can
    /// catch up on the last few frames before its live tail starts (spec
    /// §4.2 frame ring; invariant 2: "received frames ... starting at ≥ k").
    pub ring: Arc<Mutex<FrameRing>>,
}

pub fn spawn(
    descriptor: SessionDescriptor,
    driver: Arc<dyn EngineDriver>,
    substrate: Arc<dyn Substrate>,
    frames_channel: String,
    state_key: String,
    lease: coact_substrate::Lease,
    frame_backpressure: usize,
    cancel: CancellationToken,
) -> (ControlLoopHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(128);
    let (snap_tx, snap_rx) = watch::channel(SessionSnapshot::default());
    let busy = Arc::new(AtomicBool::new(false));
    let ring = Arc::new(Mutex::new(FrameRing::new(frame_backpressure)));

    let handle = ControlLoopHandle { tx, snapshot: snap_rx, cancel: cancel.clone(), busy, ring: ring.clone() };
    let join = tokio::spawn(run_loop(
        descriptor,
        driver,
        substrate,
        frames_channel,
        state_key,
        lease,
        cancel,
        rx,
        snap_tx,
        ring,
    ));
    (handle, join)
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    descriptor: SessionDescriptor,
    driver: Arc<dyn EngineDriver>,
    substrate: Arc<dyn Substrate>,
    frames_channel: String,
    state_key: String,
    lease: coact_substrate::Lease,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<SessionMsg>,
    snap_tx: watch::Sender<SessionSnapshot>,
    ring: Arc<Mutex<FrameRing>>,
) {
    let mut status = SessionStatus::Created;
    let mut degraded = false;
    let mut frame_index: u64 = 0;
    let mut last_action: Vec<f64> = Vec::new();
    let render_interval = Duration::from_secs_f64(1.0 / descriptor.fps.max(1) as f64);
    let mut last_render = Instant::now() - render_interval;

    let mut engine_handle = match spawn_blocking_load(&driver, &descriptor).await {
        Ok(h) => h,
        Err(e) => {
            warn!(session_id = %descriptor.session_id, error = %e, "initial engine load failed");
            return;
        }
    };

    let mut tick = tokio::time::interval(ENGINE_TICK);
    let mut lease_renew = tokio::time::interval(LEASE_RENEW_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(session_id = %descriptor.session_id, "control loop cancelled");
                break;
            }

            _ = lease_renew.tick() => {
                if lease.renew().await.is_err() {
                    warn!(session_id = %descriptor.session_id, "lease renewal failed, relinquishing control");
                    break;
                }
            }

            _ = tick.tick() => {
                if status == SessionStatus::Running {
                    match spawn_blocking_step(&driver, engine_handle, last_action.clone()).await {
                        Ok(state) => {
                            degraded = false;
                            publish_state(&mut frame_index, &mut last_render, render_interval,
                                &driver, engine_handle, &substrate, &frames_channel, &state_key,
                                &descriptor.session_id, &state, &ring).await;
                        }
                        Err(e) => {
                            warn!(session_id = %descriptor.session_id, error = %e, "step failed, attempting reinit");
                            degraded = true;
                            match spawn_blocking_load(&driver, &descriptor).await {
                                Ok(h) => engine_handle = h,
                                Err(e2) => {
                                    warn!(session_id = %descriptor.session_id, error = %e2, "reinit failed");
                                }
                            }
                        }
                    }
                }
                let _ = snap_tx.send(SessionSnapshot {
                    status: SessionStatus_(status),
                    degraded,
                    frame_index,
                    sim_time: snap_tx.borrow().sim_time,
                    vars: snap_tx.borrow().vars.clone(),
                });
            }

            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    SessionMsg::Control(verb, reply) => {
                        if !status.allows(verb) {
                            let _ = reply.send(Err(CoreError::invalid_transition(
                                format!("{verb:?} not legal from current status"))));
                            continue;
                        }
                        if let ControlVerb::Reset = verb {
                            match spawn_blocking_reset(&driver, engine_handle).await {
                                Ok(state) => {
                                    frame_index = 0;
                                    last_action.clear();
                                    update_snapshot(&snap_tx, status, degraded, frame_index, &state);
                                }
                                Err(e) => {
                                    warn!(session_id = %descriptor.session_id, error = %e, "reset failed");
                                    degraded = true;
                                }
                            }
                        }
                        status = status.next(verb);
                        let _ = reply.send(Ok(()));
                    }
                    SessionMsg::Facade(req) => match req {
                        FacadeRequest::Reset(reply) => {
                            match spawn_blocking_reset(&driver, engine_handle).await {
                                Ok(state) => {
                                    frame_index = 0;
                                    last_action.clear();
                                    update_snapshot(&snap_tx, status, degraded, frame_index, &state);
                                    let _ = reply.send(state);
                                }
                                Err(_) => degraded = true,
                            }
                        }
                        FacadeRequest::Step(action, reply) => {
                            last_action = action.clone();
                            match spawn_blocking_step(&driver, engine_handle, action).await {
                                Ok(state) => {
                                    update_snapshot(&snap_tx, status, degraded, frame_index, &state);
                                    let _ = reply.send(state);
                                }
                                Err(_) => degraded = true,
                            }
                        }
                        FacadeRequest::GetState(reply) => {
                            let snap = snap_tx.borrow().clone();
                            let _ = reply.send(EngineState { vars: snap.vars, sim_time: snap.sim_time });
                        }
                    },
                }
            }
        }
    }

    driver.dispose(engine_handle);
    let _ = lease.release().await;
}

fn update_snapshot(
    snap_tx: &watch::Sender<SessionSnapshot>,
    status: SessionStatus,
    degraded: bool,
    frame_index: u64,
    state: &EngineState,
) {
    let _ = snap_tx.send(SessionSnapshot {
        status: SessionStatus_(status),
        degraded,
        frame_index,
        sim_time: state.sim_time,
        vars: state.vars.clone(),
    });
}

#[allow(clippy::too_many_arguments)]
async fn publish_state(
    frame_index: &mut u64,
    last_render: &mut Instant,
    render_interval: Duration,
    driver: &Arc<dyn EngineDriver>,
    engine_handle: EngineHandle,
    substrate: &Arc<dyn Substrate>,
    frames_channel: &str,
    state_key: &str,
    session_id: &str,
    state: &EngineState,
    ring: &Arc<Mutex<FrameRing>>,
) {
    if last_render.elapsed() < render_interval {
        return;
    }
    *last_render = Instant::now();
    let image = match spawn_blocking_render(driver, engine_handle).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return,
    };
    let frame = Frame {
        session_id: session_id.to_owned(),
        frame_index: *frame_index,
        sim_time: state.sim_time,
        produced_at: coact_core::epoch_ms(),
        image_bytes: Bytes::from(image),
    };
    *frame_index += 1;
    if let Ok(mut guard) = ring.lock() {
        guard.push(frame.clone());
    }
    let _ = substrate.publish(frames_channel, Bytes::from(frame.encode())).await;
    let _ = substrate
        .hset(state_key, "frame_index", Bytes::from(frame.frame_index.to_string()))
        .await;
}

async fn spawn_blocking_load(
    driver: &Arc<dyn EngineDriver>,
    descriptor: &SessionDescriptor,
) -> Result<EngineHandle, crate::driver::DriverError> {
    let driver = driver.clone();
    let model_ref = descriptor.model_ref.clone();
    let (w, h, headless) = (descriptor.width, descriptor.height, descriptor.headless);
    tokio::task::spawn_blocking(move || driver.load(&model_ref, w, h, headless))
        .await
        .unwrap_or_else(|e| Err(crate::driver::DriverError::LoadFailed(e.to_string())))
}

async fn spawn_blocking_reset(
    driver: &Arc<dyn EngineDriver>,
    handle: EngineHandle,
) -> Result<EngineState, crate::driver::DriverError> {
    let driver = driver.clone();
    tokio::task::spawn_blocking(move || driver.reset(handle))
        .await
        .unwrap_or_else(|e| Err(crate::driver::DriverError::StepFailed(e.to_string())))
}

async fn spawn_blocking_step(
    driver: &Arc<dyn EngineDriver>,
    handle: EngineHandle,
    action: Vec<f64>,
) -> Result<EngineState, crate::driver::DriverError> {
    let driver = driver.clone();
    tokio::task::spawn_blocking(move || driver.step(handle, &action))
        .await
        .unwrap_or_else(|e| Err(crate::driver::DriverError::StepFailed(e.to_string())))
}

async fn spawn_blocking_render(
    driver: &Arc<dyn EngineDriver>,
    handle: EngineHandle,
) -> Result<Vec<u8>, crate::driver::DriverError> {
    let driver = driver.clone();
    tokio::task::spawn_blocking(move || driver.render(handle))
        .await
        .unwrap_or_else(|e| Err(crate::driver::DriverError::StepFailed(e.to_string())))
}
