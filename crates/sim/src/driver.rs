// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Engine driver interface (spec §4.2). A session never talks to MuJoCo or
//! PyBullet directly — it talks to this trait, dispatched on a blocking
//! worker since a real physics step is CPU-bound and must never stall the
//! async control loop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    MuJoCo,
    PyBullet,
}

/// Opaque handle a driver assigns to a loaded model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// A snapshot of engine variables after a step or reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub vars: HashMap<String, f64>,
    pub sim_time: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("model load failed: {0}")]
    LoadFailed(String),
    #[error("engine step failed: {0}")]
    StepFailed(String),
    #[error("unknown engine handle")]
    UnknownHandle,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Minimal capability set a physics engine must expose (spec §4.2).
/// Implementations are synchronous and CPU-bound by design — callers run
/// them via `spawn_blocking`, never directly on the control loop's task.
pub trait EngineDriver: Send + Sync {
    fn load(
        &self,
        model_ref: &str,
        width: u32,
        height: u32,
        headless: bool,
    ) -> DriverResult<EngineHandle>;
    fn reset(&self, handle: EngineHandle) -> DriverResult<EngineState>;
    fn step(&self, handle: EngineHandle, action: &[f64]) -> DriverResult<EngineState>;
    fn render(&self, handle: EngineHandle) -> DriverResult<Vec<u8>>;
    fn dispose(&self, handle: EngineHandle);
}

/// A driver with no physics behind it: loads succeed, steps integrate a
/// trivial clock, and renders produce a tiny deterministic placeholder
/// image. Used for tests and for deployments where MuJoCo/PyBullet are not
/// compiled in (neither is a pure-Rust dependency the corpus can pull in
/// faithfully, so both are feature-gated stub adapters rather than real
/// bindings — see DESIGN.md).
pub struct NullDriver {
    next_handle: std::sync::atomic::AtomicU64,
    states: std::sync::Mutex<HashMap<EngineHandle, EngineState>>,
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDriver {
    pub fn new() -> Self {
        Self {
            next_handle: std::sync::atomic::AtomicU64::new(1),
            states: std::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl EngineDriver for NullDriver {
    fn load(&self, _model_ref: &str, _w: u32, _h: u32, _headless: bool) -> DriverResult<EngineHandle> {
        let id = self.next_handle.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let handle = EngineHandle(id);
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        states.insert(handle, EngineState::default());
        Ok(handle)
    }

    fn reset(&self, handle: EngineHandle) -> DriverResult<EngineState> {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get_mut(&handle).ok_or(DriverError::UnknownHandle)?;
        *state = EngineState::default();
        Ok(state.clone())
    }

    fn step(&self, handle: EngineHandle, action: &[f64]) -> DriverResult<EngineState> {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get_mut(&handle).ok_or(DriverError::UnknownHandle)?;
        state.sim_time += 0.01;
        state.vars.insert("action_sum".to_owned(), action.iter().sum());
        Ok(state.clone())
    }

    fn render(&self, handle: EngineHandle) -> DriverResult<Vec<u8>> {
        let states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        let state = states.get(&handle).ok_or(DriverError::UnknownHandle)?;
        Ok(format!("frame@{:.3}", state.sim_time).into_bytes())
    }

    fn dispose(&self, handle: EngineHandle) {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        states.remove(&handle);
    }
}

#[cfg(feature = "mujoco")]
pub mod mujoco {
    //! Subprocess adapter: speaks a line-delimited JSON protocol to an
    //! external `mujoco-driver` process over stdio. Kept out of the default
    //! feature set since it shells out rather than linking a vetted crate.
    use super::*;

    pub struct MuJoCoDriver {
        // Real implementation would own a `std::process::Child` and a
        // request/response correlation table; omitted here since no such
        // subprocess ships with this crate.
    }

    impl Default for MuJoCoDriver {
        fn default() -> Self {
            Self {}
        }
    }

    impl EngineDriver for MuJoCoDriver {
        fn load(&self, _m: &str, _w: u32, _h: u32, _h2: bool) -> DriverResult<EngineHandle> {
            Err(DriverError::LoadFailed("mujoco subprocess adapter not configured".into()))
        }
        fn reset(&self, _h: EngineHandle) -> DriverResult<EngineState> {
            Err(DriverError::UnknownHandle)
        }
        fn step(&self, _h: EngineHandle, _a: &[f64]) -> DriverResult<EngineState> {
            Err(DriverError::UnknownHandle)
        }
        fn render(&self, _h: EngineHandle) -> DriverResult<Vec<u8>> {
            Err(DriverError::UnknownHandle)
        }
        fn dispose(&self, _h: EngineHandle) {}
    }
}

#[cfg(feature = "pybullet")]
pub mod pybullet {
    //! Same subprocess-adapter shape as [`super::mujoco`], targeting a
    //! PyBullet-speaking worker process instead.
    use super::*;

    pub struct PyBulletDriver {}

    impl Default for PyBulletDriver {
        fn default() -> Self {
            Self {}
        }
    }

    impl EngineDriver for PyBulletDriver {
        fn load(&self, _m: &str, _w: u32, _h: u32, _h2: bool) -> DriverResult<EngineHandle> {
            Err(DriverError::LoadFailed("pybullet subprocess adapter not configured".into()))
        }
        fn reset(&self, _h: EngineHandle) -> DriverResult<EngineState> {
            Err(DriverError::UnknownHandle)
        }
        fn step(&self, _h: EngineHandle, _a: &[f64]) -> DriverResult<EngineState> {
            Err(DriverError::UnknownHandle)
        }
        fn render(&self, _h: EngineHandle) -> DriverResult<Vec<u8>> {
            Err(DriverError::UnknownHandle)
        }
        fn dispose(&self, _h: EngineHandle) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_driver_steps_advance_sim_time() {
        let driver = NullDriver::new();
        let handle = driver.load("cartpole.xml", 64, 64, true).unwrap();
        let s0 = driver.reset(handle).unwrap();
        assert_eq!(s0.sim_time, 0.0);
        let s1 = driver.step(handle, &[1.0]).unwrap();
        assert!(s1.sim_time > s0.sim_time);
    }

    #[test]
    fn render_never_returns_empty() {
        let driver = NullDriver::new();
        let handle = driver.load("m", 1, 1, true).unwrap();
        let image = driver.render(handle).unwrap();
        assert!(!image.is_empty());
    }
}
