// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Session descriptor and the state machine spec §4.2 defines:
//! `Created -> Running <-> Paused -> Terminated`, with an orthogonal
//! `Degraded` flag while `Running`.

use coact_core::CoreError;
use serde::{Deserialize, Serialize};

use crate::driver::EngineKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub engine: EngineKind,
    pub model_ref: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub headless: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    Terminated,
}

impl SessionStatus {
    /// Whether `verb` (`play|pause|reset|step|set_fps`) is legal from this status.
    pub fn allows(self, verb: ControlVerb) -> bool {
        use SessionStatus::*;
        match verb {
            ControlVerb::Reset => self != Terminated,
            ControlVerb::Play => matches!(self, Created | Paused | Running),
            ControlVerb::Pause => matches!(self, Running),
            ControlVerb::Step => matches!(self, Paused | Running),
            ControlVerb::SetFps(_) => self != Terminated,
        }
    }

    pub fn next(self, verb: ControlVerb) -> SessionStatus {
        use SessionStatus::*;
        match verb {
            ControlVerb::Reset => match self {
                Terminated => Terminated,
                _ => Created,
            },
            ControlVerb::Play => Running,
            ControlVerb::Pause => Paused,
            ControlVerb::Step => self,
            ControlVerb::SetFps(_) => self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlVerb {
    Play,
    Pause,
    Reset,
    Step,
    SetFps(u32),
}

impl ControlVerb {
    /// Parse a control-loop text command per spec §6
    /// (`play|pause|reset|step|set_fps <n>`).
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let mut parts = text.trim().split_whitespace();
        match parts.next() {
            Some("play") => Ok(Self::Play),
            Some("pause") => Ok(Self::Pause),
            Some("reset") => Ok(Self::Reset),
            Some("step") => Ok(Self::Step),
            Some("set_fps") => {
                let n: u32 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| CoreError::invalid_input("set_fps requires a numeric argument"))?;
                Ok(Self::SetFps(n))
            }
            _ => Err(CoreError::invalid_input(format!("unknown control verb: {text}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_illegal_unless_running() {
        assert!(!SessionStatus::Created.allows(ControlVerb::Pause));
        assert!(SessionStatus::Running.allows(ControlVerb::Pause));
    }

    #[test]
    fn reset_legal_from_any_non_terminal_state() {
        assert!(SessionStatus::Paused.allows(ControlVerb::Reset));
        assert!(!SessionStatus::Terminated.allows(ControlVerb::Reset));
    }

    #[test]
    fn parses_set_fps_argument() {
        assert_eq!(ControlVerb::parse("set_fps 30").unwrap(), ControlVerb::SetFps(30));
        assert!(ControlVerb::parse("set_fps").is_err());
        assert!(ControlVerb::parse("blink").is_err());
    }
}
