// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Wire envelopes for `WS /signaling` (spec §6), tagged the same way the
//! teacher's `MuxEvent` is: `#[serde(tag = "type", rename_all = "snake_case")]`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { room_id: String, role: String },
    Offer { target_client_id: String, sdp: String },
    Answer { target_client_id: String, sdp: String },
    IceCandidate { target_client_id: String, candidate: serde_json::Value },
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { client_id: String },
    Joined { room_id: String, participants: Vec<String> },
    PeerJoined { client_id: String },
    PeerLeft { client_id: String },
    Offer { from_id: String, sdp: String },
    Answer { from_id: String, sdp: String },
    IceCandidate { from_id: String, candidate: serde_json::Value },
    Error { code: String, message: String },
}

/// Relay envelope published to `signaling:relay` when the target of a
/// message is connected to a different node (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub origin_node: String,
    pub target_node: String,
    pub target_client_id: String,
    pub from_client_id: String,
    pub payload: RelayPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: serde_json::Value },
    /// Sent back to the originating node when a non-silent relay target
    /// could not be delivered (spec §4.3: "notify the sender of
    /// `TargetMissing`" for offer/answer, never for ICE candidates).
    TargetMissing,
}

impl RelayPayload {
    /// Offer/answer notify the sender of `TargetMissing` when undeliverable;
    /// ICE candidates are dropped silently (spec §4.3).
    pub fn notifies_on_missing_target(&self) -> bool {
        matches!(self, RelayPayload::Offer { .. } | RelayPayload::Answer { .. })
    }
}
