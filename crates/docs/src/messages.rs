// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Wire framing for `WS /documents/{workspace_id}/{path}` (spec §6):
//! "binary CRDT protocol framing ... awareness messages on a sideband
//! subprotocol". Framed the way the y-websocket reference provider does —
//! one leading tag byte distinguishing a CRDT sync frame from an awareness
//! frame on the same binary connection, rather than a second subprotocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const TAG_SYNC: u8 = 0;
const TAG_AWARENESS: u8 = 1;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame tag: {0}")]
    UnknownTag(u8),
}

/// A single frame exchanged over the document WebSocket.
#[derive(Debug, Clone)]
pub enum DocFrame {
    /// A yrs update: either the initial full-state push on connect, or an
    /// incremental update produced by a local edit.
    Sync(Vec<u8>),
    /// A JSON-encoded [`AwarenessUpdate`].
    Awareness(Vec<u8>),
}

impl DocFrame {
    pub fn encode(&self) -> Vec<u8> {
        let (tag, body) = match self {
            DocFrame::Sync(bytes) => (TAG_SYNC, bytes.as_slice()),
            DocFrame::Awareness(bytes) => (TAG_AWARENESS, bytes.as_slice()),
        };
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(tag);
        out.extend_from_slice(body);
        out
    }

    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let (tag, body) = raw.split_first().ok_or(FrameError::Empty)?;
        match *tag {
            TAG_SYNC => Ok(DocFrame::Sync(body.to_vec())),
            TAG_AWARENESS => Ok(DocFrame::Awareness(body.to_vec())),
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

/// One client's presence: cursor, selection, and arbitrary user metadata
/// (spec §3 "awareness map `client_id -> {cursor, selection, user
/// metadata}`"). Opaque beyond that shape — the document service never
/// interprets cursor/selection values, just stores and relays them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwarenessState {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// A relay envelope published to a cross-node channel (awareness or sync).
/// `origin_node` is the dedup sentinel from spec §4.4/§9: "every locally
/// generated awareness update must be tagged with a node-scoped origin
/// marker, and the subscriber must ignore messages whose origin matches
/// its own node."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub origin_node: String,
    pub doc_id: String,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sync_frame() {
        let frame = DocFrame::Sync(vec![1, 2, 3]);
        let encoded = frame.encode();
        match DocFrame::decode(&encoded).unwrap() {
            DocFrame::Sync(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
            DocFrame::Awareness(_) => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(DocFrame::decode(&[9, 1, 2]).is_err());
    }

    #[test]
    fn rejects_empty_frame() {
        assert!(DocFrame::decode(&[]).is_err());
    }
}
