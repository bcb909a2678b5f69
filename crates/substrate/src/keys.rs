// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Substrate key builders — one function per row of spec §6's key table.
//! Centralizing these avoids the key-format drift that would otherwise
//! creep in across five independent components.

pub fn sim_config(session_id: &str) -> String {
    format!("sim:config:{session_id}")
}

pub fn sim_state(session_id: &str) -> String {
    format!("sim:state:{session_id}")
}

pub fn sim_lease(session_id: &str) -> String {
    format!("sim:lease:{session_id}")
}

pub fn frames_channel(session_id: &str) -> String {
    format!("frames:{session_id}")
}

pub fn exec_channel(session_id: &str) -> String {
    format!("exec:{session_id}")
}

pub fn signaling_rooms() -> &'static str {
    "signaling:rooms"
}

pub fn signaling_room_members(room_id: &str) -> String {
    format!("signaling:rooms:{room_id}:members")
}

pub fn signaling_client(client_id: &str) -> String {
    format!("signaling:clients:{client_id}")
}

pub fn signaling_relay_channel() -> &'static str {
    "signaling:relay"
}

pub fn signaling_server(node_id: &str) -> String {
    format!("signaling:servers:{node_id}")
}

pub fn doc_state(doc_id: &str) -> String {
    format!("docs:{doc_id}")
}

pub fn awareness_channel(doc_id: &str) -> String {
    format!("awareness:{doc_id}")
}

/// Cross-node relay channel for incremental CRDT updates. Not named in
/// spec §6's key table (which lists only the persisted `docs:{doc_id}` kv
/// entry and the awareness channel); added because multi-node real-time
/// convergence needs *some* fan-out path for document content, and the
/// substrate's pub/sub primitive is the mechanism every other component
/// uses for exactly this purpose. See DESIGN.md.
pub fn doc_sync_channel(doc_id: &str) -> String {
    format!("docs:{doc_id}:sync")
}

pub fn rate_limit(subject: &str, class: &str) -> String {
    format!("rl:{subject}:{class}")
}

pub fn revoked_token(jti: &str) -> String {
    format!("revoked:{jti}")
}

pub fn response_cache(route: &str, key: &str) -> String {
    format!("cache:{route}:{key}")
}

/// Derive the `(workspace_id, path)` document identifier used as the
/// substrate key suffix and the awareness-channel suffix.
pub fn doc_id(workspace_id: &str, path: &str) -> String {
    format!("{workspace_id}:{path}")
}
