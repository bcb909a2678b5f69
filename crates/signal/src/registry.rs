// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Client/room registry and message routing (spec §4.3). Local state is a
//! per-node cache of connected clients; cross-node visibility always goes
//! through the substrate, mirroring the teacher's rule that "no two nodes
//! share in-process maps" (spec §9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use coact_core::CoreError;
use coact_substrate::{keys, Substrate};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::messages::{RelayEnvelope, RelayPayload, ServerMessage};

struct LocalClient {
    tx: mpsc::Sender<ServerMessage>,
    room_id: Option<String>,
}

pub struct SignalRegistry {
    substrate: Arc<dyn Substrate>,
    node_id: String,
    clients: RwLock<HashMap<String, LocalClient>>,
    rooms_served: AtomicU64,
}

impl SignalRegistry {
    pub fn new(substrate: Arc<dyn Substrate>, node_id: String) -> Self {
        Self { substrate, node_id, clients: RwLock::new(HashMap::new()), rooms_served: AtomicU64::new(0) }
    }

    pub async fn register_client(&self, client_id: String, tx: mpsc::Sender<ServerMessage>) {
        self.clients.write().await.insert(client_id.clone(), LocalClient { tx, room_id: None });
        let _ = self
            .substrate
            .hset(&keys::signaling_client(&client_id), "home_node_id", Bytes::from(self.node_id.clone()))
            .await;
    }

    pub async fn join(&self, client_id: &str, room_id: &str, role: &str) -> Result<Vec<String>, CoreError> {
        if room_id.is_empty() || role.is_empty() {
            return Err(CoreError::invalid_input("join requires a non-empty roomId and role"));
        }
        let members_key = keys::signaling_room_members(room_id);
        let client_key = keys::signaling_client(client_id);
        self.substrate
            .register_member_and_hash(
                &members_key,
                client_id,
                &client_key,
                &[("room_id", room_id), ("role", role), ("home_node_id", &self.node_id)],
            )
            .await
            .map_err(CoreError::from)?;
        self.substrate.sadd(keys::signaling_rooms(), room_id).await.map_err(CoreError::from)?;

        if let Some(entry) = self.clients.write().await.get_mut(client_id) {
            entry.room_id = Some(room_id.to_owned());
        }

        let participants: Vec<String> =
            self.substrate.smembers(&members_key).await.map_err(CoreError::from)?.into_iter().collect();

        self.broadcast_local_room_peers(room_id, client_id, ServerMessage::PeerJoined {
            client_id: client_id.to_owned(),
        })
        .await;

        Ok(participants)
    }

    async fn broadcast_local_room_peers(&self, room_id: &str, except_client_id: &str, msg: ServerMessage) {
        let clients = self.clients.read().await;
        for (id, client) in clients.iter() {
            if id != except_client_id && client.room_id.as_deref() == Some(room_id) {
                let _ = client.tx.send(msg.clone()).await;
            }
        }
    }

    /// Route a signaling payload to `target_client_id`, delivering directly
    /// if connected locally, else relaying across nodes (spec §4.3).
    pub async fn route(
        &self,
        from_client_id: &str,
        target_client_id: &str,
        payload: RelayPayload,
    ) -> Result<(), CoreError> {
        if let Some(msg) = self.deliver_locally(from_client_id, target_client_id, &payload).await {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(target_client_id) {
                let _ = client.tx.send(msg).await;
            }
            return Ok(());
        }

        let home_node = self
            .substrate
            .hget(&keys::signaling_client(target_client_id), "home_node_id")
            .await
            .map_err(CoreError::from)?
            .map(|b| String::from_utf8_lossy(&b).into_owned());

        let Some(home_node) = home_node else {
            if payload.notifies_on_missing_target() {
                return Err(CoreError::not_found(format!("target {target_client_id} is not connected")));
            }
            return Ok(());
        };

        let envelope = RelayEnvelope {
            origin_node: self.node_id.clone(),
            target_node: home_node,
            target_client_id: target_client_id.to_owned(),
            from_client_id: from_client_id.to_owned(),
            payload,
        };
        let encoded = serde_json::to_vec(&envelope).map_err(|e| CoreError::internal(e.to_string()))?;
        self.substrate
            .publish(keys::signaling_relay_channel(), Bytes::from(encoded))
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    async fn deliver_locally(
        &self,
        from_client_id: &str,
        target_client_id: &str,
        payload: &RelayPayload,
    ) -> Option<ServerMessage> {
        let clients = self.clients.read().await;
        if !clients.contains_key(target_client_id) {
            return None;
        }
        Some(to_server_message(from_client_id, payload))
    }

    /// Handle an inbound relay envelope addressed to this node (spec §4.3).
    pub async fn handle_relay(&self, envelope: RelayEnvelope) {
        if envelope.target_node != self.node_id {
            return;
        }
        if let RelayPayload::TargetMissing = envelope.payload {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&envelope.target_client_id) {
                let _ = client
                    .tx
                    .send(ServerMessage::Error {
                        code: "TARGET_MISSING".into(),
                        message: format!("{} is not connected", envelope.from_client_id),
                    })
                    .await;
            }
            return;
        }

        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&envelope.target_client_id) {
            let msg = to_server_message(&envelope.from_client_id, &envelope.payload);
            let _ = client.tx.send(msg).await;
            return;
        }
        drop(clients);

        if envelope.payload.notifies_on_missing_target() {
            let notify = RelayEnvelope {
                origin_node: self.node_id.clone(),
                target_node: envelope.origin_node,
                target_client_id: envelope.from_client_id,
                from_client_id: envelope.target_client_id,
                payload: RelayPayload::TargetMissing,
            };
            if let Ok(encoded) = serde_json::to_vec(&notify) {
                let _ = self.substrate.publish(keys::signaling_relay_channel(), Bytes::from(encoded)).await;
            }
        }
    }

    /// Best-effort leave: remove from room + client hash, notify local
    /// peers, garbage-collect an emptied room (spec §4.3).
    pub async fn disconnect(&self, client_id: &str) {
        let room_id = self.clients.write().await.remove(client_id).and_then(|c| c.room_id);
        let _ = self.substrate.del(&keys::signaling_client(client_id)).await;

        let Some(room_id) = room_id else { return };
        let members_key = keys::signaling_room_members(&room_id);
        let _ = self.substrate.srem(&members_key, client_id).await;
        self.broadcast_local_room_peers(&room_id, client_id, ServerMessage::PeerLeft {
            client_id: client_id.to_owned(),
        })
        .await;

        if let Ok(0) = self.substrate.scard(&members_key).await {
            let _ = self.substrate.srem(keys::signaling_rooms(), &room_id).await;
        }
    }

    pub async fn local_client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn local_room_count(&self) -> usize {
        let clients = self.clients.read().await;
        let mut rooms = std::collections::HashSet::new();
        for c in clients.values() {
            if let Some(r) = &c.room_id {
                rooms.insert(r.clone());
            }
        }
        rooms.len()
    }

    /// Publish this node's heartbeat (spec §4.3): `{connections, rooms,
    /// updated_at}` with a 30s TTL so stale nodes fall out of routing.
    pub async fn publish_heartbeat(&self) {
        let key = keys::signaling_server(&self.node_id);
        let connections = self.local_client_count().await;
        let rooms = self.local_room_count().await;
        let _ = self.substrate.hset(&key, "connections", Bytes::from(connections.to_string())).await;
        let _ = self.substrate.hset(&key, "rooms", Bytes::from(rooms.to_string())).await;
        let _ = self.substrate.hset(&key, "updated_at", Bytes::from(coact_core::epoch_ms().to_string())).await;
        let _ = self.substrate.expire(&key, Duration::from_secs(30)).await;
        self.rooms_served.store(rooms as u64, Ordering::Relaxed);
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

fn to_server_message(from_client_id: &str, payload: &RelayPayload) -> ServerMessage {
    match payload {
        RelayPayload::Offer { sdp } => ServerMessage::Offer { from_id: from_client_id.to_owned(), sdp: sdp.clone() },
        RelayPayload::Answer { sdp } => {
            ServerMessage::Answer { from_id: from_client_id.to_owned(), sdp: sdp.clone() }
        }
        RelayPayload::IceCandidate { candidate } => {
            ServerMessage::IceCandidate { from_id: from_client_id.to_owned(), candidate: candidate.clone() }
        }
        RelayPayload::TargetMissing => {
            ServerMessage::Error { code: "TARGET_MISSING".into(), message: "target missing".into() }
        }
    }
}

/// Spawn the background tasks a running registry needs: heartbeat
/// publication and the relay-channel subscriber.
pub fn spawn_background_tasks(
    registry: Arc<SignalRegistry>,
    substrate: Arc<dyn Substrate>,
    heartbeat_interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    let hb_registry = registry.clone();
    let hb_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(heartbeat_interval);
        loop {
            tokio::select! {
                _ = hb_cancel.cancelled() => break,
                _ = tick.tick() => hb_registry.publish_heartbeat().await,
            }
        }
    });

    tokio::spawn(async move {
        use futures_util::StreamExt;
        let Ok(mut stream) = substrate.subscribe(keys::signaling_relay_channel()).await else {
            warn!("signaling relay subscription failed to start");
            return;
        };
        info!("subscribed to signaling relay channel");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                item = stream.next() => {
                    let Some(payload) = item else { break };
                    match serde_json::from_slice::<RelayEnvelope>(&payload) {
                        Ok(envelope) => registry.handle_relay(envelope).await,
                        Err(e) => warn!(error = %e, "malformed relay envelope"),
                    }
                }
            }
        }
    });
}
