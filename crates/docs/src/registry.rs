// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Per-node document registry (spec §4.4): owns the in-memory CRDT state
//! and awareness maps for every document this node currently has local
//! clients on, the write-behind persistence loop, and the cross-node relay
//! subscriptions for sync updates and awareness. Structured the same way
//! as [`coact_signal::registry::SignalRegistry`] — a single owner task per
//! concern, cross-node visibility entirely through the substrate (spec §9:
//! "no two nodes share in-process maps").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use coact_core::CoreError;
use coact_substrate::{keys, Substrate};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::document::CrdtDocument;
use crate::messages::{AwarenessState, DocFrame, RelayEnvelope};

struct DocSession {
    doc: CrdtDocument,
    clients: RwLock<HashMap<String, mpsc::Sender<DocFrame>>>,
    awareness: RwLock<HashMap<String, AwarenessState>>,
    dirty: AtomicBool,
    local_clients: AtomicUsize,
    cancel: CancellationToken,
}

pub struct DocumentRegistry {
    substrate: Arc<dyn Substrate>,
    node_id: String,
    persist_coalesce: Duration,
    sessions: RwLock<HashMap<String, Arc<DocSession>>>,
}

impl DocumentRegistry {
    pub fn new(substrate: Arc<dyn Substrate>, node_id: String, persist_coalesce: Duration) -> Self {
        Self { substrate, node_id, persist_coalesce, sessions: RwLock::new(HashMap::new()) }
    }

    /// Attach `client_id` to `doc_id`, creating the in-memory session (and
    /// loading persisted state, and starting the relay subscriptions) if
    /// this is the first local client. Returns the full current encoded
    /// state for the caller to push as the new client's catch-up frame.
    pub async fn join(
        &self,
        doc_id: &str,
        client_id: &str,
        tx: mpsc::Sender<DocFrame>,
    ) -> Result<Vec<u8>, CoreError> {
        let session = self.session_for(doc_id).await?;
        session.clients.write().await.insert(client_id.to_owned(), tx);
        session.local_clients.fetch_add(1, Ordering::SeqCst);
        Ok(session.doc.encode_full_state())
    }

    async fn session_for(&self, doc_id: &str) -> Result<Arc<DocSession>, CoreError> {
        if let Some(s) = self.sessions.read().await.get(doc_id) {
            return Ok(s.clone());
        }
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get(doc_id) {
            return Ok(s.clone());
        }

        let persisted = self.substrate.get(&keys::doc_state(doc_id)).await.map_err(CoreError::from)?;
        let doc = match persisted {
            Some(bytes) => CrdtDocument::from_persisted(&bytes)
                .map_err(|e| CoreError::internal(format!("corrupt persisted document: {e}")))?,
            None => CrdtDocument::new(),
        };

        let session = Arc::new(DocSession {
            doc,
            clients: RwLock::new(HashMap::new()),
            awareness: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            local_clients: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        });
        sessions.insert(doc_id.to_owned(), session.clone());
        drop(sessions);

        self.spawn_persistence_loop(doc_id.to_owned(), session.clone());
        self.spawn_sync_relay(doc_id.to_owned(), session.clone());
        self.spawn_awareness_relay(doc_id.to_owned(), session.clone());

        Ok(session)
    }

    /// Merge a client-originated update, fan it out to this node's other
    /// local clients, relay it to other nodes, and mark the document dirty
    /// for the next coalesced persistence tick.
    pub async fn apply_update(
        &self,
        doc_id: &str,
        from_client_id: &str,
        update_bytes: Vec<u8>,
    ) -> Result<(), CoreError> {
        let session = self
            .sessions
            .read()
            .await
            .get(doc_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("document {doc_id} has no local session")))?;

        session
            .doc
            .apply_update(&update_bytes)
            .map_err(|e| CoreError::invalid_input(format!("malformed update: {e}")))?;
        session.dirty.store(true, Ordering::SeqCst);

        self.broadcast_local(&session, from_client_id, DocFrame::Sync(update_bytes.clone())).await;

        let envelope = RelayEnvelope { origin_node: self.node_id.clone(), doc_id: doc_id.to_owned(), payload: update_bytes };
        if let Ok(encoded) = serde_json::to_vec(&envelope) {
            let _ = self.substrate.publish(&keys::doc_sync_channel(doc_id), Bytes::from(encoded)).await;
        }
        Ok(())
    }

    /// Update `client_id`'s presence, fan it out locally, and relay it to
    /// other nodes (spec §4.4 "Awareness relay").
    pub async fn set_awareness(
        &self,
        doc_id: &str,
        client_id: &str,
        state: AwarenessState,
    ) -> Result<(), CoreError> {
        let session = self
            .sessions
            .read()
            .await
            .get(doc_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("document {doc_id} has no local session")))?;

        session.awareness.write().await.insert(client_id.to_owned(), state.clone());
        let encoded = serde_json::to_vec(&state).map_err(|e| CoreError::internal(e.to_string()))?;
        self.broadcast_local(&session, client_id, DocFrame::Awareness(encoded.clone())).await;

        let envelope = RelayEnvelope { origin_node: self.node_id.clone(), doc_id: doc_id.to_owned(), payload: encoded };
        if let Ok(wire) = serde_json::to_vec(&envelope) {
            let _ = self.substrate.publish(&keys::awareness_channel(doc_id), Bytes::from(wire)).await;
        }
        Ok(())
    }

    async fn broadcast_local(&self, session: &DocSession, except_client_id: &str, frame: DocFrame) {
        let clients = session.clients.read().await;
        for (id, tx) in clients.iter() {
            if id != except_client_id {
                let _ = tx.send(frame.clone()).await;
            }
        }
    }

    /// Detach `client_id`; when the last local client leaves, flush any
    /// pending write and stop the relay subscriptions (spec §4.4 "the node
    /// unsubscribes").
    pub async fn leave(&self, doc_id: &str, client_id: &str) {
        let Some(session) = self.sessions.read().await.get(doc_id).cloned() else { return };
        session.clients.write().await.remove(client_id);
        session.awareness.write().await.remove(client_id);

        if session.local_clients.fetch_sub(1, Ordering::SeqCst) == 1 {
            if session.dirty.swap(false, Ordering::SeqCst) {
                let _ = self
                    .substrate
                    .set(&keys::doc_state(doc_id), Bytes::from(session.doc.encode_full_state()), None)
                    .await;
            }
            session.cancel.cancel();
            self.sessions.write().await.remove(doc_id);
        }
    }

    fn spawn_persistence_loop(&self, doc_id: String, session: Arc<DocSession>) {
        let substrate = self.substrate.clone();
        let interval = self.persist_coalesce.max(Duration::from_millis(1));
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if session.dirty.swap(false, Ordering::SeqCst) {
                            let bytes = session.doc.encode_full_state();
                            let _ = substrate.set(&keys::doc_state(&doc_id), Bytes::from(bytes), None).await;
                        }
                    }
                }
            }
        });
    }

    /// Cross-node relay for incremental CRDT updates. Ignores envelopes
    /// this node itself published (spec §4.4/§9 origin-marker de-echo,
    /// extended here to the sync channel — see DESIGN.md).
    fn spawn_sync_relay(&self, doc_id: String, session: Arc<DocSession>) {
        let substrate = self.substrate.clone();
        let node_id = self.node_id.clone();
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let channel = keys::doc_sync_channel(&doc_id);
            let Ok(mut stream) = substrate.subscribe(&channel).await else {
                warn!(doc_id, "document sync relay subscription failed to start");
                return;
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => {
                        let Some(payload) = item else { break };
                        let Ok(envelope) = serde_json::from_slice::<RelayEnvelope>(&payload) else { continue };
                        if envelope.origin_node == node_id {
                            continue;
                        }
                        if session.doc.apply_update(&envelope.payload).is_ok() {
                            let clients = session.clients.read().await;
                            for tx in clients.values() {
                                let _ = tx.send(DocFrame::Sync(envelope.payload.clone())).await;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Cross-node relay for awareness updates (spec §4.4, verbatim origin
    /// marker behavior).
    fn spawn_awareness_relay(&self, doc_id: String, session: Arc<DocSession>) {
        let substrate = self.substrate.clone();
        let node_id = self.node_id.clone();
        let cancel = session.cancel.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let channel = keys::awareness_channel(&doc_id);
            let Ok(mut stream) = substrate.subscribe(&channel).await else {
                warn!(doc_id, "awareness relay subscription failed to start");
                return;
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => {
                        let Some(payload) = item else { break };
                        let Ok(envelope) = serde_json::from_slice::<RelayEnvelope>(&payload) else { continue };
                        if envelope.origin_node == node_id {
                            continue;
                        }
                        if let Ok(state) = serde_json::from_slice::<AwarenessState>(&envelope.payload) {
                            session.awareness.write().await.insert(state.client_id.clone(), state);
                        }
                        let clients = session.clients.read().await;
                        for tx in clients.values() {
                            let _ = tx.send(DocFrame::Awareness(envelope.payload.clone())).await;
                        }
                    }
                }
            }
        });
    }

    pub async fn local_document_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
