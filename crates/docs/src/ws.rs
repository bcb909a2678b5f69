// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! `/v1/documents/{workspace_id}/{*path}` WebSocket handler (spec §6).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use coact_substrate::keys;

use crate::messages::{AwarenessState, DocFrame};
use crate::registry::DocumentRegistry;

pub struct DocsState {
    pub registry: Arc<DocumentRegistry>,
}

pub async fn upgrade(
    State(state): State<Arc<DocsState>>,
    Path((workspace_id, path)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, state, workspace_id, path))
}

async fn handle(socket: WebSocket, state: Arc<DocsState>, workspace_id: String, path: String) {
    let doc_id = keys::doc_id(&workspace_id, &path);
    let client_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<DocFrame>(64);

    let initial_state = match state.registry.join(&doc_id, &client_id, tx).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(doc_id, error = %e, "failed to join document session");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    if ws_tx.send(Message::Binary(DocFrame::Sync(initial_state).encode().into())).await.is_err() {
        state.registry.leave(&doc_id, &client_id).await;
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if ws_tx.send(Message::Binary(frame.encode().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Binary(bytes))) => {
                        handle_inbound_frame(&state, &doc_id, &client_id, &bytes).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.leave(&doc_id, &client_id).await;
}

async fn handle_inbound_frame(state: &Arc<DocsState>, doc_id: &str, client_id: &str, bytes: &[u8]) {
    let frame = match DocFrame::decode(bytes) {
        Ok(f) => f,
        Err(e) => {
            warn!(doc_id, error = %e, "malformed document frame");
            return;
        }
    };
    match frame {
        DocFrame::Sync(update) => {
            if let Err(e) = state.registry.apply_update(doc_id, client_id, update).await {
                warn!(doc_id, error = %e, "failed to apply client update");
            }
        }
        DocFrame::Awareness(payload) => match serde_json::from_slice::<AwarenessState>(&payload) {
            Ok(awareness) => {
                if let Err(e) = state.registry.set_awareness(doc_id, client_id, awareness).await {
                    warn!(doc_id, error = %e, "failed to apply awareness update");
                }
            }
            Err(e) => warn!(doc_id, error = %e, "malformed awareness payload"),
        },
    }
}
