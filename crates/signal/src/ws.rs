// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! `/signaling` WebSocket handler (spec §6). One connection, one client id,
//! assigned on upgrade; mirrors the teacher's per-connection task shape in
//! `transport/ws.rs` — a single task owns the socket and splices inbound
//! client frames against an outbound mpsc channel fed by the registry.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::messages::{ClientMessage, RelayPayload, ServerMessage};
use crate::registry::SignalRegistry;

pub struct SignalState {
    pub registry: Arc<SignalRegistry>,
}

pub async fn upgrade(State(state): State<Arc<SignalState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: Arc<SignalState>) {
    let client_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);
    state.registry.register_client(client_id.clone(), tx.clone()).await;

    let (mut ws_tx, mut ws_rx) = socket.split();
    if send(&mut ws_tx, &ServerMessage::Welcome { client_id: client_id.clone() }).await.is_err() {
        state.registry.disconnect(&client_id).await;
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if send(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_message(&state, &client_id, &text, &tx).await.is_break() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.disconnect(&client_id).await;
}

enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Flow::Break)
    }
}

async fn handle_client_message(
    state: &Arc<SignalState>,
    client_id: &str,
    text: &str,
    tx: &mpsc::Sender<ServerMessage>,
) -> Flow {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let msg = match parsed {
        Ok(msg) => msg,
        Err(e) => {
            let _ = tx
                .send(ServerMessage::Error { code: "INVALID_INPUT".into(), message: e.to_string() })
                .await;
            return Flow::Continue;
        }
    };

    match msg {
        ClientMessage::Join { room_id, role } => match state.registry.join(client_id, &room_id, &role).await {
            Ok(participants) => {
                let _ = tx.send(ServerMessage::Joined { room_id, participants }).await;
            }
            Err(e) => {
                let _ = tx.send(ServerMessage::Error { code: e.to_body().code, message: e.message }).await;
            }
        },
        ClientMessage::Offer { target_client_id, sdp } => {
            if let Err(e) =
                state.registry.route(client_id, &target_client_id, RelayPayload::Offer { sdp }).await
            {
                let _ = tx.send(ServerMessage::Error { code: e.to_body().code, message: e.message }).await;
            }
        }
        ClientMessage::Answer { target_client_id, sdp } => {
            if let Err(e) =
                state.registry.route(client_id, &target_client_id, RelayPayload::Answer { sdp }).await
            {
                let _ = tx.send(ServerMessage::Error { code: e.to_body().code, message: e.message }).await;
            }
        }
        ClientMessage::IceCandidate { target_client_id, candidate } => {
            let _ = state
                .registry
                .route(client_id, &target_client_id, RelayPayload::IceCandidate { candidate })
                .await;
        }
        ClientMessage::Leave => return Flow::Break,
    }
    Flow::Continue
}

async fn send(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let encoded = serde_json::to_string(msg).unwrap_or_default();
    match ws_tx.send(Message::Text(encoded.into())).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "signaling ws send failed");
            Err(e)
        }
    }
}
