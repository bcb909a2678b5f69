// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Integration coverage for `coact-signal` over a real WebSocket
//! connection: joining a room and relaying an SDP offer between two
//! clients on the same node.

use std::time::Duration;

use coact_specs::ServiceProcess;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn recv_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("connection closed before expected message"))??;
    match msg {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn two_clients_join_a_room_and_relay_an_offer() -> anyhow::Result<()> {
    let signal =
        ServiceProcess::spawn("coact-signal", "COACT_SIGNAL_HOST", "COACT_SIGNAL_PORT", "memory", "signal-ws-1", &[])?;
    signal.wait_healthy(TIMEOUT).await?;

    let url = format!("{}/v1/signaling", signal.ws_base_url());
    let (mut alice, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut bob, _) = tokio_tungstenite::connect_async(&url).await?;

    let alice_welcome = recv_json(&mut alice).await?;
    let alice_id = alice_welcome["client_id"].as_str().unwrap_or_default().to_owned();
    let _bob_welcome = recv_json(&mut bob).await?;

    alice
        .send(Message::Text(
            serde_json::to_string(&serde_json::json!({
                "type": "join", "room_id": "room-1", "role": "offerer",
            }))?
            .into(),
        ))
        .await?;
    let alice_joined = recv_json(&mut alice).await?;
    assert_eq!(alice_joined["type"], "joined");

    bob.send(Message::Text(
        serde_json::to_string(&serde_json::json!({
            "type": "join", "room_id": "room-1", "role": "answerer",
        }))?
        .into(),
    ))
    .await?;
    let bob_joined = recv_json(&mut bob).await?;
    assert_eq!(bob_joined["type"], "joined");

    // Alice sees Bob join after her own join completed.
    let alice_peer_joined = recv_json(&mut alice).await?;
    assert_eq!(alice_peer_joined["type"], "peer_joined");

    bob.send(Message::Text(
        serde_json::to_string(&serde_json::json!({
            "type": "offer", "target_client_id": alice_id, "sdp": "v=0 fake-sdp",
        }))?
        .into(),
    ))
    .await?;

    let relayed = recv_json(&mut alice).await?;
    assert_eq!(relayed["type"], "offer");
    assert_eq!(relayed["sdp"], "v=0 fake-sdp");

    Ok(())
}
