// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! True multi-node scenarios: two processes of the same component sharing
//! one substrate. A `"memory"` substrate is private to its process, so
//! these need a real Redis — set `COACT_TEST_REDIS_URL` to run them. Every
//! test here is `#[ignore]`d by default for that reason, the same way the
//! teacher's own NATS-backed scenarios are opt-in via a builder flag rather
//! than run on every `cargo test`.

use std::time::Duration;

use coact_specs::{test_redis_url, ServiceProcess};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

macro_rules! require_redis {
    () => {
        match test_redis_url() {
            Some(url) => url,
            None => {
                eprintln!("skipping: set COACT_TEST_REDIS_URL to run multi-node scenarios");
                return Ok(());
            }
        }
    };
}

#[tokio::test]
#[ignore = "requires a real Redis; set COACT_TEST_REDIS_URL"]
async fn a_session_lease_held_by_one_node_rejects_creation_on_another() -> anyhow::Result<()> {
    let redis_url = require_redis!();

    let node_a = ServiceProcess::spawn("coact-sim", "COACT_SIM_HOST", "COACT_SIM_PORT", &redis_url, "sim-node-a", &[])?;
    let node_b = ServiceProcess::spawn("coact-sim", "COACT_SIM_HOST", "COACT_SIM_PORT", &redis_url, "sim-node-b", &[])?;
    node_a.wait_healthy(TIMEOUT).await?;
    node_b.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "session_id": "shared-session",
        "engine": "mujoco",
        "model_path": "arm.xml",
        "width": 64,
        "height": 64,
        "fps": 30,
    });

    let first = client.post(format!("{}/v1/simulations/create", node_a.base_url())).json(&body).send().await?;
    assert_eq!(first.status().as_u16(), 201);

    let second = client.post(format!("{}/v1/simulations/create", node_b.base_url())).json(&body).send().await?;
    assert_eq!(second.status().as_u16(), 409, "a second node must not acquire the same session's lease");

    Ok(())
}

/// Spec §8 scenario 3: node A creates a session and holds its lease; once A
/// is killed without calling `delete`, the descriptor in the substrate
/// outlives it (no TTL), but the lease does not. After `LEASE_TTL_MS` +
/// slack, node B's `create` for the same `session_id` must succeed and
/// start stepping — the stale descriptor must never make the session
/// permanently unrecreatable.
#[tokio::test]
#[ignore = "requires a real Redis; set COACT_TEST_REDIS_URL"]
async fn a_crashed_node_releases_its_lease_for_takeover() -> anyhow::Result<()> {
    let redis_url = require_redis!();
    let short_lease = [("LEASE_TTL_MS", "1000")];

    let node_a =
        ServiceProcess::spawn("coact-sim", "COACT_SIM_HOST", "COACT_SIM_PORT", &redis_url, "sim-node-a", &short_lease)?;
    node_a.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "session_id": "takeover-session",
        "engine": "mujoco",
        "model_path": "arm.xml",
        "width": 64,
        "height": 64,
        "fps": 30,
    });

    let first = client.post(format!("{}/v1/simulations/create", node_a.base_url())).json(&body).send().await?;
    assert_eq!(first.status().as_u16(), 201);

    // Kill node A without calling `delete` — the descriptor in the
    // substrate is left behind, exactly as a real crash would leave it.
    drop(node_a);

    // Wait past the lease TTL so it expires rather than being renewed.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let node_b =
        ServiceProcess::spawn("coact-sim", "COACT_SIM_HOST", "COACT_SIM_PORT", &redis_url, "sim-node-b", &short_lease)?;
    node_b.wait_healthy(TIMEOUT).await?;

    let second = client.post(format!("{}/v1/simulations/create", node_b.base_url())).json(&body).send().await?;
    assert_eq!(
        second.status().as_u16(),
        201,
        "a node must be able to reconstruct a session once the prior holder's lease expires"
    );

    let state = client.get(format!("{}/v1/simulations/takeover-session/state", node_b.base_url())).send().await?;
    assert_eq!(state.status().as_u16(), 200, "node B must now be stepping the reconstructed session locally");

    Ok(())
}

#[tokio::test]
#[ignore = "requires a real Redis; set COACT_TEST_REDIS_URL"]
async fn signaling_relays_across_two_nodes_sharing_a_room() -> anyhow::Result<()> {
    let redis_url = require_redis!();

    let node_a =
        ServiceProcess::spawn("coact-signal", "COACT_SIGNAL_HOST", "COACT_SIGNAL_PORT", &redis_url, "signal-node-a", &[])?;
    let node_b =
        ServiceProcess::spawn("coact-signal", "COACT_SIGNAL_HOST", "COACT_SIGNAL_PORT", &redis_url, "signal-node-b", &[])?;
    node_a.wait_healthy(TIMEOUT).await?;
    node_b.wait_healthy(TIMEOUT).await?;

    let (mut alice, _) = tokio_tungstenite::connect_async(format!("{}/v1/signaling", node_a.ws_base_url())).await?;
    let (mut bob, _) = tokio_tungstenite::connect_async(format!("{}/v1/signaling", node_b.ws_base_url())).await?;

    let alice_welcome = recv_json(&mut alice).await?;
    let alice_id = alice_welcome["client_id"].as_str().unwrap_or_default().to_owned();

    alice
        .send(Message::Text(
            serde_json::to_string(&serde_json::json!({"type": "join", "room_id": "cross-node-room", "role": "a"}))?
                .into(),
        ))
        .await?;
    let _ = recv_json(&mut alice).await?;

    bob.send(Message::Text(
        serde_json::to_string(&serde_json::json!({"type": "join", "room_id": "cross-node-room", "role": "b"}))?
            .into(),
    ))
    .await?;
    let _ = recv_json(&mut bob).await?;

    bob.send(Message::Text(
        serde_json::to_string(&serde_json::json!({
            "type": "offer", "target_client_id": alice_id, "sdp": "v=0 cross-node",
        }))?
        .into(),
    ))
    .await?;

    let relayed = recv_json(&mut alice).await?;
    assert_eq!(relayed["type"], "offer");
    assert_eq!(relayed["sdp"], "v=0 cross-node");

    Ok(())
}

async fn recv_json(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> anyhow::Result<serde_json::Value> {
    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("connection closed before expected message"))??;
    match msg {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => anyhow::bail!("expected a text frame, got {other:?}"),
    }
}
