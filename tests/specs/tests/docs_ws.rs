// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Integration coverage for `coact-docs` over a real WebSocket connection:
//! the initial sync push on join, and awareness relay between two clients
//! sharing the same document. CRDT merge semantics themselves are covered
//! by `coact_docs::document`'s unit tests — this file only exercises the
//! transport, which those unit tests don't touch.

use std::time::Duration;

use coact_specs::ServiceProcess;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);
const TAG_SYNC: u8 = 0;
const TAG_AWARENESS: u8 = 1;

#[tokio::test]
async fn joining_a_fresh_document_receives_an_empty_sync_frame() -> anyhow::Result<()> {
    let docs = ServiceProcess::spawn("coact-docs", "COACT_DOCS_HOST", "COACT_DOCS_PORT", "memory", "docs-ws-1", &[])?;
    docs.wait_healthy(TIMEOUT).await?;

    let url = format!("{}/v1/documents/ws1/doc-a", docs.ws_base_url());
    let (mut client, _) = tokio_tungstenite::connect_async(&url).await?;

    let msg = tokio::time::timeout(TIMEOUT, client.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("connection closed before the initial frame"))??;
    let bytes = match msg {
        Message::Binary(b) => b,
        other => anyhow::bail!("expected a binary frame, got {other:?}"),
    };
    assert_eq!(bytes.first(), Some(&TAG_SYNC));

    Ok(())
}

#[tokio::test]
async fn awareness_updates_relay_between_clients_on_the_same_document() -> anyhow::Result<()> {
    let docs = ServiceProcess::spawn("coact-docs", "COACT_DOCS_HOST", "COACT_DOCS_PORT", "memory", "docs-ws-2", &[])?;
    docs.wait_healthy(TIMEOUT).await?;

    let url = format!("{}/v1/documents/ws1/doc-b", docs.ws_base_url());
    let (mut alice, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut bob, _) = tokio_tungstenite::connect_async(&url).await?;

    // Drain each client's initial sync frame.
    tokio::time::timeout(TIMEOUT, alice.next()).await?;
    tokio::time::timeout(TIMEOUT, bob.next()).await?;

    let awareness = serde_json::json!({
        "client_id": "alice",
        "cursor": {"line": 3, "column": 7},
    });
    let mut frame = vec![TAG_AWARENESS];
    frame.extend(serde_json::to_vec(&awareness)?);
    alice.send(Message::Binary(frame.into())).await?;

    let msg = tokio::time::timeout(TIMEOUT, bob.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("bob's connection closed before the relayed frame"))??;
    let bytes = match msg {
        Message::Binary(b) => b,
        other => anyhow::bail!("expected a binary frame, got {other:?}"),
    };
    assert_eq!(bytes.first(), Some(&TAG_AWARENESS));
    let relayed: serde_json::Value = serde_json::from_slice(&bytes[1..])?;
    assert_eq!(relayed["client_id"], "alice");
    assert_eq!(relayed["cursor"]["line"], 3);

    Ok(())
}
