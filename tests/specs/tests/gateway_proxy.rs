// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! End-to-end tests through the edge gateway: auth, caching, rate
//! limiting, and HTTP/WebSocket proxying onto a real `coact-sim` and
//! `coact-docs` process. Each component runs its own in-process substrate
//! — the gateway never shares session state with upstream, it only
//! forwards requests — so these scenarios don't need a shared Redis.

use std::time::Duration;

use coact_specs::{bearer_token, far_future_unix_secs, ServiceProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn spawn_sim(node_id: &str) -> anyhow::Result<ServiceProcess> {
    let sim = ServiceProcess::spawn("coact-sim", "COACT_SIM_HOST", "COACT_SIM_PORT", "memory", node_id, &[])?;
    sim.wait_healthy(TIMEOUT).await?;
    Ok(sim)
}

async fn spawn_gateway(
    upstream_sim: &str,
    upstream_signal: &str,
    upstream_docs: &str,
    extra_env: &[(&str, &str)],
) -> anyhow::Result<ServiceProcess> {
    let mut env = vec![
        ("COACT_UPSTREAM_SIM", upstream_sim),
        ("COACT_UPSTREAM_SIGNAL", upstream_signal),
        ("COACT_UPSTREAM_DOCS", upstream_docs),
    ];
    env.extend_from_slice(extra_env);
    let gateway = ServiceProcess::spawn(
        "coact-gateway",
        "COACT_GATEWAY_HOST",
        "COACT_GATEWAY_PORT",
        "memory",
        "gateway-e2e",
        &env,
    )?;
    gateway.wait_healthy(TIMEOUT).await?;
    Ok(gateway)
}

#[tokio::test]
async fn proxies_simulation_create_and_state_with_bearer_auth() -> anyhow::Result<()> {
    let sim = spawn_sim("sim-e2e-1").await?;
    let placeholder = "http://127.0.0.1:1"; // signal/docs unused by this test
    let gateway = spawn_gateway(&sim.base_url(), placeholder, placeholder, &[]).await?;

    let client = reqwest::Client::new();
    let token = bearer_token("user-1", "jti-1", far_future_unix_secs());

    let create_resp = client
        .post(format!("{}/v1/simulations/create", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "session_id": "sess-1",
            "engine": "mujoco",
            "model_path": "arm.xml",
            "width": 64,
            "height": 64,
            "fps": 30,
        }))
        .send()
        .await?;
    assert_eq!(create_resp.status().as_u16(), 201);

    let state_resp: serde_json::Value = client
        .get(format!("{}/v1/simulations/sess-1/state", gateway.base_url()))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(state_resp["status"], "running");
    assert_eq!(state_resp["degraded"], false);

    Ok(())
}

#[tokio::test]
async fn rejects_requests_without_a_bearer_token() -> anyhow::Result<()> {
    let sim = spawn_sim("sim-e2e-2").await?;
    let placeholder = "http://127.0.0.1:1";
    let gateway = spawn_gateway(&sim.base_url(), placeholder, placeholder, &[]).await?;

    let resp = reqwest::Client::new()
        .get(format!("{}/v1/simulations/anything/state", gateway.base_url()))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);

    Ok(())
}

#[tokio::test]
async fn enforces_the_per_subject_rate_limit() -> anyhow::Result<()> {
    let sim = spawn_sim("sim-e2e-3").await?;
    let placeholder = "http://127.0.0.1:1";
    let gateway = spawn_gateway(
        &sim.base_url(),
        placeholder,
        placeholder,
        &[("COACT_GATEWAY_RATE_LIMIT_CAPACITY", "2"), ("COACT_GATEWAY_RATE_LIMIT_WINDOW_MS", "60000")],
    )
    .await?;

    let client = reqwest::Client::new();
    let token = bearer_token("rate-limited-user", "jti-rl", far_future_unix_secs());

    let mut saw_429 = false;
    for _ in 0..5 {
        let resp = client
            .get(format!("{}/v1/simulations/nonexistent/state", gateway.base_url()))
            .bearer_auth(&token)
            .send()
            .await?;
        if resp.status().as_u16() == 429 {
            saw_429 = true;
            break;
        }
    }
    assert!(saw_429, "expected a 429 once the per-subject quota was exhausted");

    Ok(())
}

#[tokio::test]
async fn caches_get_responses_per_subject() -> anyhow::Result<()> {
    let sim = spawn_sim("sim-e2e-4").await?;
    let placeholder = "http://127.0.0.1:1";
    let gateway = spawn_gateway(&sim.base_url(), placeholder, placeholder, &[]).await?;

    let client = reqwest::Client::new();
    let token = bearer_token("user-cache", "jti-cache", far_future_unix_secs());

    client
        .post(format!("{}/v1/simulations/create", gateway.base_url()))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "session_id": "sess-cache",
            "engine": "mujoco",
            "model_path": "arm.xml",
            "width": 64,
            "height": 64,
            "fps": 30,
        }))
        .send()
        .await?;

    let url = format!("{}/v1/simulations/sess-cache/state", gateway.base_url());
    let first: serde_json::Value = client.get(&url).bearer_auth(&token).send().await?.json().await?;
    let second: serde_json::Value = client.get(&url).bearer_auth(&token).send().await?.json().await?;
    assert_eq!(first, second);

    Ok(())
}
