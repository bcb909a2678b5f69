// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Test harness for end-to-end binary smoke tests: spawns the real
//! `coact-gateway`/`coact-sim`/`coact-signal`/`coact-docs` binaries as
//! subprocesses and exercises them over HTTP and WebSocket, the way a real
//! deployment composes the four services behind the edge gateway.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use base64::Engine;

/// Resolve the path to one of the workspace's compiled binaries.
pub fn binary_path(name: &str) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join(name)
}

/// Find a free TCP port by binding to :0 then releasing it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running coordination-plane component, killed on drop.
pub struct ServiceProcess {
    child: Child,
    port: u16,
}

impl ServiceProcess {
    /// Spawn `binary` bound to a fresh local port, pointed at
    /// `substrate_url` (pass `"memory"` for a single-process harness, or a
    /// real `redis://` URL — see [`test_redis_url`] — for scenarios where
    /// more than one spawned process must see the same substrate state).
    pub fn spawn(
        binary: &str,
        host_env: &str,
        port_env: &str,
        substrate_url: &str,
        node_id: &str,
        extra_env: &[(&str, &str)],
    ) -> anyhow::Result<Self> {
        let path = binary_path(binary);
        anyhow::ensure!(path.exists(), "{binary} binary not found at {}", path.display());

        let port = free_port()?;
        let mut command = Command::new(&path);
        command
            .env(host_env, "127.0.0.1")
            .env(port_env, port.to_string())
            .env("SUBSTRATE_URL", substrate_url)
            .env("NODE_ID", node_id)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (k, v) in extra_env {
            command.env(k, v);
        }

        let child = command.spawn()?;
        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_base_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("service did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for ServiceProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The Redis URL to run multi-node scenarios against, if the environment
/// provides one. A `"memory"` substrate is private to the process that
/// created it, so anything exercising genuinely cross-node behavior (lease
/// takeover after a node dies, a rate limit enforced across two gateway
/// instances) needs a substrate shared by every spawned binary; those tests
/// are `#[ignore]`d unless this is set.
pub fn test_redis_url() -> Option<String> {
    std::env::var("COACT_TEST_REDIS_URL").ok()
}

/// Build a bearer token the way the (out-of-scope) identity provider would:
/// URL-safe base64 over the claim's JSON encoding. Tests act as their own
/// IdP stand-in since the gateway never verifies a signature (spec §1).
pub fn bearer_token(subject: &str, jti: &str, exp_unix_secs: u64) -> String {
    let claim = serde_json::json!({
        "subject": subject,
        "session_id": serde_json::Value::Null,
        "jti": jti,
        "exp": exp_unix_secs,
    });
    let bytes = serde_json::to_vec(&claim).unwrap_or_default();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn far_future_unix_secs() -> u64 {
    4_102_444_800 // 2100-01-01T00:00:00Z, fixed so tests don't depend on the clock
}
