// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

/// Configuration shared by every component that talks to the substrate.
///
/// Every field is bound to an environment variable, matching the teacher's
/// `#[arg(long, env = "...")]` idiom so it composes into each binary's own
/// `clap::Parser` via `#[command(flatten)]`.
#[derive(Debug, Clone, clap::Args)]
pub struct SubstrateConfig {
    /// Redis connection URL for the shared state substrate. Required.
    #[arg(long, env = "SUBSTRATE_URL")]
    pub substrate_url: String,

    /// This node's identifier. Random if unset.
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Interval between cross-node heartbeat publications.
    #[arg(long, default_value_t = 5000, env = "HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// TTL for exclusive ownership leases (sessions, locks).
    #[arg(long, default_value_t = 15000, env = "LEASE_TTL_MS")]
    pub lease_ttl_ms: u64,
}

impl SubstrateConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn lease_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn resolve_node_id(&self) -> coact_core::NodeId {
        match &self.node_id {
            Some(id) if !id.is_empty() => coact_core::NodeId(id.clone()),
            _ => coact_core::NodeId::from_env_or_random(),
        }
    }
}
