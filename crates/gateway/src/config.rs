// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

/// Configuration for the edge gateway (spec §4.5): substrate access plus
/// the static upstream routing table and the per-route-class rate limit
/// and response-cache parameters.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    #[command(flatten)]
    pub substrate: coact_substrate::SubstrateConfig,

    #[arg(long, default_value = "0.0.0.0", env = "COACT_GATEWAY_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8100, env = "COACT_GATEWAY_PORT")]
    pub port: u16,

    /// Base URL of one simulation-service (C2) node. In a real deployment
    /// this would resolve through a load balancer or service mesh; the
    /// gateway itself does no upstream health tracking (spec §4.5: "does
    /// not pin clients to specific upstream nodes").
    #[arg(long, default_value = "http://127.0.0.1:8101", env = "COACT_UPSTREAM_SIM")]
    pub upstream_sim: String,

    #[arg(long, default_value = "http://127.0.0.1:8102", env = "COACT_UPSTREAM_SIGNAL")]
    pub upstream_signal: String,

    #[arg(long, default_value = "http://127.0.0.1:8103", env = "COACT_UPSTREAM_DOCS")]
    pub upstream_docs: String,

    /// Requests admitted per rate-limit window, per `(subject, route-class)`.
    #[arg(long, default_value_t = 100, env = "COACT_GATEWAY_RATE_LIMIT_CAPACITY")]
    pub rate_limit_capacity: i64,

    /// Rate-limit window, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "COACT_GATEWAY_RATE_LIMIT_WINDOW_MS")]
    pub rate_limit_window_ms: u64,

    /// TTL for cached GET responses (spec §4.5: "≤ 5 s").
    #[arg(long, default_value_t = 5000, env = "COACT_GATEWAY_CACHE_TTL_MS")]
    pub cache_ttl_ms: u64,

    /// TTL ceiling for cached bearer-token validation (spec §4.5: "TTL =
    /// min(remaining token lifetime, 60s)").
    #[arg(long, default_value_t = 60, env = "COACT_GATEWAY_AUTH_CACHE_MAX_SECS")]
    pub auth_cache_max_secs: u64,
}

impl GatewayConfig {
    pub fn rate_limit_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn auth_cache_max(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auth_cache_max_secs)
    }
}
