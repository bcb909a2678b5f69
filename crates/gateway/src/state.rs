// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use std::sync::Arc;
use std::time::Instant;

use coact_substrate::Substrate;

use crate::config::GatewayConfig;

/// Shared state for every gateway route: the substrate handle (auth cache,
/// rate-limit counters, response cache), the static routing/quota config,
/// and a pooled HTTP client reused across proxied requests.
pub struct GatewayState {
    pub substrate: Arc<dyn Substrate>,
    pub config: GatewayConfig,
    pub http_client: reqwest::Client,
    pub node_id: String,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(substrate: Arc<dyn Substrate>, config: GatewayConfig, node_id: String) -> Self {
        Self { substrate, config, http_client: reqwest::Client::new(), node_id, started_at: Instant::now() }
    }
}
