// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The gateway's static upstream routing table (spec §4.5: "routes by URL
//! prefix to one of C2/C3/C4; does not pin clients to specific upstream
//! nodes"). Each route also carries a rate-limit class, since spec §4.5
//! scopes quotas per `(subject, route-class)` rather than globally.

use crate::config::GatewayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Simulations,
    Signaling,
    Documents,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulations => "simulations",
            Self::Signaling => "signaling",
            Self::Documents => "documents",
        }
    }
}

/// Classify a request path into the upstream it belongs to and the
/// rate-limit class that applies to it. Returns `None` for anything not
/// under one of the three proxied prefixes (the caller 404s in that case).
pub fn classify(path: &str) -> Option<RouteClass> {
    if path.starts_with("/v1/simulations") {
        Some(RouteClass::Simulations)
    } else if path.starts_with("/v1/signaling") {
        Some(RouteClass::Signaling)
    } else if path.starts_with("/v1/documents") {
        Some(RouteClass::Documents)
    } else {
        None
    }
}

pub fn upstream_base(config: &GatewayConfig, class: RouteClass) -> &str {
    match class {
        RouteClass::Simulations => &config.upstream_sim,
        RouteClass::Signaling => &config.upstream_signal,
        RouteClass::Documents => &config.upstream_docs,
    }
}

/// Rewrite an `http(s)://` upstream base into its `ws(s)://` equivalent,
/// for the two proxied routes (`/stream`, `/signaling`, `/documents/...`)
/// that are websocket upgrades rather than plain HTTP.
pub fn as_ws_base(upstream_base: &str) -> String {
    if let Some(rest) = upstream_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = upstream_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        upstream_base.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_prefixes() {
        assert_eq!(classify("/v1/simulations/create"), Some(RouteClass::Simulations));
        assert_eq!(classify("/v1/signaling"), Some(RouteClass::Signaling));
        assert_eq!(classify("/v1/documents/ws1/a/b"), Some(RouteClass::Documents));
        assert_eq!(classify("/health"), None);
    }

    #[test]
    fn rewrites_scheme_for_websockets() {
        assert_eq!(as_ws_base("http://127.0.0.1:8101"), "ws://127.0.0.1:8101");
        assert_eq!(as_ws_base("https://sim.example.com"), "wss://sim.example.com");
    }
}
