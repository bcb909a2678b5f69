// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use std::fmt;

/// Identifies one running node in the cluster. Generated at startup unless
/// the `NODE_ID` environment variable pins it (useful in tests and when
/// running under an orchestrator that already assigns stable pod names).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Resolve from the `NODE_ID` env var, or generate a random one.
    pub fn from_env_or_random() -> Self {
        match std::env::var("NODE_ID") {
            Ok(id) if !id.is_empty() => Self(id),
            _ => Self(format!("node-{}", uuid::Uuid::new_v4())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
