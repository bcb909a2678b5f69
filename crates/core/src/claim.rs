// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use serde::{Deserialize, Serialize};

/// The trusted identity the edge gateway attaches to a request after bearer
/// token validation. The coordination plane never validates signatures
/// itself — an upstream identity provider issues the token; C5 trusts it
/// and forwards this claim inward (spec §1 "out of scope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaim {
    /// Stable user/service identity, used as the rate-limit subject.
    pub subject: String,
    /// Session the token is scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Token identifier, checked against the revocation blacklist.
    pub jti: String,
    /// Unix seconds the token expires at.
    pub exp: u64,
}

impl AuthClaim {
    pub fn remaining_lifetime_secs(&self, now_epoch_secs: u64) -> u64 {
        self.exp.saturating_sub(now_epoch_secs)
    }
}
