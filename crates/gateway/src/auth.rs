// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Bearer-token validation (spec §4.5/§1: "an upstream identity provider
//! issues bearer tokens; the core trusts a `(subject, session)` claim").
//! The gateway never verifies a signature — that is the identity
//! provider's job, out of scope per spec §1 — it decodes the claim the
//! token carries, checks the revocation blacklist, and caches a successful
//! validation so a hot client doesn't re-decode and re-check on every
//! request (spec §4.5: "cached per-token with TTL = min(remaining token
//! lifetime, 60s)").

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use coact_core::{AuthClaim, CoreError};
use coact_substrate::{keys, Substrate};

pub async fn authenticate(
    substrate: &Arc<dyn Substrate>,
    bearer: Option<&str>,
    auth_cache_max: Duration,
) -> Result<AuthClaim, CoreError> {
    let token = bearer.ok_or_else(|| CoreError::unauthorized("missing bearer token"))?;

    let cache_key = keys::response_cache("auth", token);
    if let Some(cached) = substrate.get(&cache_key).await.map_err(CoreError::from)? {
        if let Ok(claim) = serde_json::from_slice::<AuthClaim>(&cached) {
            return Ok(claim);
        }
    }

    let claim = decode_claim(token)?;

    if substrate.get(&keys::revoked_token(&claim.jti)).await.map_err(CoreError::from)?.is_some() {
        return Err(CoreError::unauthorized("token has been revoked"));
    }

    let now_secs = coact_core::epoch_ms() / 1000;
    let remaining = claim.remaining_lifetime_secs(now_secs);
    if remaining == 0 {
        return Err(CoreError::unauthorized("token expired"));
    }

    let ttl = Duration::from_secs(remaining.min(auth_cache_max.as_secs()).max(1));
    if let Ok(bytes) = serde_json::to_vec(&claim) {
        let _ = substrate.set(&cache_key, Bytes::from(bytes), Some(ttl)).await;
    }
    Ok(claim)
}

/// Decode a bearer token into its claim. Tokens are URL-safe base64 over
/// the claim's JSON encoding — a stand-in for whatever signed format the
/// identity provider actually issues (JWT, PASETO, ...); the gateway only
/// ever needs the decoded claim, never the signing scheme.
fn decode_claim(token: &str) -> Result<AuthClaim, CoreError> {
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| CoreError::unauthorized("malformed bearer token"))?;
    serde_json::from_slice(&decoded).map_err(|_| CoreError::unauthorized("malformed bearer token claim"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coact_substrate::MemorySubstrate;

    fn encode_claim(claim: &AuthClaim) -> String {
        let json = serde_json::to_vec(claim).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    #[tokio::test]
    async fn accepts_a_well_formed_unrevoked_token() {
        let sub: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
        let claim = AuthClaim { subject: "u1".into(), session_id: None, jti: "t1".into(), exp: u64::MAX };
        let token = encode_claim(&claim);
        let result = authenticate(&sub, Some(&token), Duration::from_secs(60)).await.unwrap();
        assert_eq!(result.subject, "u1");
    }

    #[tokio::test]
    async fn rejects_a_revoked_token() {
        let sub: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
        let claim = AuthClaim { subject: "u1".into(), session_id: None, jti: "t1".into(), exp: u64::MAX };
        sub.set(&keys::revoked_token("t1"), Bytes::from_static(b"1"), None).await.unwrap();
        let token = encode_claim(&claim);
        assert!(authenticate(&sub, Some(&token), Duration::from_secs(60)).await.is_err());
    }

    #[tokio::test]
    async fn rejects_missing_bearer() {
        let sub: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
        assert!(authenticate(&sub, None, Duration::from_secs(60)).await.is_err());
    }
}
