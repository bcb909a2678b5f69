// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Response caching for idempotent GET requests (spec §4.5: "caches GET
//! responses for up to 5s, scoped per subject so one caller never sees
//! another's cached state").

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use coact_substrate::{keys, Substrate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub fn key_for(subject: &str, path_and_query: &str) -> String {
    keys::response_cache("http", &format!("{subject}:{path_and_query}"))
}

pub async fn get(substrate: &Arc<dyn Substrate>, key: &str) -> Option<CachedResponse> {
    let raw = substrate.get(key).await.ok().flatten()?;
    serde_json::from_slice(&raw).ok()
}

pub async fn put(substrate: &Arc<dyn Substrate>, key: &str, response: &CachedResponse, ttl: Duration) {
    if let Ok(bytes) = serde_json::to_vec(response) {
        let _ = substrate.set(key, Bytes::from(bytes), Some(ttl)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coact_substrate::MemorySubstrate;

    #[tokio::test]
    async fn round_trips_a_cached_response() {
        let sub: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
        let key = key_for("u1", "/v1/simulations/s1/state");
        assert!(get(&sub, &key).await.is_none());

        let resp = CachedResponse { status: 200, content_type: Some("application/json".into()), body: b"{}".to_vec() };
        put(&sub, &key, &resp, Duration::from_secs(5)).await;

        let cached = get(&sub, &key).await.unwrap();
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, b"{}");
    }
}
