// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Fixed-window rate limiter over `incr_with_ttl`, used by the edge gateway
//! to enforce per-subject request quotas across every node, not just the
//! one that happens to hold the connection.

use std::time::Duration;

use crate::backend::Substrate;
use crate::error::Result;

pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: i64,
    pub limit: i64,
}

/// Increment the window counter for `key` and compare against `limit`.
/// `window` is the fixed-window duration; the window resets `window` after
/// the first request that created the counter, not on a wall-clock boundary.
pub async fn check(
    substrate: &dyn Substrate,
    key: &str,
    limit: i64,
    window: Duration,
) -> Result<RateLimitDecision> {
    let count = substrate.incr_with_ttl(key, 1, window).await?;
    Ok(RateLimitDecision { allowed: count <= limit, count, limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySubstrate;
    use proptest::prelude::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let sub = MemorySubstrate::new();
        for _ in 0..3 {
            let d = check(&sub, "rl:u1:api", 3, Duration::from_secs(1)).await.unwrap();
            assert!(d.allowed);
        }
        let blocked = check(&sub, "rl:u1:api", 3, Duration::from_secs(1)).await.unwrap();
        assert!(!blocked.allowed);
        assert_eq!(blocked.count, 4);
    }

    proptest! {
        /// Spec §8 invariant 7: rate-limit buckets never admit more than
        /// `capacity` requests in any window, for an arbitrary capacity and
        /// an arbitrary number of requests arriving within that window.
        #[test]
        fn never_admits_more_than_capacity(capacity in 1i64..20, attempts in 0usize..40) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let sub = MemorySubstrate::new();
                let mut admitted = 0i64;
                for _ in 0..attempts {
                    let d = check(&sub, "rl:prop:api", capacity, Duration::from_secs(60)).await.unwrap();
                    if d.allowed {
                        admitted += 1;
                    }
                }
                prop_assert!(admitted <= capacity);
                Ok(())
            })?;
        }
    }
}
