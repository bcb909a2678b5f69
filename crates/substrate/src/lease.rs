// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Exclusive-ownership lease helper, used by the simulation service to
//! guarantee at most one node drives a given session's physics engine at a
//! time (spec §4.2's "at most one node holds an exclusive ownership lease").
//! Built on `set_nx` + `expire`, the same primitive the teacher's own
//! `upstream::health` eviction logic is built on, just phrased as
//! acquire/renew/release instead of last-seen/evict.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::backend::Substrate;
use crate::error::Result;

/// A held lease. Dropping it does not release the key — call `release`
/// explicitly, since release requires an async round-trip and ownership
/// checks the caller should make deliberately.
pub struct Lease {
    substrate: Arc<dyn Substrate>,
    key: String,
    holder: String,
    ttl: Duration,
}

impl Lease {
    /// Attempt to acquire the lease for `holder`. Returns `None` if another
    /// holder currently owns it.
    pub async fn acquire(
        substrate: Arc<dyn Substrate>,
        key: impl Into<String>,
        holder: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>> {
        let key = key.into();
        let holder = holder.into();
        let acquired = substrate.set_nx(&key, Bytes::from(holder.clone()), Some(ttl)).await?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(Self { substrate, key, holder, ttl }))
    }

    /// Re-read the current holder without attempting to take ownership.
    pub async fn current_holder(substrate: &dyn Substrate, key: &str) -> Result<Option<String>> {
        let raw = substrate.get(key).await?;
        Ok(raw.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Extend the lease's TTL. Only valid while this process still holds it;
    /// callers racing a takeover should treat a failed renewal as advisory —
    /// the next heartbeat tick will notice the lease is gone via `get`.
    pub async fn renew(&self) -> Result<()> {
        self.substrate.expire(&self.key, self.ttl).await
    }

    /// Release the lease, but only if we are still the recorded holder —
    /// otherwise a slow release could clobber a lease another node has
    /// already taken over after our TTL lapsed.
    pub async fn release(self) -> Result<()> {
        if let Some(current) = Self::current_holder(self.substrate.as_ref(), &self.key).await? {
            if current == self.holder {
                self.substrate.del(&self.key).await?;
            }
        }
        Ok(())
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}
