// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The `Substrate` trait: the six capabilities spec §4.1 asks for, behind
//! one boundary so C2–C5 never depend on Redis directly. Grounded in the
//! same shape as the engine driver trait in spec §4.2 — an explicit,
//! narrow, `async_trait` interface with one production implementation and
//! one in-memory implementation for tests and single-node development.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::Result;

/// A boxed stream of pub/sub payloads. Per-channel FIFO, no cross-channel
/// ordering, no replay of messages published before subscription (spec §4.1).
pub type MessageStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[async_trait]
pub trait Substrate: Send + Sync {
    // -- KV with TTL ---------------------------------------------------
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Set-if-absent. Returns `true` if the key was previously absent and is
    /// now set by this call — the primitive every exclusive lease is built on.
    async fn set_nx(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    // -- Hash ------------------------------------------------------------
    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<()>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>>;
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    // -- Set ---------------------------------------------------------------
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<HashSet<String>>;
    async fn scard(&self, key: &str) -> Result<usize>;

    // -- Atomic counter ------------------------------------------------
    /// Increment `key` by `by`, applying `ttl` only the first time the key
    /// is created (so a rate-limit window expires on its own schedule).
    /// Returns the post-increment value.
    async fn incr_with_ttl(&self, key: &str, by: i64, ttl: Duration) -> Result<i64>;

    // -- Pub/Sub -------------------------------------------------------
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()>;
    async fn subscribe(&self, channel: &str) -> Result<MessageStream>;

    /// Atomic multi-op: add `member` to `set_key` and write `fields` into
    /// `hash_key` as a single transaction. This is spec §4.1's example of a
    /// mutation that "must not tear" — room-join being the canonical case.
    async fn register_member_and_hash(
        &self,
        set_key: &str,
        member: &str,
        hash_key: &str,
        fields: &[(&str, &str)],
    ) -> Result<()>;
}
