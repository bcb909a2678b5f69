// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Redis-backed `Substrate`. Grounded in the retrieval pack's
//! `meridian-cache`/`meridian-realtime` crates — the only examples that
//! pair `redis` + `deadpool-redis` for exactly this KV/TTL/hash/set/pubsub
//! role. Pooled via `deadpool_redis::Pool`; pub/sub uses a dedicated
//! connection per subscription, since Redis multiplexes pub/sub on its own
//! connection and cannot share one with command execution.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config, Pool, Runtime};
use futures_util::StreamExt;
use redis::AsyncCommands;

use crate::backend::{MessageStream, Substrate};
use crate::error::{Result, SubstrateError};

pub struct RedisSubstrate {
    pool: Pool,
    /// Raw connection URL, needed to open dedicated pub/sub connections
    /// outside the command pool.
    url: String,
}

impl RedisSubstrate {
    pub async fn connect(url: &str) -> Result<Self> {
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| SubstrateError::Unavailable(e.to_string()))?;
        // Fail fast at startup if Redis is unreachable (spec §6 exit code 2).
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { pool, url: url.to_owned() })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

fn ttl_ms(ttl: Duration) -> i64 {
    ttl.as_millis().max(1) as i64
}

#[async_trait]
impl Substrate for RedisSubstrate {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(d) => {
                let _: () = conn.pset_ex(key, value.to_vec(), ttl_ms(d) as u64).await?;
            }
            None => {
                let _: () = conn.set(key, value.to_vec()).await?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value.to_vec()).arg("NX");
        if let Some(d) = ttl {
            cmd.arg("PX").arg(ttl_ms(d));
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.pexpire(key, ttl_ms(ttl)).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(key, field, value.to_vec()).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.hget(key, field).await?;
        Ok(value.map(Bytes::from))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        let mut conn = self.conn().await?;
        let raw: HashMap<String, Vec<u8>> = conn.hgetall(key).await?;
        Ok(raw.into_iter().map(|(k, v)| (k, Bytes::from(v))).collect())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.scard(key).await?)
    }

    async fn incr_with_ttl(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn().await?;
        let next: i64 = conn.incr(key, by).await?;
        // Only the writer that created the key sets its expiry, so the
        // window's lifetime is pinned to the first increment, not the last.
        if next == by {
            let _: () = conn.pexpire(key, ttl_ms(ttl)).await?;
        }
        Ok(next)
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.publish(channel, payload.to_vec()).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        let client = redis::Client::open(self.url.clone())?;
        let pubsub_conn = client.get_async_pubsub().await?;
        let mut pubsub_conn = pubsub_conn;
        pubsub_conn.subscribe(channel).await?;
        let stream = pubsub_conn.into_on_message().map(|msg| {
            let payload: Vec<u8> = msg.get_payload().unwrap_or_default();
            Bytes::from(payload)
        });
        Ok(Box::pin(stream))
    }

    async fn register_member_and_hash(
        &self,
        set_key: &str,
        member: &str,
        hash_key: &str,
        fields: &[(&str, &str)],
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().sadd(set_key, member).ignore();
        for (field, value) in fields {
            pipe.hset(hash_key, *field, *value).ignore();
        }
        let (): () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
