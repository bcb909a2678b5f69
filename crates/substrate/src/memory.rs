// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Single-process `Substrate` implementation backed by a `Mutex`-guarded
//! map plus per-channel broadcast senders. Used for unit tests and local,
//! single-node development — the same role the teacher's `--hot` local
//! dev path plays for its own dashboard assets.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::backend::{MessageStream, Substrate};
use crate::error::Result;

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

#[derive(Default)]
struct Store {
    kv: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, Bytes>>,
    sets: HashMap<String, std::collections::HashSet<String>>,
    channels: HashMap<String, broadcast::Sender<Bytes>>,
}

impl Store {
    fn channel(&mut self, name: &str) -> broadcast::Sender<Bytes> {
        self.channels
            .entry(name.to_owned())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

/// In-memory substrate. One instance is shared (via `Arc`) across every
/// component in a single-node deployment or test harness.
pub struct MemorySubstrate {
    store: Mutex<Store>,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self { store: Mutex::new(Store::default()) }
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        match store.kv.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                store.kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        let expires_at = ttl.map(|d| Instant::now() + d);
        store.kv.insert(key.to_owned(), Entry { value, expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.kv.remove(key);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        let occupied = matches!(store.kv.get(key), Some(e) if e.is_live());
        if occupied {
            return Ok(false);
        }
        let expires_at = ttl.map(|d| Instant::now() + d);
        store.kv.insert(key.to_owned(), Entry { value, expires_at });
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = store.kv.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.hashes.entry(key.to_owned()).or_default().insert(field.to_owned(), value);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        Ok(store.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        Ok(store.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(h) = store.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.sets.entry(key.to_owned()).or_default().insert(member.to_owned());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(s) = store.sets.get_mut(key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<std::collections::HashSet<String>> {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        Ok(store.sets.get(key).cloned().unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        Ok(store.sets.get(key).map(|s| s.len()).unwrap_or(0))
    }

    async fn incr_with_ttl(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        let live = matches!(store.kv.get(key), Some(e) if e.is_live());
        let current = if live {
            store.kv.get(key).and_then(|e| std::str::from_utf8(&e.value).ok()?.parse::<i64>().ok()).unwrap_or(0)
        } else {
            0
        };
        let next = current + by;
        let expires_at = if live {
            store.kv.get(key).and_then(|e| e.expires_at)
        } else {
            Some(Instant::now() + ttl)
        };
        store.kv.insert(key.to_owned(), Entry { value: Bytes::from(next.to_string()), expires_at });
        Ok(next)
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        let tx = store.channel(channel);
        let _ = tx.send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        let tx = store.channel(channel);
        let rx = tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }

    async fn register_member_and_hash(
        &self,
        set_key: &str,
        member: &str,
        hash_key: &str,
        fields: &[(&str, &str)],
    ) -> Result<()> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.sets.entry(set_key.to_owned()).or_default().insert(member.to_owned());
        let hash = store.hashes.entry(hash_key.to_owned()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_owned(), Bytes::from((*value).to_owned()));
        }
        Ok(())
    }
}
