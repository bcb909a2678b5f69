// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The State Substrate: KV/TTL, hash, set, atomic counter, and pub/sub
//! primitives shared by every other component, plus the lease and
//! rate-limit helpers built on top of them.

pub mod backend;
pub mod config;
pub mod error;
pub mod keys;
pub mod lease;
pub mod memory;
pub mod ratelimit;
pub mod redis_backend;

pub use backend::{MessageStream, Substrate};
pub use config::SubstrateConfig;
pub use error::{Result, SubstrateError};
pub use lease::Lease;
pub use memory::MemorySubstrate;
pub use redis_backend::RedisSubstrate;

use std::sync::Arc;

/// Construct the substrate implementation named by `config`. `"memory"`
/// selects the in-process backend (tests, single-node dev); anything else
/// is treated as a Redis connection URL.
pub async fn connect(config: &SubstrateConfig) -> Result<Arc<dyn Substrate>> {
    if config.substrate_url == "memory" {
        return Ok(Arc::new(MemorySubstrate::new()));
    }
    let redis = RedisSubstrate::connect(&config.substrate_url).await?;
    Ok(Arc::new(redis))
}
