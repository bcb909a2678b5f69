// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use coact_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Errors a `Substrate` implementation can raise. Every variant maps onto
/// the shared taxonomy (spec §7: "Failures from the substrate are retried
/// ... for writes, propagated as `Unavailable` errors").
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
    #[error("substrate operation timed out")]
    DeadlineExceeded,
    #[error("malformed value at key: {0}")]
    Decode(String),
}

impl From<SubstrateError> for CoreError {
    fn from(err: SubstrateError) -> Self {
        match err {
            SubstrateError::Unavailable(msg) => CoreError::new(ErrorKind::Unavailable, msg),
            SubstrateError::DeadlineExceeded => {
                CoreError::deadline_exceeded("substrate operation timed out")
            }
            SubstrateError::Decode(msg) => CoreError::internal(format!("decode error: {msg}")),
        }
    }
}

impl From<redis::RedisError> for SubstrateError {
    fn from(err: redis::RedisError) -> Self {
        SubstrateError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for SubstrateError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        SubstrateError::Unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SubstrateError>;
