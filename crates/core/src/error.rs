// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The coordination plane's error taxonomy (spec §7).
//!
//! One enum shared by every component so the HTTP/WS edge always emits the
//! same `{error: {code, message, retriable}}` envelope regardless of which
//! subsystem produced the failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language-neutral error kind, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Busy,
    InvalidInput,
    InvalidTransition,
    Unauthorized,
    TooManyRequests,
    DeadlineExceeded,
    Degraded,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to at the edge.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::Busy => 409,
            Self::InvalidInput => 400,
            Self::InvalidTransition => 409,
            Self::Unauthorized => 401,
            Self::TooManyRequests => 429,
            Self::DeadlineExceeded => 504,
            Self::Degraded => 200,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Whether a client is encouraged to retry (with jittered backoff) on this kind.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Unavailable | Self::Busy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Busy => "BUSY",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Degraded => "DEGRADED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }
}

/// A coordination-plane error: a taxonomy kind plus a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyRequests, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Degraded, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn retriable(&self) -> bool {
        self.kind.retriable()
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind.as_str().to_owned(),
            message: self.message.clone(),
            retriable: self.kind.retriable(),
        }
    }
}

/// Error body with machine-readable code, message, and retry hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

/// Top-level error response envelope, matching every component's HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl From<&CoreError> for ErrorResponse {
    fn from(err: &CoreError) -> Self {
        Self { error: err.to_body() }
    }
}

#[cfg(feature = "http")]
mod http_impl {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    impl IntoResponse for CoreError {
        fn into_response(self) -> Response {
            let status =
                StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body: ErrorResponse = (&self).into();
            (status, Json(body)).into_response()
        }
    }
}
