// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Combined auth + rate-limit middleware, grounded in the teacher's
//! `transport::auth::auth_layer` shape (skip a health path, validate,
//! short-circuit with the shared error envelope on failure) but extended
//! with spec §4.5's per-subject, per-route-class quota check, since the
//! gateway enforces both on every proxied request.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use coact_core::{AuthClaim, CoreError};

use crate::routing;
use crate::state::GatewayState;

fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Axum middleware enforcing bearer auth and the per-subject rate limit on
/// every request except `/health`. Attaches the resolved [`AuthClaim`] to
/// the request's extensions so downstream handlers (the proxy) can forward
/// identity headers without re-deriving them.
pub async fn auth_and_rate_limit(state: State<Arc<GatewayState>>, mut req: Request, next: Next) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let bearer = bearer_from_headers(req.headers());
    let claim = match crate::auth::authenticate(&state.substrate, bearer, state.config.auth_cache_max()).await {
        Ok(claim) => claim,
        Err(err) => return err.into_response(),
    };

    let class = routing::classify(req.uri().path());
    if let Some(class) = class {
        let key = coact_substrate::keys::rate_limit(&claim.subject, class.as_str());
        match coact_substrate::ratelimit::check(
            state.substrate.as_ref(),
            &key,
            state.config.rate_limit_capacity,
            state.config.rate_limit_window(),
        )
        .await
        {
            Ok(decision) if !decision.allowed => {
                return CoreError::too_many_requests(format!(
                    "rate limit exceeded for {} ({}/{})",
                    class.as_str(),
                    decision.count,
                    decision.limit
                ))
                .into_response();
            }
            Ok(_) => {}
            Err(e) => return CoreError::from(e).into_response(),
        }
    }

    req.extensions_mut().insert(claim);
    next.run(req).await
}

pub fn extract_claim(req: &Request) -> Option<AuthClaim> {
    req.extensions().get::<AuthClaim>().cloned()
}
