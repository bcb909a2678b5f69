// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! The gateway's HTTP surface: a literal mirror of C2/C3/C4's own route
//! tables (spec §4.5 routes by prefix, not by a generic catch-all), each
//! route either proxied as plain HTTP or upgraded and spliced as a
//! websocket. `/health` never touches auth, rate limiting, or upstreams.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::middleware::{auth_and_rate_limit, extract_claim};
use crate::routing::{self, RouteClass};
use crate::{cache, proxy};
use coact_core::CoreError;

use crate::state::GatewayState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        node_id: state.node_id.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn proxy_http_request(state: &Arc<GatewayState>, class: RouteClass, req: Request) -> Response {
    let claim = match extract_claim(&req) {
        Some(c) => c,
        None => return CoreError::unauthorized("missing authentication context").into_response(),
    };

    let upstream = routing::upstream_base(&state.config, class).to_owned();
    let method = req.method().clone();
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str().to_owned()).unwrap_or_else(|| req.uri().path().to_owned());
    let headers = req.headers().clone();

    let is_cacheable_get = method == axum::http::Method::GET;
    let cache_key = cache::key_for(&claim.subject, &path_and_query);
    if is_cacheable_get {
        if let Some(cached) = cache::get(&state.substrate, &cache_key).await {
            let mut builder = Response::builder().status(cached.status);
            if let Some(ct) = &cached.content_type {
                builder = builder.header(axum::http::header::CONTENT_TYPE, ct);
            }
            if let Ok(resp) = builder.body(axum::body::Body::from(cached.body)) {
                return resp;
            }
        }
    }

    let body = match axum::body::to_bytes(req.into_body(), 16 * 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return CoreError::invalid_input("request body too large or unreadable").into_response(),
    };

    let response =
        proxy::forward_http(&state.http_client, &upstream, &claim, method, &path_and_query, &headers, body).await;

    if is_cacheable_get && response.status().is_success() {
        let status = response.status().as_u16();
        let content_type =
            response.headers().get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let (parts, body) = response.into_parts();
        if let Ok(bytes) = axum::body::to_bytes(body, 16 * 1024 * 1024).await {
            cache::put(
                &state.substrate,
                &cache_key,
                &cache::CachedResponse { status, content_type, body: bytes.to_vec() },
                state.config.cache_ttl(),
            )
            .await;
            return Response::from_parts(parts, axum::body::Body::from(bytes));
        }
    }

    response
}

async fn proxy_ws_request(state: &Arc<GatewayState>, class: RouteClass, req: Request) -> Response {
    let claim = match extract_claim(&req) {
        Some(c) => c,
        None => return CoreError::unauthorized("missing authentication context").into_response(),
    };
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str().to_owned()).unwrap_or_else(|| req.uri().path().to_owned());
    let upstream_ws = routing::as_ws_base(routing::upstream_base(&state.config, class));
    let target = format!("{upstream_ws}{path_and_query}");

    match WebSocketUpgrade::from_request(req, &()).await {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| proxy::splice_websocket(target, claim, socket)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn create_simulation(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    proxy_http_request(&state, RouteClass::Simulations, req).await
}

async fn delete_simulation(
    State(state): State<Arc<GatewayState>>,
    Path(_session_id): Path<String>,
    req: Request,
) -> Response {
    proxy_http_request(&state, RouteClass::Simulations, req).await
}

async fn execute_simulation(
    State(state): State<Arc<GatewayState>>,
    Path(_session_id): Path<String>,
    req: Request,
) -> Response {
    proxy_http_request(&state, RouteClass::Simulations, req).await
}

async fn simulation_state(
    State(state): State<Arc<GatewayState>>,
    Path(_session_id): Path<String>,
    req: Request,
) -> Response {
    proxy_http_request(&state, RouteClass::Simulations, req).await
}

async fn simulation_stream(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    proxy_ws_request(&state, RouteClass::Simulations, req).await
}

async fn signaling(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    proxy_ws_request(&state, RouteClass::Signaling, req).await
}

async fn documents(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    proxy_ws_request(&state, RouteClass::Documents, req).await
}

pub fn router(state: Arc<GatewayState>) -> Router {
    let health_router = Router::new().route("/health", get(health)).with_state(state.clone());

    let proxied_router = Router::new()
        .route("/v1/simulations/create", post(create_simulation))
        .route("/v1/simulations/{session_id}", delete(delete_simulation))
        .route("/v1/simulations/{session_id}/execute", post(execute_simulation))
        .route("/v1/simulations/{session_id}/state", get(simulation_state))
        .route("/v1/simulations/{session_id}/stream", get(simulation_stream))
        .route("/v1/signaling", get(signaling))
        .route("/v1/documents/{workspace_id}/{*path}", get(documents))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth_and_rate_limit))
        .with_state(state);

    health_router.merge(proxied_router).layer(CorsLayer::permissive())
}
