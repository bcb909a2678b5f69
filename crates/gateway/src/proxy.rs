// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Reverse proxying to the three upstream components.
//!
//! The HTTP path is grounded in the teacher's `upstream::client::UpstreamClient`
//! (a thin `reqwest` wrapper that forwards bearer identity and JSON bodies).
//! The WebSocket path has no teacher counterpart — `ws_mux.rs` proxies client
//! *input* over HTTP POST rather than splicing raw frames — so it is built
//! directly on `tokio-tungstenite`, the one WS-client crate already in the
//! workspace dependency table with no caller, to pass through binary video
//! frames and CRDT update bytes without the gateway understanding them.

use axum::body::Bytes as AxumBytes;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use coact_core::{AuthClaim, CoreError};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, warn};

const FORWARDED_SUBJECT_HEADER: &str = "x-coact-subject";
const FORWARDED_SESSION_HEADER: &str = "x-coact-session";

fn fallback_response(status: StatusCode) -> Response {
    let mut resp = Response::new(axum::body::Body::empty());
    *resp.status_mut() = status;
    resp
}

/// Forward one HTTP request to `upstream_base`, preserving method, path,
/// query, headers (minus hop-by-hop ones) and body, and attaching the
/// resolved identity as `x-coact-subject`/`x-coact-session` so upstream
/// components never have to understand bearer tokens themselves.
pub async fn forward_http(
    client: &reqwest::Client,
    upstream_base: &str,
    claim: &AuthClaim,
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    body: AxumBytes,
) -> Response {
    let url = format!("{upstream_base}{path_and_query}");
    let reqwest_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return CoreError::invalid_input("unsupported HTTP method").into_response(),
    };

    let mut builder = client.request(reqwest_method, &url);
    for (name, value) in headers.iter() {
        if matches!(name.as_str(), "host" | "content-length" | "authorization") {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    builder = builder.header(FORWARDED_SUBJECT_HEADER, &claim.subject);
    if let Some(session_id) = &claim.session_id {
        builder = builder.header(FORWARDED_SESSION_HEADER, session_id);
    }
    builder = builder.body(body.to_vec());

    match builder.send().await {
        Ok(resp) => reqwest_response_to_axum(resp).await,
        Err(e) => {
            warn!(%url, error = %e, "upstream request failed");
            CoreError::unavailable(format!("upstream unavailable: {e}")).into_response()
        }
    }
}

async fn reqwest_response_to_axum(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = match resp.bytes().await {
        Ok(b) => b,
        Err(_) => return fallback_response(StatusCode::BAD_GATEWAY),
    };

    let mut builder = Response::builder().status(status.as_u16());
    for (name, value) in headers.iter() {
        if matches!(name.as_str(), "content-length" | "transfer-encoding" | "connection") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    match builder.body(axum::body::Body::from(body)) {
        Ok(resp) => resp,
        Err(_) => fallback_response(StatusCode::BAD_GATEWAY),
    }
}

/// Splice a downstream (browser) websocket to an upstream one, relaying
/// frames verbatim in both directions until either side closes. Used for
/// the simulation frame stream, the signaling socket, and the document
/// sync socket alike — the gateway never decodes the frames it relays.
/// The resolved identity is forwarded on the upstream handshake request so
/// C2–C4 see the same `x-coact-subject`/`x-coact-session` headers the HTTP
/// proxy path attaches.
pub async fn splice_websocket(upstream_ws_url: String, claim: AuthClaim, downstream: WebSocket) {
    let handshake_request = match build_handshake_request(&upstream_ws_url, &claim) {
        Ok(req) => req,
        Err(e) => {
            warn!(url = %upstream_ws_url, error = %e, "failed to build upstream handshake request");
            return;
        }
    };

    let (upstream, _response) = match tokio_tungstenite::connect_async(handshake_request).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(url = %upstream_ws_url, error = %e, "failed to connect to upstream websocket");
            return;
        }
    };

    let (mut upstream_tx, mut upstream_rx) = upstream.split();
    let (mut downstream_tx, mut downstream_rx) = downstream.split();

    let upstream_to_downstream = async {
        while let Some(msg) = upstream_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    debug!(error = %e, "upstream websocket read error");
                    break;
                }
            };
            let Some(forwarded) = upstream_to_axum_message(msg) else { continue };
            if downstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = downstream_tx.close().await;
    };

    let downstream_to_upstream = async {
        while let Some(msg) = downstream_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    debug!(error = %e, "downstream websocket read error");
                    break;
                }
            };
            let is_close = matches!(msg, AxumMessage::Close(_));
            if let Some(forwarded) = axum_to_upstream_message(msg) {
                if upstream_tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            if is_close {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    tokio::join!(upstream_to_downstream, downstream_to_upstream);
}

/// Build the upstream handshake request, attaching forwarded-identity
/// headers via `tokio_tungstenite::tungstenite::handshake::client::Request`
/// (an `http::Request<()>`) rather than relying on query-string auth.
fn build_handshake_request(
    url: &str,
    claim: &AuthClaim,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, tokio_tungstenite::tungstenite::Error> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    if let Ok(value) = claim.subject.parse() {
        headers.insert(FORWARDED_SUBJECT_HEADER, value);
    }
    if let Some(session_id) = &claim.session_id {
        if let Ok(value) = session_id.parse() {
            headers.insert(FORWARDED_SESSION_HEADER, value);
        }
    }
    Ok(request)
}

fn upstream_to_axum_message(msg: UpstreamMessage) -> Option<AxumMessage> {
    match msg {
        UpstreamMessage::Text(t) => Some(AxumMessage::Text(t.as_str().to_owned().into())),
        UpstreamMessage::Binary(b) => Some(AxumMessage::Binary(b)),
        UpstreamMessage::Ping(p) => Some(AxumMessage::Ping(p)),
        UpstreamMessage::Pong(p) => Some(AxumMessage::Pong(p)),
        UpstreamMessage::Close(_) => Some(AxumMessage::Close(None)),
        UpstreamMessage::Frame(_) => None,
    }
}

fn axum_to_upstream_message(msg: AxumMessage) -> Option<UpstreamMessage> {
    match msg {
        AxumMessage::Text(t) => Some(UpstreamMessage::Text(t.as_str().to_owned().into())),
        AxumMessage::Binary(b) => Some(UpstreamMessage::Binary(b)),
        AxumMessage::Ping(p) => Some(UpstreamMessage::Ping(p)),
        AxumMessage::Pong(p) => Some(UpstreamMessage::Pong(p)),
        AxumMessage::Close(_) => Some(UpstreamMessage::Close(None)),
    }
}
