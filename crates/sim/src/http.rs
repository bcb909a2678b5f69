// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! HTTP + WebSocket surface for the simulation service (spec §6).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use coact_core::CoreError;

use crate::driver::EngineKind;
use crate::manager::SimulationManager;
use crate::session::{ControlVerb, SessionDescriptor};

pub struct AppState {
    pub manager: Arc<SimulationManager>,
    pub node_id: String,
    pub started_at: Instant,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/simulations/create", post(create_simulation))
        .route("/v1/simulations/{session_id}", delete(delete_simulation))
        .route("/v1/simulations/{session_id}/execute", post(execute))
        .route("/v1/simulations/{session_id}/state", get(get_state))
        .route("/v1/simulations/{session_id}/stream", get(stream_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        node_id: state.node_id.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: state.manager.session_count().await,
    })
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    session_id: String,
    engine: EngineKind,
    model_path: String,
    width: u32,
    height: u32,
    fps: u32,
    #[serde(default)]
    headless: bool,
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    status: &'static str,
}

async fn create_simulation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateResponse>), CoreError> {
    let descriptor = SessionDescriptor {
        session_id: req.session_id,
        engine: req.engine,
        model_ref: req.model_path,
        width: req.width,
        height: req.height,
        fps: req.fps,
        headless: req.headless,
        created_at: coact_core::epoch_ms(),
    };
    state.manager.create(descriptor).await?;
    Ok((axum::http::StatusCode::CREATED, Json(CreateResponse { status: "created" })))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    status: &'static str,
}

async fn delete_simulation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>, CoreError> {
    let deleted = state.manager.delete(&session_id).await?;
    Ok(Json(DeleteResponse { status: if deleted { "deleted" } else { "absent" } }))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    code: String,
    #[serde(default)]
    #[allow(dead_code)]
    model_path: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    working_dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    status: &'static str,
    stdout: String,
    stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn execute(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, CoreError> {
    let result = state.manager.execute(&session_id, req.code).await?;
    Ok(Json(ExecuteResponse {
        status: result.status,
        stdout: result.stdout,
        stderr: result.stderr,
        error: result.error,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
struct StateResponse {
    status: String,
    degraded: bool,
    frame_index: u64,
    sim_time: f64,
}

async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<StateResponse>, CoreError> {
    let snap = state.manager.get_state(&session_id).await?;
    Ok(Json(StateResponse {
        status: format!("{:?}", snap.status).to_lowercase(),
        degraded: snap.degraded,
        frame_index: snap.frame_index,
        sim_time: snap.sim_time,
    }))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    from_frame: Option<u64>,
}

async fn stream_ws(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, session_id, query.from_frame))
}

async fn handle_stream(socket: WebSocket, state: Arc<AppState>, session_id: String, from_frame: Option<u64>) {
    let (backlog, mut frame_rx, _guard) = match state.manager.subscribe_stream(&session_id, from_frame).await {
        Ok(triple) => triple,
        Err(e) => {
            let _ = socket
                .split()
                .0
                .send(Message::Text(serde_json::to_string(&e.to_body()).unwrap_or_default().into()))
                .await;
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    for frame in backlog {
        if ws_tx.send(Message::Binary(frame.encode().into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if ws_tx.send(Message::Binary(frame.encode().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ControlVerb::parse(&text) {
                            Ok(verb) => {
                                if let Err(e) = state.manager.send_control(&session_id, verb).await {
                                    let _ = ws_tx.send(Message::Text(
                                        serde_json::to_string(&serde_json::json!({
                                            "type": "error", "error": e.to_body(),
                                        })).unwrap_or_default().into(),
                                    )).await;
                                }
                            }
                            Err(e) => {
                                let _ = ws_tx.send(Message::Text(
                                    serde_json::to_string(&serde_json::json!({
                                        "type": "error", "error": e.to_body(),
                                    })).unwrap_or_default().into(),
                                )).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum_test::TestServer;
    use coact_substrate::{MemorySubstrate, Substrate};

    use crate::driver::NullDriver;
    use crate::manager::SimulationManager;

    use super::*;

    fn test_server() -> TestServer {
        let substrate: Arc<dyn Substrate> = Arc::new(MemorySubstrate::new());
        let manager = Arc::new(SimulationManager::new(
            substrate,
            Arc::new(NullDriver::new()),
            "test-node".into(),
            Duration::from_secs(15),
            Duration::from_secs(60),
            4,
        ));
        let state = Arc::new(AppState { manager, node_id: "test-node".into(), started_at: std::time::Instant::now() });
        TestServer::new(router(state)).unwrap()
    }

    /// Drives spec §6's `create` -> `state` -> `delete` lifecycle over real
    /// HTTP (not by calling `SimulationManager` directly), exercising the
    /// axum router, JSON (de)serialization, and status codes together.
    #[tokio::test]
    async fn create_state_delete_round_trip() {
        let server = test_server();

        let create = server
            .post("/v1/simulations/create")
            .json(&serde_json::json!({
                "session_id": "s1",
                "engine": "mujoco",
                "model_path": "cartpole.xml",
                "width": 64,
                "height": 64,
                "fps": 30,
                "headless": true,
            }))
            .await;
        create.assert_status(axum::http::StatusCode::CREATED);

        let state = server.get("/v1/simulations/s1/state").await;
        state.assert_status_ok();
        let body: StateResponse = state.json();
        assert_eq!(body.frame_index, 0);

        let delete = server.delete("/v1/simulations/s1").await;
        delete.assert_status_ok();
        let body: serde_json::Value = delete.json();
        assert_eq!(body["status"], "deleted");

        // Idempotent per spec §8 invariant 4.
        let delete_again = server.delete("/v1/simulations/s1").await;
        delete_again.assert_status_ok();
        let body: serde_json::Value = delete_again.json();
        assert_eq!(body["status"], "absent");
    }

    #[tokio::test]
    async fn create_rejects_non_positive_fps() {
        let server = test_server();
        let create = server
            .post("/v1/simulations/create")
            .json(&serde_json::json!({
                "session_id": "s2",
                "engine": "mujoco",
                "model_path": "cartpole.xml",
                "width": 64,
                "height": 64,
                "fps": 0,
                "headless": true,
            }))
            .await;
        create.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }
}
