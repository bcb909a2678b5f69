// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use coact_signal::registry::spawn_background_tasks;
use coact_signal::ws::{upgrade, SignalState};
use coact_signal::{SignalConfig, SignalRegistry};

#[derive(Parser)]
#[command(name = "coact-signal", version, about = "Coordination-plane signaling relay.")]
struct Cli {
    #[command(flatten)]
    config: SignalConfig,
}

struct HealthState {
    registry: Arc<SignalRegistry>,
    node_id: String,
    started_at: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    connections: usize,
    rooms: usize,
}

async fn health(axum::extract::State(state): axum::extract::State<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        node_id: state.node_id.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.registry.local_client_count().await,
        rooms: state.registry.local_room_count().await,
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let node_id = config.substrate.resolve_node_id();
    let substrate = match coact_substrate::connect(&config.substrate).await {
        Ok(s) => s,
        Err(e) => {
            error!("substrate unavailable at startup: {e}");
            std::process::exit(2);
        }
    };

    let registry = Arc::new(SignalRegistry::new(substrate.clone(), node_id.to_string()));
    let cancel = tokio_util::sync::CancellationToken::new();
    spawn_background_tasks(registry.clone(), substrate, config.substrate.heartbeat_interval(), cancel.clone());

    let health_state =
        Arc::new(HealthState { registry: registry.clone(), node_id: node_id.to_string(), started_at: Instant::now() });
    let signal_state = Arc::new(SignalState { registry });

    let health_router = Router::new().route("/health", get(health)).with_state(health_state);
    let signal_router = Router::new().route("/v1/signaling", get(upgrade)).with_state(signal_state);
    let router = health_router.merge(signal_router).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "coact-signal listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    let shutdown_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(cancel.cancelled_owned()).await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}
