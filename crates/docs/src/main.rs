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

use coact_docs::ws::{upgrade, DocsState};
use coact_docs::{DocsConfig, DocumentRegistry};

#[derive(Parser)]
#[command(name = "coact-docs", version, about = "Coordination-plane CRDT document service.")]
struct Cli {
    #[command(flatten)]
    config: DocsConfig,
}

struct HealthState {
    registry: Arc<DocumentRegistry>,
    node_id: String,
    started_at: Instant,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    documents: usize,
}

async fn health(axum::extract::State(state): axum::extract::State<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        node_id: state.node_id.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        documents: state.registry.local_document_count().await,
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

    let registry = Arc::new(DocumentRegistry::new(substrate, node_id.to_string(), config.persist_coalesce()));

    let health_state =
        Arc::new(HealthState { registry: registry.clone(), node_id: node_id.to_string(), started_at: Instant::now() });
    let docs_state = Arc::new(DocsState { registry });

    let health_router = Router::new().route("/health", get(health)).with_state(health_state);
    let docs_router =
        Router::new().route("/v1/documents/{workspace_id}/{*path}", get(upgrade)).with_state(docs_state);
    let router = health_router.merge(docs_router).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "coact-docs listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    let cancel = tokio_util::sync::CancellationToken::new();
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
