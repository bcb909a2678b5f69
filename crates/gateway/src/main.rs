// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use std::sync::Arc;

use clap::Parser;
use tracing::error;

use coact_gateway::{http, GatewayConfig, GatewayState};

#[derive(Parser)]
#[command(name = "coact-gateway", version, about = "Coordination-plane edge gateway.")]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,
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

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(GatewayState::new(substrate, config, node_id.to_string()));
    let router = http::router(state);

    tracing::info!(%addr, "coact-gateway listening");

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
