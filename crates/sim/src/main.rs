// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::error;

use coact_sim::http::{router, AppState};
use coact_sim::manager::SimulationManager;
use coact_sim::SimConfig;

#[derive(Parser)]
#[command(name = "coact-sim", version, about = "Coordination-plane simulation service.")]
struct Cli {
    #[command(flatten)]
    config: SimConfig,
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

    let driver: Arc<dyn coact_sim::driver::EngineDriver> = Arc::new(coact_sim::driver::NullDriver::new());
    let manager = Arc::new(SimulationManager::new(
        substrate,
        driver,
        node_id.to_string(),
        config.substrate.lease_ttl(),
        config.exec_wall_clock(),
        config.frame_backpressure,
    ));

    let state = Arc::new(AppState { manager, node_id: node_id.to_string(), started_at: Instant::now() });
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "coact-sim listening");

    let router = router(state);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = tokio_util::sync::CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}
