// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

/// Configuration for the simulation service binary.
#[derive(Debug, Clone, clap::Args)]
pub struct SimConfig {
    #[command(flatten)]
    pub substrate: coact_substrate::SubstrateConfig,

    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "COACT_SIM_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8101, env = "COACT_SIM_PORT")]
    pub port: u16,

    /// Per-subscriber outbound frame queue depth before the oldest frame is dropped.
    #[arg(long, default_value_t = 4, env = "FRAME_BACKPRESSURE")]
    pub frame_backpressure: usize,

    /// Wall-clock cap on a single `execute` call.
    #[arg(long, default_value_t = 60_000, env = "EXEC_WALL_CLOCK_MS")]
    pub exec_wall_clock_ms: u64,
}

impl SimConfig {
    pub fn exec_wall_clock(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.exec_wall_clock_ms)
    }
}
