// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

#[derive(Debug, Clone, clap::Args)]
pub struct SignalConfig {
    #[command(flatten)]
    pub substrate: coact_substrate::SubstrateConfig,

    #[arg(long, default_value = "0.0.0.0", env = "COACT_SIGNAL_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8102, env = "COACT_SIGNAL_PORT")]
    pub port: u16,

    /// Heartbeat timeout after which a client with no activity is dropped.
    #[arg(long, default_value_t = 30_000, env = "COACT_SIGNAL_HEARTBEAT_TIMEOUT_MS")]
    pub heartbeat_timeout_ms: u64,
}

impl SignalConfig {
    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_timeout_ms)
    }
}
