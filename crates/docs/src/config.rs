// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

#[derive(Debug, Clone, clap::Args)]
pub struct DocsConfig {
    #[command(flatten)]
    pub substrate: coact_substrate::SubstrateConfig,

    #[arg(long, default_value = "0.0.0.0", env = "COACT_DOCS_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8103, env = "COACT_DOCS_PORT")]
    pub port: u16,

    /// Write-behind coalescing interval for persisting encoded document state.
    #[arg(long, default_value_t = 50, env = "COACT_DOCS_PERSIST_COALESCE_MS")]
    pub persist_coalesce_ms: u64,
}

impl DocsConfig {
    pub fn persist_coalesce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persist_coalesce_ms)
    }
}
