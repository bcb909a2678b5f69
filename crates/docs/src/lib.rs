// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! CRDT Document Service (C4): hosts collaborative editor documents,
//! persists encoded state, and relays awareness across nodes (spec §4.4).

pub mod config;
pub mod document;
pub mod messages;
pub mod registry;
pub mod ws;

pub use config::DocsConfig;
pub use registry::DocumentRegistry;
