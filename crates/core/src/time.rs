// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

/// Current time as epoch milliseconds, used for every wire timestamp
/// (heartbeats, cache fetch times, lease bookkeeping).
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
