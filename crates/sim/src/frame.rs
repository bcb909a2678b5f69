// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Coact Contributors

//! Rendered frames and the bounded ring each session keeps for late
//! subscribers. Frames are never archived (spec §3): the ring only covers
//! the window a fresh subscriber needs to catch up within one tick.

use std::collections::VecDeque;

use serde::Serialize;

/// A single rendered frame. `image_bytes` is never empty — a driver that
/// renders a zero-byte image is treated as "no frame produced" and dropped
/// before reaching here (spec §8 boundary: "Frame with image size 0 is
/// never emitted").
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub session_id: String,
    pub frame_index: u64,
    pub sim_time: f64,
    pub produced_at: u64,
    pub image_bytes: bytes::Bytes,
}

impl Frame {
    /// Wire encoding for `WS /simulations/{id}/stream`: a short magic header
    /// followed by the index, sim time, and raw image bytes. Kept compact
    /// and binary since frames are high-frequency and bandwidth-sensitive.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 8 + 8 + self.image_bytes.len());
        out.extend_from_slice(b"F1");
        out.extend_from_slice(&self.frame_index.to_be_bytes());
        out.extend_from_slice(&self.sim_time.to_be_bytes());
        out.extend_from_slice(&self.image_bytes);
        out
    }
}

/// Fixed-capacity ring of recently produced frames, newest at the back.
/// Used only to let a fresh local subscriber see the last few frames while
/// its substrate subscription catches up; the channel itself carries no
/// history (spec §4.1: pub/sub has "no replay").
pub struct FrameRing {
    capacity: usize,
    buf: VecDeque<Frame>,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), buf: VecDeque::with_capacity(capacity.max(1)) }
    }

    pub fn push(&mut self, frame: Frame) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(frame);
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.buf.back()
    }

    pub fn since(&self, from_frame: u64) -> impl Iterator<Item = &Frame> {
        self.buf.iter().filter(move |f| f.frame_index >= from_frame)
    }
}
