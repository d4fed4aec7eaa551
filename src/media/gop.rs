//! GOP (Group of Pictures) cache for late-joiner support
//!
//! When a new subscriber attaches to a running stream it must start decoding
//! at a keyframe. The cache keeps the most recent GOPs, each beginning with a
//! keyframe and followed by every packet up to the next keyframe.
//!
//! Retention is bounded by GOP count rather than bytes so the first retained
//! packet is always a keyframe. An optional byte ceiling guards against
//! streams with huge or endless GOPs, but it only ever evicts whole GOPs.

use std::collections::VecDeque;

use crate::sink::{PacketSink, SinkError};

use super::packet::Packet;

/// One keyframe and the packets that follow it
#[derive(Debug, Clone)]
struct Gop {
    packets: Vec<Packet>,
    size: usize,
}

impl Gop {
    fn start(keyframe: Packet) -> Self {
        let size = keyframe.size();
        Self {
            packets: vec![keyframe],
            size,
        }
    }

    fn push(&mut self, packet: Packet) {
        self.size += packet.size();
        self.packets.push(packet);
    }
}

/// Cache of the most recent GOPs
#[derive(Debug, Clone)]
pub struct GopCache {
    /// Retained GOPs, oldest first
    gops: VecDeque<Gop>,
    /// Maximum number of retained GOPs
    max_gops: usize,
    /// Maximum total payload size in bytes
    max_bytes: usize,
    /// Current total payload size in bytes
    size: usize,
}

impl GopCache {
    /// Create a cache retaining at most `max_gops` GOPs, with no byte ceiling
    pub fn new(max_gops: usize) -> Self {
        Self::with_limits(max_gops, usize::MAX)
    }

    /// Create a cache with both a GOP count and a byte ceiling
    pub fn with_limits(max_gops: usize, max_bytes: usize) -> Self {
        Self {
            gops: VecDeque::with_capacity(max_gops.max(1) + 1),
            max_gops: max_gops.max(1),
            max_bytes,
            size: 0,
        }
    }

    /// Add a packet
    ///
    /// A keyframe starts a new GOP and evicts the oldest one once more than
    /// `max_gops` are retained. Other packets join the newest GOP, or are
    /// dropped if no keyframe has been seen yet.
    pub fn write(&mut self, packet: Packet) {
        if packet.is_keyframe {
            self.size += packet.size();
            self.gops.push_back(Gop::start(packet));
            while self.gops.len() > self.max_gops {
                self.evict_oldest();
            }
        } else {
            match self.gops.back_mut() {
                Some(gop) => {
                    self.size += packet.size();
                    gop.push(packet);
                }
                None => return,
            }
        }

        self.enforce_byte_limit();
    }

    /// Replay every retained packet to `sink`, oldest first
    ///
    /// Stops at the first error; the sink should then be dropped.
    pub async fn send_to<S: PacketSink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        for packet in self.gops.iter().flat_map(|gop| gop.packets.iter()) {
            sink.write(packet.clone()).await?;
        }
        Ok(())
    }

    /// Drop all retained packets
    pub fn clear(&mut self) {
        self.gops.clear();
        self.size = 0;
    }

    /// Number of retained GOPs
    pub fn gop_count(&self) -> usize {
        self.gops.len()
    }

    /// Number of retained packets
    pub fn packet_count(&self) -> usize {
        self.gops.iter().map(|gop| gop.packets.len()).sum()
    }

    /// Total retained payload size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.gops.is_empty()
    }

    /// Timestamps of the first and last retained packets
    pub fn timestamp_range(&self) -> Option<(u32, u32)> {
        let first = self.gops.front()?.packets.first()?.timestamp;
        let last = self.gops.back()?.packets.last()?.timestamp;
        Some((first, last))
    }

    /// Duration covered by the cache in milliseconds
    pub fn duration(&self) -> Option<u32> {
        self.timestamp_range()
            .map(|(first, last)| last.saturating_sub(first))
    }

    fn evict_oldest(&mut self) {
        if let Some(old) = self.gops.pop_front() {
            self.size -= old.size;
        }
    }

    fn enforce_byte_limit(&mut self) {
        while self.size > self.max_bytes && self.gops.len() > 1 {
            self.evict_oldest();
        }

        // A single GOP over the ceiling cannot be trimmed without losing its
        // keyframe; drop it and wait for the next one.
        if self.size > self.max_bytes {
            tracing::debug!(
                size = self.size,
                max_bytes = self.max_bytes,
                "GOP exceeds cache ceiling, discarding until next keyframe"
            );
            self.clear();
        }
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new(1)
    }
}
