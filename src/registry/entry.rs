//! Stream entry and state types
//!
//! This module defines the per-stream state stored in the registry. Every
//! field is guarded by the stream's own mutex, so publish, dispatch, attach
//! and teardown of one stream are serialized while other streams proceed
//! independently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::media::{Packet, PacketCache};
use crate::pool::BufferPool;
use crate::sink::{SinkError, SinkHandle, SinkId};

use super::config::RegistryConfig;
use super::key::StreamKey;

/// Lifecycle phase of a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Stream has an active publisher
    Publishing,
    /// Publisher gone; the entry is being torn down
    Unpublished,
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    /// Identity shared with every packet dispatched on this stream
    pub(crate) key: Arc<StreamKey>,

    /// Current phase
    pub(crate) phase: StreamPhase,

    /// Session ID of the publisher holding the stream
    pub(crate) publisher_id: u64,

    /// Metadata, sequence headers and GOPs for late joiners
    pub(crate) cache: PacketCache,

    /// Attached sinks
    sinks: BTreeMap<SinkId, SinkHandle>,

    /// Payload pool for this stream's publisher
    pub(crate) pool: Arc<dyn BufferPool>,

    packets_dispatched: u64,
    bytes_dispatched: u64,
    sinks_dropped: u64,

    /// When the stream was published
    created_at: Instant,
}

impl StreamEntry {
    /// Create an entry for a newly published stream
    pub(crate) fn new(key: StreamKey, publisher_id: u64, config: &RegistryConfig) -> Self {
        Self {
            key: Arc::new(key),
            phase: StreamPhase::Publishing,
            publisher_id,
            cache: PacketCache::new(config.gop_num, config.max_gop_bytes),
            sinks: BTreeMap::new(),
            pool: config.pool.build(),
            packets_dispatched: 0,
            bytes_dispatched: 0,
            sinks_dropped: 0,
            created_at: Instant::now(),
        }
    }

    /// Check if the stream has an active publisher
    pub fn is_publishing(&self) -> bool {
        self.phase == StreamPhase::Publishing
    }

    /// Get the number of attached sinks
    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }

    pub(crate) fn insert_sink(&mut self, id: SinkId, handle: SinkHandle) {
        self.sinks.insert(id, handle);
    }

    pub(crate) fn remove_sink(&mut self, id: SinkId) -> Option<SinkHandle> {
        self.sinks.remove(&id)
    }

    pub(crate) fn record_sink_dropped(&mut self) {
        self.sinks_dropped += 1;
    }

    /// Cache the packet and queue it on every sink
    ///
    /// Sinks whose queue is full or whose worker has exited are removed and
    /// returned with the reason.
    pub(crate) fn fan_out(
        &mut self,
        mut packet: Packet,
    ) -> (usize, Vec<(SinkId, SinkHandle, SinkError)>) {
        packet.stream = Some(Arc::clone(&self.key));
        self.packets_dispatched += 1;
        self.bytes_dispatched += packet.size() as u64;

        self.cache.write(packet.clone());

        let mut failed = Vec::new();
        for (&id, handle) in &self.sinks {
            if let Err(e) = handle.try_send(packet.clone()) {
                failed.push((id, e));
            }
        }

        let delivered = self.sinks.len() - failed.len();
        let dropped = failed
            .into_iter()
            .filter_map(|(id, e)| self.sinks.remove(&id).map(|handle| (id, handle, e)))
            .collect::<Vec<_>>();
        self.sinks_dropped += dropped.len() as u64;

        (delivered, dropped)
    }

    /// Move the entry to `Unpublished`, stop every sink worker and clear the
    /// caches. Workers are signalled first so none starts a write after the
    /// caches are gone; the caller awaits the returned tasks outside the lock.
    pub(crate) fn teardown(&mut self) -> Vec<(SinkId, JoinHandle<()>)> {
        self.phase = StreamPhase::Unpublished;
        let tasks = std::mem::take(&mut self.sinks)
            .into_iter()
            .map(|(id, handle)| (id, handle.shutdown()))
            .collect();
        self.cache.clear();
        tasks
    }

    /// Snapshot of the stream's counters
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            subscriber_count: self.subscriber_count(),
            publisher_id: self.publisher_id,
            phase: self.phase,
            gop_count: self.cache.gop().gop_count(),
            gop_packet_count: self.cache.gop().packet_count(),
            gop_size_bytes: self.cache.gop().size(),
            packets_dispatched: self.packets_dispatched,
            bytes_dispatched: self.bytes_dispatched,
            sinks_dropped: self.sinks_dropped,
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of attached sinks
    pub subscriber_count: usize,
    /// Session ID of the publisher
    pub publisher_id: u64,
    /// Current phase
    pub phase: StreamPhase,
    /// Number of GOPs cached
    pub gop_count: usize,
    /// Number of packets in the GOP cache
    pub gop_packet_count: usize,
    /// Size of the GOP cache in bytes
    pub gop_size_bytes: usize,
    /// Packets dispatched since publish
    pub packets_dispatched: u64,
    /// Payload bytes dispatched since publish
    pub bytes_dispatched: u64,
    /// Sinks detached because they failed or fell behind
    pub sinks_dropped: u64,
    /// Time since publish
    pub uptime: Duration,
}
