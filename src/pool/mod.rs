//! Buffer pools for packet payloads
//!
//! The protocol codec needs one payload buffer per incoming frame. Allocating
//! each of those from the global allocator is the main source of allocation
//! pressure on the publish path, so payloads are carved out of a pool instead.
//!
//! Two strategies are provided:
//!
//! - [`RecyclingPool`]: fixed-capacity slabs kept on a lock-free free list.
//!   Payloads that outlive the current call are copied out before the slab is
//!   recycled.
//! - [`BumpPool`]: a cursor into a backing arena. Each request splits exactly
//!   `size` bytes off the front; when the arena runs dry a fresh one replaces
//!   it and the old one is reclaimed once its last split is dropped.
//!
//! Requests larger than the configured maximum are never an error. They fall
//! back to a plain allocation of exactly the requested size.

pub mod bump;
pub mod recycle;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Deserialize;

pub use bump::BumpPool;
pub use recycle::RecyclingPool;

/// Default maximum pooled request size (500 KiB)
pub const DEFAULT_MAX_POOLED_SIZE: usize = 500 * 1024;

/// Default number of slabs retained by a [`RecyclingPool`]
pub const DEFAULT_SLAB_COUNT: usize = 8;

/// Source of payload buffers
///
/// Implementations must be safe to share between tasks. Every buffer returned
/// by [`acquire`](BufferPool::acquire) is uniquely owned and never aliases
/// another live buffer.
pub trait BufferPool: Send + Sync {
    /// Get a zeroed buffer of exactly `size` bytes
    fn acquire(&self, size: usize) -> BytesMut;

    /// Hand capacity back for reuse
    fn release(&self, buf: BytesMut) {
        drop(buf);
    }

    /// Convert an acquired buffer into a payload that may be retained
    /// past the current call.
    fn freeze(&self, buf: BytesMut) -> Bytes {
        buf.freeze()
    }
}

/// Allocation strategy for a stream's buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStrategy {
    /// Size-classed slab recycling
    Recycling,
    /// Bump allocation with epoch reset
    Bump,
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Allocation strategy
    pub strategy: PoolStrategy,

    /// Largest request served from the pool; also the slab/arena size
    pub max_pooled_size: usize,

    /// Number of slabs kept on the free list (recycling strategy only)
    pub slab_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            strategy: PoolStrategy::Bump,
            max_pooled_size: DEFAULT_MAX_POOLED_SIZE,
            slab_count: DEFAULT_SLAB_COUNT,
        }
    }
}

impl PoolConfig {
    /// Set the allocation strategy
    pub fn strategy(mut self, strategy: PoolStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the maximum pooled request size
    pub fn max_pooled_size(mut self, size: usize) -> Self {
        self.max_pooled_size = size;
        self
    }

    /// Build a pool for one stream
    pub fn build(&self) -> Arc<dyn BufferPool> {
        match self.strategy {
            PoolStrategy::Recycling => Arc::new(RecyclingPool::new(
                self.max_pooled_size,
                self.slab_count.max(1),
            )),
            PoolStrategy::Bump => Arc::new(BumpPool::new(self.max_pooled_size)),
        }
    }
}
