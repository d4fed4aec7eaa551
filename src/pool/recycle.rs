//! Size-classed slab recycling
//!
//! Every pooled request is served from a slab of `slab_size` bytes taken from
//! a lock-free free list. Slabs come back through [`BufferPool::release`] or
//! [`BufferPool::freeze`], the latter copying the used bytes out first so the
//! slab can be reused while the payload lives on.

use bytes::{Bytes, BytesMut};
use crossbeam_queue::ArrayQueue;

use super::BufferPool;

/// Fixed-capacity slab recycler
pub struct RecyclingPool {
    free: ArrayQueue<BytesMut>,
    slab_size: usize,
}

impl RecyclingPool {
    /// Create a pool of `slab_count` slabs of `slab_size` bytes each
    ///
    /// Slabs are allocated lazily on first use.
    pub fn new(slab_size: usize, slab_count: usize) -> Self {
        Self {
            free: ArrayQueue::new(slab_count.max(1)),
            slab_size,
        }
    }

    /// Size of each slab (and the largest pooled request)
    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    /// Number of slabs currently waiting on the free list
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl BufferPool for RecyclingPool {
    fn acquire(&self, size: usize) -> BytesMut {
        if size > self.slab_size {
            return BytesMut::zeroed(size);
        }

        let mut buf = self
            .free
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.slab_size));
        buf.clear();
        buf.resize(size, 0);
        buf
    }

    fn release(&self, mut buf: BytesMut) {
        // Oversized and split buffers are not slabs.
        if buf.capacity() != self.slab_size {
            return;
        }
        buf.clear();
        // A full free list just lets the slab go.
        let _ = self.free.push(buf);
    }

    fn freeze(&self, buf: BytesMut) -> Bytes {
        if buf.capacity() != self.slab_size {
            return buf.freeze();
        }
        let payload = Bytes::copy_from_slice(&buf);
        self.release(buf);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_exact_length() {
        let pool = RecyclingPool::new(1024, 4);

        assert_eq!(pool.acquire(0).len(), 0);
        assert_eq!(pool.acquire(1).len(), 1);
        assert_eq!(pool.acquire(1024).len(), 1024);
    }

    #[test]
    fn test_oversized_bypasses_pool() {
        let pool = RecyclingPool::new(1024, 4);

        let buf = pool.acquire(4096);
        assert_eq!(buf.len(), 4096);

        pool.release(buf);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_release_recycles_slab() {
        let pool = RecyclingPool::new(1024, 4);

        let buf = pool.acquire(100);
        assert_eq!(buf.capacity(), 1024);
        pool.release(buf);
        assert_eq!(pool.available(), 1);

        let again = pool.acquire(200);
        assert_eq!(again.len(), 200);
        assert!(again.iter().all(|&b| b == 0));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_freeze_copies_and_recycles() {
        let pool = RecyclingPool::new(64, 2);

        let mut buf = pool.acquire(4);
        buf.copy_from_slice(b"abcd");
        let slab_ptr = buf.as_ptr();

        let payload = pool.freeze(buf);
        assert_eq!(&payload[..], b"abcd");
        assert_ne!(payload.as_ptr(), slab_ptr);
        assert_eq!(pool.available(), 1);

        // Reusing the slab must not disturb the frozen payload
        let mut reused = pool.acquire(4);
        reused.copy_from_slice(b"wxyz");
        assert_eq!(&payload[..], b"abcd");
    }

    #[test]
    fn test_free_list_is_bounded() {
        let pool = RecyclingPool::new(64, 2);

        let bufs: Vec<_> = (0..4).map(|_| pool.acquire(10)).collect();
        for buf in bufs {
            pool.release(buf);
        }

        assert_eq!(pool.available(), 2);
    }
}
