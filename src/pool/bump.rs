//! Bump allocation with epoch reset
//!
//! ```text
//!   arena (capacity N)
//!   ┌──────┬──────┬────────┬───────────────────┐
//!   │ buf0 │ buf1 │  buf2  │     remaining     │
//!   └──────┴──────┴────────┴───────────────────┘
//!                           ▲ cursor
//! ```
//!
//! Each acquire splits exactly `size` bytes off the front of the remaining
//! region. The splits are disjoint `BytesMut` views of one allocation, so no
//! two callers ever see the same bytes. When the remaining region is too
//! small a new arena replaces it; the old allocation is freed once every
//! buffer carved from it has been dropped.

use bytes::BytesMut;
use parking_lot::Mutex;

use super::BufferPool;

/// Bump allocator over a shared arena
pub struct BumpPool {
    arena: Mutex<BytesMut>,
    arena_size: usize,
}

impl BumpPool {
    /// Create a pool whose arenas hold `arena_size` bytes
    ///
    /// `arena_size` is also the largest request served from the pool.
    pub fn new(arena_size: usize) -> Self {
        Self {
            arena: Mutex::new(BytesMut::new()),
            arena_size,
        }
    }

    /// Size of each arena
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    /// Bytes left in the current arena
    pub fn remaining(&self) -> usize {
        self.arena.lock().len()
    }
}

impl BufferPool for BumpPool {
    fn acquire(&self, size: usize) -> BytesMut {
        if size > self.arena_size {
            return BytesMut::zeroed(size);
        }

        let mut arena = self.arena.lock();
        if arena.len() < size {
            *arena = BytesMut::zeroed(self.arena_size);
        }
        arena.split_to(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_overlap(a: &BytesMut, b: &BytesMut) -> bool {
        let (a0, a1) = (a.as_ptr() as usize, a.as_ptr() as usize + a.len());
        let (b0, b1) = (b.as_ptr() as usize, b.as_ptr() as usize + b.len());
        a0 < b1 && b0 < a1
    }

    #[test]
    fn test_acquire_advances_cursor() {
        let pool = BumpPool::new(1000);

        let a = pool.acquire(100);
        assert_eq!(a.len(), 100);
        assert_eq!(pool.remaining(), 900);

        let b = pool.acquire(300);
        assert_eq!(b.len(), 300);
        assert_eq!(pool.remaining(), 600);
        assert!(!ranges_overlap(&a, &b));
    }

    #[test]
    fn test_epoch_reset_when_exhausted() {
        let pool = BumpPool::new(1000);

        let _a = pool.acquire(800);
        let b = pool.acquire(300);

        assert_eq!(b.len(), 300);
        assert_eq!(pool.remaining(), 700);
    }

    #[test]
    fn test_oversized_is_direct_allocation() {
        let pool = BumpPool::new(100);

        let _warm = pool.acquire(10);
        let big = pool.acquire(1000);

        assert_eq!(big.len(), 1000);
        // The arena is untouched
        assert_eq!(pool.remaining(), 90);
    }

    #[test]
    fn test_writes_do_not_leak_between_buffers() {
        let pool = BumpPool::new(64);

        let mut a = pool.acquire(8);
        let b = pool.acquire(8);
        a.copy_from_slice(&[0xFF; 8]);

        assert!(b.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_frozen_buffer_survives_reset() {
        let pool = BumpPool::new(16);

        let mut a = pool.acquire(16);
        a.copy_from_slice(&[7u8; 16]);
        let payload = pool.freeze(a);

        let _next = pool.acquire(16);
        assert!(payload.iter().all(|&x| x == 7));
    }

    #[test]
    fn test_concurrent_acquire() {
        use std::sync::Arc;

        let pool = Arc::new(BumpPool::new(4096));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| {
                            let mut buf = pool.acquire(32);
                            buf.fill(i as u8 + 1);
                            buf
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            for buf in handle.join().unwrap() {
                assert_eq!(buf.len(), 32);
                assert!(buf.iter().all(|&x| x == i as u8 + 1));
            }
        }
    }
}
