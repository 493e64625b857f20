//! Recycled pixel buffers for software decode.
//!
//! A 1080p ARGB frame is 8MB. Allocating one per packet at 60 fps churns the
//! allocator, so the software decoder takes its output buffers from a
//! [`PixelPool`] and every [`PixelBuffer`] returns itself to that pool when
//! dropped: after presentation, on cache eviction, or when the frame is
//! skipped.
//!
//! The pool never blocks and never runs dry. An empty pool allocates, and a
//! full pool lets returned buffers go.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::metrics::Counter;

/// Buffers prefilled per layout; never more than half the pool
const PREFILL: usize = 3;

#[derive(Debug, Default)]
struct Shared {
    free: Mutex<VecDeque<Vec<u32>>>,
    max_size: usize,
    allocated: Counter,
    reused: Counter,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u32>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, mut pixels: Vec<u32>) {
        let mut free = self.lock();
        if free.len() < self.max_size {
            pixels.clear();
            free.push_back(pixels);
        }
    }
}

/// Bounded free list of pixel vectors
#[derive(Debug, Clone)]
pub struct PixelPool {
    shared: Arc<Shared>,
}

impl PixelPool {
    /// Pool that keeps at most `max_size` idle buffers
    pub fn new(max_size: usize) -> Self {
        Self { shared: Arc::new(Shared { max_size, ..Default::default() }) }
    }

    /// Take an empty buffer with room for `pixels` words
    pub fn take(&self, pixels: usize) -> PixelBuffer {
        let recycled = self.shared.lock().pop_front();
        let mut buffer = match recycled {
            Some(buffer) => {
                self.shared.reused.inc();
                buffer
            }
            None => {
                self.shared.allocated.inc();
                Vec::with_capacity(pixels)
            }
        };
        buffer.reserve(pixels);
        PixelBuffer { pixels: buffer, home: Arc::downgrade(&self.shared) }
    }

    /// Drop every idle buffer and allocate a few sized for `pixels` words
    pub fn prefill(&self, pixels: usize) {
        let count = (self.shared.max_size / 2).min(PREFILL);
        let mut free = self.shared.lock();
        free.clear();
        for _ in 0..count {
            free.push_back(Vec::with_capacity(pixels));
        }
    }

    /// Drop every idle buffer
    pub fn clear(&self) {
        self.shared.lock().clear();
    }

    /// Idle buffers ready to be taken
    pub fn idle(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }

    /// Buffers handed out by allocating
    pub fn allocations(&self) -> u64 {
        self.shared.allocated.get()
    }

    /// Buffers handed out from the free list
    pub fn reuses(&self) -> u64 {
        self.shared.reused.get()
    }
}

/// Packed ARGB pixels that return to their pool on drop
///
/// Buffers built from a plain `Vec` have no pool and are simply freed.
pub struct PixelBuffer {
    pixels: Vec<u32>,
    home: Weak<Shared>,
}

impl PixelBuffer {
    /// Mutable access to the backing vector, for conversions that extend it
    pub fn as_mut_vec(&mut self) -> &mut Vec<u32> {
        &mut self.pixels
    }

    /// True when dropping this buffer recycles it
    pub fn is_pooled(&self) -> bool {
        self.home.strong_count() > 0
    }
}

impl From<Vec<u32>> for PixelBuffer {
    fn from(pixels: Vec<u32>) -> Self {
        Self { pixels, home: Weak::new() }
    }
}

impl Deref for PixelBuffer {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.pixels
    }
}

impl DerefMut for PixelBuffer {
    fn deref_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let Some(shared) = self.home.upgrade() {
            shared.put(std::mem::take(&mut self.pixels));
        }
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("len", &self.pixels.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_buffer_is_reused() {
        let pool = PixelPool::new(4);
        let mut first = pool.take(16);
        first.as_mut_vec().extend([1, 2, 3]);
        let address = first.as_ptr();
        drop(first);
        assert_eq!(pool.idle(), 1);

        let second = pool.take(16);
        assert!(second.is_empty(), "recycled buffers come back cleared");
        assert_eq!(second.as_ptr(), address);
        assert_eq!(pool.allocations(), 1);
        assert_eq!(pool.reuses(), 1);
    }

    #[test]
    fn full_pool_frees_returned_buffers() {
        let pool = PixelPool::new(2);
        let buffers: Vec<_> = (0..5).map(|_| pool.take(8)).collect();
        assert_eq!(pool.allocations(), 5);

        drop(buffers);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn prefill_is_capped_at_half_the_pool() {
        let pool = PixelPool::new(4);
        pool.prefill(32);
        assert_eq!(pool.idle(), 2);

        let big = PixelPool::new(16);
        big.prefill(32);
        assert_eq!(big.idle(), 3);
        let buffer = big.take(32);
        assert!(buffer.is_empty());
        assert_eq!(big.allocations(), 0);
        assert_eq!(big.reuses(), 1);
    }

    #[test]
    fn buffers_outliving_their_pool_are_freed() {
        let pool = PixelPool::new(2);
        let buffer = pool.take(8);
        assert!(buffer.is_pooled());
        drop(pool);
        assert!(!buffer.is_pooled());
        drop(buffer);

        let detached = PixelBuffer::from(vec![0xFF00_0000; 4]);
        assert!(!detached.is_pooled());
        assert_eq!(&detached[..], &[0xFF00_0000; 4]);
    }
}
