//! Reusable pixel buffer pool
//!
//! Decoding at 30-60 fps would otherwise allocate a full-resolution buffer
//! per frame. The pool holds a fixed number of buffers sized to the current
//! output resolution; the producer borrows one per frame and the consumer
//! hands it back after display (or drop).
//!
//! The pool must be larger than the frame queue's high watermark plus the
//! frames the consumer can hold (one lookahead, one on display), otherwise a
//! full queue could leave the producer without a free buffer forever.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use super::frame::PixelBuffer;

/// Lock-free pool of equally sized pixel buffers
#[derive(Debug)]
pub struct BufferPool {
    /// Free buffers
    free: ArrayQueue<PixelBuffer>,
    /// Length (in pixels) of buffers belonging to the current generation
    buffer_len: AtomicUsize,
    /// Buffers handed out
    borrowed: AtomicU64,
    /// Buffers handed back (including stale ones that were discarded)
    returned: AtomicU64,
}

impl BufferPool {
    /// Create an empty pool that can hold `capacity` buffers
    ///
    /// Buffers are allocated on the first [`reset`](Self::reset).
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
            buffer_len: AtomicUsize::new(0),
            borrowed: AtomicU64::new(0),
            returned: AtomicU64::new(0),
        }
    }

    /// Number of buffers the pool holds when nothing is borrowed
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Current buffer length in pixels
    pub fn buffer_len(&self) -> usize {
        self.buffer_len.load(Ordering::Acquire)
    }

    /// Reallocate every buffer for a new output size
    ///
    /// Buffers still borrowed from the previous generation are discarded when
    /// they come back.
    pub fn reset(&self, pixels: usize) {
        self.buffer_len.store(pixels, Ordering::Release);
        while self.free.pop().is_some() {}

        for _ in 0..self.free.capacity() {
            if self.free.push(vec![0u32; pixels]).is_err() {
                break;
            }
        }

        tracing::debug!(
            buffers = self.free.len(),
            pixels = pixels,
            "Buffer pool reallocated"
        );
    }

    /// Take a free buffer, or `None` if all are in flight
    pub fn borrow(&self) -> Option<PixelBuffer> {
        let buf = self.free.pop()?;
        self.borrowed.fetch_add(1, Ordering::Relaxed);
        Some(buf)
    }

    /// Hand a buffer back
    ///
    /// Buffers from an older generation (different length) are dropped
    /// instead of re-entering the pool.
    pub fn give_back(&self, buf: PixelBuffer) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        if buf.len() != self.buffer_len() {
            return;
        }
        // Full only if more buffers came back than were issued this generation
        let _ = self.free.push(buf);
    }

    /// Number of free buffers
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Buffers borrowed and not yet handed back
    pub fn in_flight(&self) -> u64 {
        self.borrowed
            .load(Ordering::Relaxed)
            .saturating_sub(self.returned.load(Ordering::Relaxed))
    }

    /// Total borrows since creation
    pub fn borrowed(&self) -> u64 {
        self.borrowed.load(Ordering::Relaxed)
    }

    /// Total give-backs since creation
    pub fn returned(&self) -> u64 {
        self.returned.load(Ordering::Relaxed)
    }
}
