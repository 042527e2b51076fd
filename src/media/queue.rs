//! Bounded frame queue between the decode thread and the render tick
//!
//! ```text
//!   producer ──push──► [ SegQueue<Frame> ] ──pop──► render pacer
//!                        len: AtomicUsize
//!
//!   len <  low   consumer keeps buffering, nothing shown
//!   len >= high  producer stops enqueuing, buffers go back to the pool
//! ```
//!
//! The element count lives in a side-channel atomic so both threads can
//! check the size without touching the queue itself.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

use super::frame::Frame;
use super::pool::BufferPool;

/// Lock-free FIFO of decoded frames with two watermarks
#[derive(Debug)]
pub struct FrameQueue {
    frames: SegQueue<Frame>,
    len: AtomicUsize,
    low_watermark: usize,
    high_watermark: usize,
}

impl FrameQueue {
    /// Create a queue with the given buffering threshold and backpressure ceiling
    pub fn new(low_watermark: usize, high_watermark: usize) -> Self {
        let high_watermark = high_watermark.max(1);
        Self {
            frames: SegQueue::new(),
            len: AtomicUsize::new(0),
            low_watermark: low_watermark.min(high_watermark),
            high_watermark,
        }
    }

    /// Frames required before presentation starts
    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    /// Frames at which the producer must stop enqueuing
    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    /// Current number of queued frames
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether another frame may be enqueued
    pub fn has_room(&self) -> bool {
        self.len() < self.high_watermark
    }

    /// Enqueue a frame
    ///
    /// Returns the frame back when the queue is at its high watermark so the
    /// caller can hand its buffer back to the pool.
    pub fn push(&self, frame: Frame) -> Result<(), Frame> {
        if !self.has_room() {
            return Err(frame);
        }
        self.frames.push(frame);
        self.len.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Dequeue the oldest frame
    pub fn pop(&self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(frame)
    }

    /// Drop every queued frame, handing buffers back to `pool`
    ///
    /// Returns the number of frames removed.
    pub fn drain_into(&self, pool: &BufferPool) -> usize {
        let mut removed = 0;
        while let Some(frame) = self.pop() {
            pool.give_back(frame.pixels);
            removed += 1;
        }
        removed
    }
}
