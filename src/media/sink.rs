//! Consumer contract handed to the producer
//!
//! The decode thread never touches render state directly. Everything it
//! needs from the consumer side goes through [`FrameSink`]; [`ScreenSink`]
//! is the shared half of a screen and holds only atomics and lock-free
//! queues:
//!
//! - `pending_init` / `pending_stop`: one-slot signals applied on the render tick
//! - `queue` / `pool`: frame handoff and buffer recycling
//! - `buffering` / `clock_start`: presentation state the producer reads to
//!   decide when audio may start

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam::queue::ArrayQueue;

use super::frame::{Frame, PixelBuffer, VideoInit};
use super::pool::BufferPool;
use super::queue::FrameQueue;

/// Narrow consumer contract used by the producer
///
/// All methods may be called from the decode thread and must not block.
pub trait FrameSink: Send + Sync {
    /// A session opened with the given geometry
    fn init_video(&self, init: VideoInit);

    /// A converted frame is ready
    fn push_frame(&self, frame: Frame);

    /// Media duration in ms (0 when unknown)
    fn push_duration(&self, duration_ms: i64);

    /// The producer finished; called exactly once per started session
    fn on_stop(&self);

    /// Audio started; presentation should be timed from `at`
    fn playback_clock_started(&self, _at: Instant) {}

    /// Whether the queue has room for another frame
    fn can_accept_frame(&self) -> bool {
        true
    }

    /// Take a free pixel buffer
    fn borrow_buffer(&self) -> Option<PixelBuffer> {
        None
    }

    /// Return a buffer that will not be pushed
    fn return_buffer(&self, _buf: PixelBuffer) {}

    /// Whether the consumer finished buffering
    fn is_buffer_ready(&self) -> bool {
        true
    }
}

/// Shared state between one screen's producer and its render pacer
#[derive(Debug)]
pub struct ScreenSink {
    queue: FrameQueue,
    pool: BufferPool,
    pending_init: ArrayQueue<VideoInit>,
    pending_stop: AtomicBool,
    /// Last reported duration, -1 when nothing new
    pending_duration: AtomicI64,
    buffering: AtomicBool,
    origin: Instant,
    /// Nanoseconds since `origin` plus one; 0 = unset
    clock_start: AtomicU64,
}

impl ScreenSink {
    /// Create a sink with the given watermarks and pool size
    pub fn new(low_watermark: usize, high_watermark: usize, pool_size: usize) -> Self {
        Self {
            queue: FrameQueue::new(low_watermark, high_watermark),
            pool: BufferPool::new(pool_size),
            pending_init: ArrayQueue::new(1),
            pending_stop: AtomicBool::new(false),
            pending_duration: AtomicI64::new(-1),
            buffering: AtomicBool::new(true),
            origin: Instant::now(),
            clock_start: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Take the latest init request, if any
    pub fn take_pending_init(&self) -> Option<VideoInit> {
        self.pending_init.pop()
    }

    /// Take the stop signal
    pub fn take_pending_stop(&self) -> bool {
        self.pending_stop.swap(false, Ordering::AcqRel)
    }

    /// Take a newly reported duration
    pub fn take_duration(&self) -> Option<i64> {
        let ms = self.pending_duration.swap(-1, Ordering::AcqRel);
        (ms >= 0).then_some(ms)
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::Acquire)
    }

    pub fn set_buffering(&self, buffering: bool) {
        self.buffering.store(buffering, Ordering::Release);
    }

    /// When steady presentation began, if it has
    pub fn clock_start(&self) -> Option<Instant> {
        match self.clock_start.load(Ordering::Acquire) {
            0 => None,
            n => Some(self.origin + std::time::Duration::from_nanos(n - 1)),
        }
    }

    /// Start the playback clock unless it is already running
    ///
    /// Returns the effective start.
    pub fn start_clock(&self, at: Instant) -> Instant {
        let nanos = at.saturating_duration_since(self.origin).as_nanos() as u64 + 1;
        match self
            .clock_start
            .compare_exchange(0, nanos, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => at,
            Err(existing) => self.origin + std::time::Duration::from_nanos(existing - 1),
        }
    }

    /// Unset the playback clock
    pub fn reset_clock(&self) {
        self.clock_start.store(0, Ordering::Release);
    }
}

impl FrameSink for ScreenSink {
    fn init_video(&self, init: VideoInit) {
        self.pending_init.force_push(init);
    }

    fn push_frame(&self, frame: Frame) {
        if let Err(frame) = self.queue.push(frame) {
            self.pool.give_back(frame.pixels);
        }
    }

    fn push_duration(&self, duration_ms: i64) {
        self.pending_duration
            .store(duration_ms.max(0), Ordering::Release);
    }

    fn on_stop(&self) {
        self.pending_stop.store(true, Ordering::Release);
    }

    fn playback_clock_started(&self, at: Instant) {
        self.start_clock(at);
    }

    fn can_accept_frame(&self) -> bool {
        self.queue.has_room()
    }

    fn borrow_buffer(&self) -> Option<PixelBuffer> {
        self.pool.borrow()
    }

    fn return_buffer(&self, buf: PixelBuffer) {
        self.pool.give_back(buf);
    }

    fn is_buffer_ready(&self) -> bool {
        !self.is_buffering()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn init(w: u32, h: u32) -> VideoInit {
        VideoInit {
            video_width: 1920,
            video_height: 1080,
            target_width: w,
            target_height: h,
            fps: 30.0,
        }
    }

    #[test]
    fn test_latest_init_wins() {
        let sink = ScreenSink::new(2, 4, 8);
        sink.init_video(init(256, 144));
        sink.init_video(init(512, 288));

        assert_eq!(sink.take_pending_init().unwrap().target_width, 512);
        assert!(sink.take_pending_init().is_none());
    }

    #[test]
    fn test_stop_signal_taken_once() {
        let sink = ScreenSink::new(2, 4, 8);
        assert!(!sink.take_pending_stop());
        sink.on_stop();
        assert!(sink.take_pending_stop());
        assert!(!sink.take_pending_stop());
    }

    #[test]
    fn test_full_queue_returns_buffer() {
        let sink = ScreenSink::new(1, 1, 4);
        sink.pool().reset(4);

        let a = sink.borrow_buffer().unwrap();
        let b = sink.borrow_buffer().unwrap();
        sink.push_frame(Frame::new(a, 2, 2, 0));
        assert!(!sink.can_accept_frame());

        sink.push_frame(Frame::new(b, 2, 2, 1));
        assert_eq!(sink.queue().len(), 1);
        assert_eq!(sink.pool().available(), 3);
    }

    #[test]
    fn test_clock_first_start_wins() {
        let sink = ScreenSink::new(1, 2, 4);
        assert!(sink.clock_start().is_none());

        let t0 = Instant::now();
        assert_eq!(sink.start_clock(t0), t0);
        let later = t0 + Duration::from_millis(40);
        assert_eq!(sink.start_clock(later), t0);
        assert_eq!(sink.clock_start(), Some(t0));

        sink.reset_clock();
        assert!(sink.clock_start().is_none());
    }

    #[test]
    fn test_duration_handoff() {
        let sink = ScreenSink::new(1, 2, 4);
        assert_eq!(sink.take_duration(), None);
        sink.push_duration(120_000);
        assert_eq!(sink.take_duration(), Some(120_000));
        assert_eq!(sink.take_duration(), None);
    }
}
