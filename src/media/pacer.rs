//! Render-side frame pacing
//!
//! The pacer runs once per host render tick and decides what should be
//! visible right now. It never blocks: everything it reads from the decode
//! thread comes through the [`ScreenSink`] atomics and lock-free queues.
//!
//! ```text
//!   buffering ──(queued >= low watermark)──► clock starts at `now`
//!
//!   each tick:  elapsed = now - clock
//!               pop every frame with ts <= elapsed, keep only the newest
//!               upload it, give every popped buffer back to the pool
//! ```
//!
//! `SegQueue` has no peek, so the first frame that is not yet due is kept in
//! a one-slot lookahead until a later tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::frame::Frame;
use super::sink::ScreenSink;
use crate::stats::{PacerStats, REPORT_INTERVAL};

/// Presentation target for one screen
pub trait Surface {
    /// Prepare for frames of a new size
    fn reinit(&mut self, width: u32, height: u32);

    /// Copy a frame's pixels
    fn upload(&mut self, width: u32, height: u32, pixels: &[u32]);

    /// Playback stopped
    fn clear(&mut self) {}
}

/// Result of one pacer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session has announced its geometry yet
    Idle,
    /// Waiting for the low watermark
    Buffering { queued: usize },
    /// Nothing new is due; the previous frame stays visible
    Holding,
    /// A frame was uploaded
    Displayed { timestamp_us: i64, skipped: u32 },
    /// The producer finished; the pacer is back to idle
    Stopped,
}

/// Consumer half of a screen
#[derive(Debug, Default)]
pub struct RenderPacer {
    sink: Option<Arc<ScreenSink>>,
    size: Option<(u32, u32)>,
    fps: f64,
    lookahead: Option<Frame>,
    last_shown_us: Option<i64>,
    stats: PacerStats,
    last_report: Option<Instant>,
}

impl RenderPacer {
    /// Create a pacer with no session attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pacer reading from `sink`
    pub fn with_sink(sink: Arc<ScreenSink>) -> Self {
        let mut pacer = Self::new();
        pacer.attach(sink);
        pacer
    }

    /// Switch to a new session's sink
    ///
    /// Frames still held from the previous session go back to its pool.
    pub fn attach(&mut self, sink: Arc<ScreenSink>) {
        self.detach();
        self.sink = Some(sink);
    }

    /// Drop the current session's sink
    pub fn detach(&mut self) {
        self.reset();
        self.sink = None;
        self.size = None;
    }

    pub fn sink(&self) -> Option<&Arc<ScreenSink>> {
        self.sink.as_ref()
    }

    pub fn stats(&self) -> &PacerStats {
        &self.stats
    }

    /// Output size of the current session
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frames waiting for display, including the lookahead
    pub fn queued(&self) -> usize {
        let queued = self.sink.as_ref().map_or(0, |s| s.queue().len());
        queued + usize::from(self.lookahead.is_some())
    }

    /// Timestamp of the last displayed frame
    pub fn last_shown_us(&self) -> Option<i64> {
        self.last_shown_us
    }

    /// Re-enter buffering
    ///
    /// Clears the queue, hands every held buffer back and unsets the
    /// playback clock.
    pub fn reset(&mut self) {
        if let Some(sink) = &self.sink {
            if let Some(frame) = self.lookahead.take() {
                sink.pool().give_back(frame.pixels);
            }
            sink.queue().drain_into(sink.pool());
            sink.set_buffering(true);
            sink.reset_clock();
        }
        self.lookahead = None;
        self.last_shown_us = None;
    }

    /// Run one render tick
    pub fn tick<S: Surface + ?Sized>(&mut self, now: Instant, surface: &mut S) -> TickOutcome {
        let Some(sink) = self.sink.clone() else {
            return TickOutcome::Idle;
        };

        if sink.take_pending_stop() {
            // An init left over from the finished session is stale
            let _ = sink.take_pending_init();
            self.reset();
            self.size = None;
            surface.clear();
            return TickOutcome::Stopped;
        }

        if let Some(init) = sink.take_pending_init() {
            self.reset();
            sink.pool().reset(init.pixels());
            surface.reinit(init.target_width, init.target_height);
            self.size = Some((init.target_width, init.target_height));
            self.fps = init.fps;
            tracing::info!(
                video_width = init.video_width,
                video_height = init.video_height,
                width = init.target_width,
                height = init.target_height,
                fps = init.fps,
                "Video initialized"
            );
        }

        let Some((width, height)) = self.size else {
            return TickOutcome::Idle;
        };

        let queued = self.queued();
        if sink.is_buffering() {
            if queued < sink.queue().low_watermark() {
                self.stats.buffering_ticks += 1;
                return TickOutcome::Buffering { queued };
            }
            sink.set_buffering(false);
            tracing::debug!(queued = queued, "Buffering complete");
        }

        let clock = sink.start_clock(now);
        let elapsed_us = duration_us(now.saturating_duration_since(clock));

        let mut best: Option<Frame> = None;
        let mut skipped = 0u32;
        while let Some(frame) = self.lookahead.take().or_else(|| sink.queue().pop()) {
            if !frame.matches(width, height) || self.is_behind(&frame) {
                self.stats.frames_stale += 1;
                sink.pool().give_back(frame.pixels);
                continue;
            }
            if frame.timestamp_us > elapsed_us {
                self.lookahead = Some(frame);
                break;
            }
            if let Some(older) = best.replace(frame) {
                skipped += 1;
                self.stats.frames_skipped += 1;
                sink.pool().give_back(older.pixels);
            }
        }

        let outcome = match best {
            Some(frame) => {
                let timestamp_us = frame.timestamp_us;
                surface.upload(width, height, &frame.pixels);
                self.last_shown_us = Some(timestamp_us);
                self.stats.shown(timestamp_us, elapsed_us);
                sink.pool().give_back(frame.pixels);
                TickOutcome::Displayed {
                    timestamp_us,
                    skipped,
                }
            }
            None => TickOutcome::Holding,
        };

        self.maybe_report(now, &sink);
        outcome
    }

    fn is_behind(&self, frame: &Frame) -> bool {
        self.last_shown_us
            .is_some_and(|last| frame.timestamp_us < last)
    }

    fn maybe_report(&mut self, now: Instant, sink: &ScreenSink) {
        let due = self
            .last_report
            .map_or(true, |at| now.saturating_duration_since(at) >= REPORT_INTERVAL);
        if !due {
            return;
        }
        self.last_report = Some(now);
        tracing::debug!(
            shown = self.stats.frames_shown,
            skipped = self.stats.frames_skipped,
            stale = self.stats.frames_stale,
            lag_ms = self.stats.last_lag_us / 1000,
            queued = self.queued(),
            free_buffers = sink.pool().available(),
            "Pacer"
        );
    }
}

fn duration_us(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}

/// Surface backed by a plain pixel buffer
#[derive(Debug, Default, Clone)]
pub struct MemorySurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
    pub uploads: u64,
}

impl Surface for MemorySurface {
    fn reinit(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize];
    }

    fn upload(&mut self, width: u32, height: u32, pixels: &[u32]) {
        if width != self.width || height != self.height {
            self.reinit(width, height);
        }
        let n = self.pixels.len().min(pixels.len());
        self.pixels[..n].copy_from_slice(&pixels[..n]);
        self.uploads += 1;
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }
}
