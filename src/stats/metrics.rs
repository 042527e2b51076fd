//! Statistics for playback sessions and periodic ticks

use std::time::{Duration, Instant};

/// Interval between diagnostic reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Render pacer counters for one screen
#[derive(Debug, Clone, Default)]
pub struct PacerStats {
    /// Frames uploaded to the surface
    pub frames_shown: u64,
    /// Eligible frames skipped in favour of a newer one
    pub frames_skipped: u64,
    /// Frames dropped for a size mismatch or a timestamp behind the last shown
    pub frames_stale: u64,
    /// Ticks spent buffering
    pub buffering_ticks: u64,
    /// Timestamp of the last shown frame
    pub last_timestamp_us: Option<i64>,
    /// How far the last shown frame lagged the playback clock
    pub last_lag_us: i64,
}

impl PacerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a displayed frame
    pub fn shown(&mut self, timestamp_us: i64, elapsed_us: i64) {
        self.frames_shown += 1;
        self.last_timestamp_us = Some(timestamp_us);
        self.last_lag_us = elapsed_us - timestamp_us;
    }

    /// Total frames that left the queue without display
    pub fn dropped(&self) -> u64 {
        self.frames_skipped + self.frames_stale
    }
}

/// Peak values seen within one report window
#[derive(Debug, Clone)]
pub struct PeakWindow {
    window_start: Instant,
    interval: Duration,
    samples: u64,
    peak_a: Duration,
    peak_b: Duration,
}

/// A finished report window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakReport {
    pub samples: u64,
    pub peak_a: Duration,
    pub peak_b: Duration,
}

impl PeakWindow {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            window_start: now,
            interval,
            samples: 0,
            peak_a: Duration::ZERO,
            peak_b: Duration::ZERO,
        }
    }

    /// Record a pair of measurements
    ///
    /// Returns the window's peaks once `interval` has passed, then starts a
    /// new window.
    pub fn record(&mut self, now: Instant, a: Duration, b: Duration) -> Option<PeakReport> {
        self.samples += 1;
        self.peak_a = self.peak_a.max(a);
        self.peak_b = self.peak_b.max(b);

        if now.saturating_duration_since(self.window_start) < self.interval {
            return None;
        }

        let report = PeakReport {
            samples: self.samples,
            peak_a: self.peak_a,
            peak_b: self.peak_b,
        };
        *self = Self::new(now, self.interval);
        Some(report)
    }
}

/// Gap between ticks and time spent inside them
#[derive(Debug, Clone)]
pub struct TickStats {
    name: &'static str,
    last_start: Option<Instant>,
    window: PeakWindow,
}

impl TickStats {
    pub fn new(name: &'static str) -> Self {
        Self::with_interval(name, REPORT_INTERVAL)
    }

    pub fn with_interval(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            last_start: None,
            window: PeakWindow::new(Instant::now(), interval),
        }
    }

    /// Record one tick that ran from `started` to `finished`
    pub fn record(&mut self, started: Instant, finished: Instant) -> Option<PeakReport> {
        let gap = self
            .last_start
            .map(|prev| started.saturating_duration_since(prev))
            .unwrap_or_default();
        self.last_start = Some(started);

        let report = self
            .window
            .record(finished, gap, finished.saturating_duration_since(started))?;

        tracing::debug!(
            tick = self.name,
            ticks = report.samples,
            peak_gap_ms = report.peak_a.as_millis() as u64,
            peak_tick_ms = report.peak_b.as_millis() as u64,
            "Tick timing"
        );
        Some(report)
    }
}

/// Decode thread timings (grab and pixel conversion)
#[derive(Debug, Clone)]
pub struct DecodeStats {
    pub frames: u64,
    window: PeakWindow,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self {
            frames: 0,
            window: PeakWindow::new(Instant::now(), REPORT_INTERVAL),
        }
    }

    /// Record one decoded video frame
    pub fn record(&mut self, now: Instant, grab: Duration, convert: Duration) {
        self.frames += 1;
        if let Some(report) = self.window.record(now, grab, convert) {
            tracing::debug!(
                frames = self.frames,
                window_frames = report.samples,
                peak_grab_ms = report.peak_a.as_millis() as u64,
                peak_convert_ms = report.peak_b.as_millis() as u64,
                "Decode timing"
            );
        }
    }
}

impl Default for DecodeStats {
    fn default() -> Self {
        Self::new()
    }
}
