//! Decode worker for one screen
//!
//! ```text
//!   start(request)
//!       │
//!       ▼
//!   [collins-decode thread] ─ resolve ─ probe (or cache) ─ size ─ open ─ seek
//!       │
//!       └─ loop: grab ─┬─ audio ─► prebuffer until the pacer stops buffering,
//!                      │           then device (parks while full)
//!                      └─ video ─► borrow buffer ─ BGR24 → ABGR ─ push_frame
//!
//!   end of stream: loop ? reopen at 0 : on_stop()
//! ```
//!
//! Every failure ends the session quietly; the sink always gets exactly one
//! `on_stop` per started worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, Thread};
use std::time::{Duration, Instant};

use super::backend::{DecodedUnit, MediaBackend, MediaStream};
use super::options::NetOptions;
use super::seek::{effective_seek_ms, seek_to, SkipLimits};
use crate::audio::{AudioControl, AudioDevice, AudioFormat, AudioSink};
use crate::error::DecodeError;
use crate::media::pixel::bgr24_to_abgr;
use crate::media::sizing::{fit_target, SizeLimits};
use crate::media::{Frame, FrameSink, VideoInit};
use crate::resolve::{ResolvedMeta, Resolver};
use crate::stats::DecodeStats;

/// One playback attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub url: String,
    /// Screen size in cells
    pub cells_w: u32,
    pub cells_h: u32,
    pub looping: bool,
    /// Start offset in ms
    pub start_ms: i64,
    /// Linear gain, never negative
    pub gain: f32,
}

impl SessionRequest {
    pub fn new(url: impl Into<String>, cells_w: u32, cells_h: u32) -> Self {
        Self {
            url: url.into(),
            cells_w,
            cells_h,
            looping: false,
            start_ms: 0,
            gain: 1.0,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn start_at(mut self, ms: i64) -> Self {
        self.start_ms = ms.max(0);
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain.max(0.0);
        self
    }
}

/// Producer tuning
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub size_limits: SizeLimits,
    pub skip: SkipLimits,
    /// Park interval for every wait on the consumer or the device
    pub park_interval: Duration,
    /// How long to wait for a free pixel buffer before dropping a frame
    pub buffer_wait: Duration,
    pub net: NetOptions,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            size_limits: SizeLimits::default(),
            skip: SkipLimits::default(),
            park_interval: Duration::from_millis(1),
            buffer_wait: Duration::from_millis(500),
            net: NetOptions::default(),
        }
    }
}

/// Everything a worker needs besides its request and sink
///
/// Shared by all screens.
pub struct DecodeContext {
    pub backend: Arc<dyn MediaBackend>,
    pub audio: Arc<dyn AudioDevice>,
    pub resolver: Arc<Resolver>,
    pub config: ProducerConfig,
}

impl std::fmt::Debug for DecodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish()
    }
}

/// Live state of one started worker
#[derive(Debug)]
struct SessionHandle {
    cancel: Arc<AtomicBool>,
    audio: Arc<AudioControl>,
    thread: Thread,
    join: JoinHandle<()>,
}

impl SessionHandle {
    fn retire(self) {
        self.cancel.store(true, Ordering::Release);
        self.audio.shutdown();
        self.thread.unpark();
        // Not joined: a worker blocked in a network call exits once it returns
        drop(self.join);
    }
}

/// Starts and stops decode workers for one screen
///
/// At most one worker is live at a time; starting a new session retires
/// the previous one first.
#[derive(Debug)]
pub struct Producer {
    ctx: Arc<DecodeContext>,
    handle: Option<SessionHandle>,
}

impl Producer {
    pub fn new(ctx: Arc<DecodeContext>) -> Self {
        Self { ctx, handle: None }
    }

    /// Start a session, retiring any current one
    pub fn start(&mut self, request: SessionRequest, sink: Arc<dyn FrameSink>) {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let audio = AudioControl::new(request.gain);
        let requested_at = Instant::now();

        let worker = Worker {
            ctx: Arc::clone(&self.ctx),
            request,
            sink,
            cancel: Arc::clone(&cancel),
            audio: Arc::clone(&audio),
        };

        let spawned = std::thread::Builder::new()
            .name("collins-decode".into())
            .spawn(move || worker.run(requested_at));

        match spawned {
            Ok(join) => {
                self.handle = Some(SessionHandle {
                    cancel,
                    audio,
                    thread: join.thread().clone(),
                    join,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn decode thread");
            }
        }
    }

    /// Stop the current session
    ///
    /// Idempotent. The audio device is closed before this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.retire();
        }
    }

    /// Gain for samples written from now on
    pub fn set_gain(&self, gain: f32) {
        if let Some(handle) = &self.handle {
            handle.audio.set_gain(gain);
        }
    }

    /// Whether a worker was started and has not finished
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.join.is_finished())
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Calls `on_stop` when the worker exits, however it exits
struct StopGuard(Arc<dyn FrameSink>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.on_stop();
    }
}

/// How a single play-through ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayEnd {
    EndOfStream,
    Cancelled,
}

struct Worker {
    ctx: Arc<DecodeContext>,
    request: SessionRequest,
    sink: Arc<dyn FrameSink>,
    cancel: Arc<AtomicBool>,
    audio: Arc<AudioControl>,
}

impl Worker {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn run(self, requested_at: Instant) {
        let _guard = StopGuard(Arc::clone(&self.sink));
        let url = self.request.url.clone();
        tracing::info!(
            url = %url,
            start_ms = self.request.start_ms,
            looping = self.request.looping,
            "Decode session started"
        );

        let mut first = true;
        while !self.cancelled() {
            let (seek_ms, requested) = if first {
                (self.request.start_ms, Some(requested_at))
            } else {
                (0, None)
            };
            first = false;

            match self.play_once(seek_ms, requested) {
                Ok(PlayEnd::EndOfStream) if self.request.looping => {
                    tracing::debug!(url = %url, "Looping");
                }
                Ok(PlayEnd::EndOfStream) => {
                    tracing::info!(url = %url, "Decode session ended");
                    break;
                }
                Ok(PlayEnd::Cancelled) | Err(DecodeError::Cancelled) => break,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Decode session failed");
                    break;
                }
            }
        }
    }

    /// Cached metadata, or resolve and probe
    fn metadata(&self) -> Result<ResolvedMeta, DecodeError> {
        let resolver = &self.ctx.resolver;
        if let Some(meta) = resolver.meta().get(&self.request.url) {
            return Ok(meta);
        }

        let resolved = resolver.resolve(&self.request.url);
        if self.cancelled() {
            return Err(DecodeError::Cancelled);
        }

        let info = self.ctx.backend.probe(&resolved.url, &self.ctx.config.net)?;
        let duration_ms = match info.duration_ms {
            ms if ms > 0 => ms,
            _ => resolved.duration_hint_ms.max(0),
        };
        let meta = ResolvedMeta {
            resolved_url: resolved.url,
            width: info.width,
            height: info.height,
            fps: if info.fps > 0.0 { info.fps } else { 30.0 },
            duration_ms,
            resolved_at: Instant::now(),
        };
        resolver.meta().insert(self.request.url.clone(), meta.clone());
        Ok(meta)
    }

    fn play_once(&self, seek_ms: i64, requested_at: Option<Instant>) -> Result<PlayEnd, DecodeError> {
        let config = &self.ctx.config;
        let meta = self.metadata()?;
        if meta.width <= 0 || meta.height <= 0 {
            return Err(DecodeError::InvalidDimensions {
                width: meta.width,
                height: meta.height,
            });
        }
        if self.cancelled() {
            return Ok(PlayEnd::Cancelled);
        }

        let (width, height) = fit_target(
            self.request.cells_w,
            self.request.cells_h,
            meta.width as u32,
            meta.height as u32,
            &config.size_limits,
        );

        let mut stream = self
            .ctx
            .backend
            .open(&meta.resolved_url, width, height, &config.net)?;
        let opened_at = Instant::now();

        let mut fps = meta.fps;
        if fps <= 0.0 {
            fps = match stream.frame_rate() {
                r if r > 0.0 => r,
                _ => 30.0,
            };
        }

        let mut pending = None;
        let target_ms = effective_seek_ms(seek_ms, requested_at, opened_at);
        if target_ms > 0 {
            let outcome = seek_to(
                stream.as_mut(),
                target_ms * 1000,
                fps,
                &config.skip,
                &self.cancel,
            );
            pending = outcome.pending;
        }
        if self.cancelled() {
            return Ok(PlayEnd::Cancelled);
        }

        self.sink.init_video(VideoInit {
            video_width: meta.width as u32,
            video_height: meta.height as u32,
            target_width: width,
            target_height: height,
            fps,
        });
        self.sink.push_duration(meta.duration_ms);

        let mut audio = stream.audio_params().and_then(|(rate, channels)| {
            let format = AudioFormat::from_stream(rate, channels);
            match AudioSink::open(
                self.ctx.audio.as_ref(),
                format,
                Arc::clone(&self.audio),
                config.park_interval,
            ) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    tracing::warn!(error = %e, "Audio unavailable, playing video only");
                    None
                }
            }
        });

        tracing::info!(
            url = %meta.resolved_url,
            width = width,
            height = height,
            fps = fps,
            duration_ms = meta.duration_ms,
            seek_ms = target_ms,
            audio = audio.is_some(),
            "Decoding"
        );

        self.decode_loop(stream.as_mut(), &mut audio, pending, width, height)
    }

    fn decode_loop(
        &self,
        stream: &mut dyn MediaStream,
        audio: &mut Option<AudioSink>,
        mut pending: Option<DecodedUnit>,
        width: u32,
        height: u32,
    ) -> Result<PlayEnd, DecodeError> {
        let mut base_ts: Option<i64> = None;
        let mut audio_paced = false;
        let mut clock_started = false;
        let mut prebuffer_full = false;
        let mut stats = DecodeStats::new();

        loop {
            if self.cancelled() {
                return Ok(PlayEnd::Cancelled);
            }

            let grab_start = Instant::now();
            let unit = match pending.take() {
                Some(unit) => unit,
                None => match stream.grab()? {
                    Some(unit) => unit,
                    None => return Ok(PlayEnd::EndOfStream),
                },
            };
            let grab_time = grab_start.elapsed();

            // Negative means the unit carries no timestamp
            let ts = match unit.timestamp_us() {
                ts if ts >= 0 => ts,
                _ => stream.position_us(),
            };
            if ts >= 0 && base_ts.is_none() {
                base_ts = Some(ts);
            }

            match unit {
                DecodedUnit::Audio { block, .. } => {
                    let Some(out) = audio.as_mut() else {
                        continue;
                    };
                    audio_paced = true;

                    if !self.sink.is_buffer_ready() {
                        if !out.prebuffer(&block) && !prebuffer_full {
                            prebuffer_full = true;
                            tracing::debug!(
                                cap_bytes = out.prebuffer_cap(),
                                "Audio prebuffer full, dropping blocks until playback starts"
                            );
                        }
                        continue;
                    }
                    if !clock_started {
                        clock_started = true;
                        self.sink.playback_clock_started(Instant::now());
                    }
                    out.start();
                    out.flush_prebuffer();
                    out.write(&block);
                }
                DecodedUnit::Video { image, .. } => {
                    if !audio_paced && !self.wait_for_room() {
                        return Ok(PlayEnd::Cancelled);
                    }

                    let convert_start = Instant::now();
                    let Some(mut pixels) = self.borrow_buffer() else {
                        if self.cancelled() {
                            return Ok(PlayEnd::Cancelled);
                        }
                        tracing::debug!("No free pixel buffer, frame dropped");
                        continue;
                    };
                    if pixels.len() != width as usize * height as usize {
                        // Pool not yet sized for this session
                        self.sink.return_buffer(pixels);
                        continue;
                    }

                    bgr24_to_abgr(
                        &image.data,
                        image.stride,
                        width as usize,
                        height as usize,
                        &mut pixels,
                    );
                    let now = Instant::now();
                    stats.record(now, grab_time, now - convert_start);

                    // An audio unit may have set the base slightly after this frame
                    let relative = match base_ts {
                        Some(base) if ts >= 0 => (ts - base).max(0),
                        _ => 0,
                    };
                    tracing::trace!(timestamp_us = relative, "Frame decoded");
                    self.sink.push_frame(Frame::new(pixels, width, height, relative));
                }
            }
        }
    }

    /// Park while the consumer is full; `false` if cancelled
    fn wait_for_room(&self) -> bool {
        while !self.sink.can_accept_frame() {
            if self.cancelled() {
                return false;
            }
            std::thread::park_timeout(self.ctx.config.park_interval);
        }
        !self.cancelled()
    }

    fn borrow_buffer(&self) -> Option<Vec<u32>> {
        let deadline = Instant::now() + self.ctx.config.buffer_wait;
        loop {
            if let Some(buf) = self.sink.borrow_buffer() {
                return Some(buf);
            }
            if self.cancelled() || Instant::now() >= deadline {
                return None;
            }
            std::thread::park_timeout(self.ctx.config.park_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::tests::FakeDevice;
    use crate::audio::NullDevice;
    use crate::decode::backend::StreamInfo;
    use crate::decode::testing::{FakeBackend, ScriptedStream};
    use crate::media::ScreenSink;
    use crate::resolve::redirect::tests::FakeProbe;
    use crate::resolve::ResolverConfig;

    const URL: &str = "file:///media/clip.mp4";

    fn info(duration_ms: i64) -> StreamInfo {
        StreamInfo {
            width: 1280,
            height: 720,
            fps: 30.0,
            duration_ms,
        }
    }

    fn context(backend: Arc<FakeBackend>, audio: Arc<dyn AudioDevice>) -> Arc<DecodeContext> {
        let resolver = Resolver::with_probe(&ResolverConfig::default(), Box::new(FakeProbe::default()));
        Arc::new(DecodeContext {
            backend,
            audio,
            resolver: Arc::new(resolver),
            config: ProducerConfig {
                size_limits: SizeLimits {
                    px_per_cell: 2,
                    min_width: 2,
                    min_height: 2,
                    max_width: 16,
                    max_height: 16,
                },
                ..Default::default()
            },
        })
    }

    fn drain_queue(sink: &ScreenSink, seen: &mut Vec<i64>) {
        if let Some(init) = sink.take_pending_init() {
            sink.pool().reset(init.pixels());
        }
        while let Some(frame) = sink.queue().pop() {
            seen.push(frame.timestamp_us);
            sink.pool().give_back(frame.pixels);
        }
    }

    /// Consume frames without pacing until the producer stops
    ///
    /// Returns the timestamps received.
    fn collect(sink: &ScreenSink, limit: Duration) -> Option<Vec<i64>> {
        let started = Instant::now();
        let mut seen = Vec::new();
        while started.elapsed() < limit {
            drain_queue(sink, &mut seen);
            if sink.take_pending_stop() {
                // Everything was pushed before the stop signal
                drain_queue(sink, &mut seen);
                return Some(seen);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_plays_to_end_and_stops_once() {
        let backend = FakeBackend::new(info(1_000), ScriptedStream::video(30.0, 30));
        let ctx = context(Arc::clone(&backend), Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(2, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2), sink.clone());

        // Stream timestamps start at 0, so they pass through unchanged
        let seen = collect(&sink, Duration::from_secs(10)).unwrap();
        let expected: Vec<i64> = (0..30).map(|i| i * 33_333).collect();
        assert_eq!(seen, expected);
        assert_eq!(sink.take_duration(), Some(1_000));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!sink.take_pending_stop());

        // 4x2 cells at 2px per cell, 16:9 source fitted and rounded to even
        let opens = backend.opens.lock().clone();
        assert_eq!(opens, vec![(URL.to_string(), 6, 4)]);
    }

    #[test]
    fn test_metadata_cached_between_sessions() {
        let backend = FakeBackend::new(info(0), ScriptedStream::video(30.0, 3));
        let ctx = context(Arc::clone(&backend), Arc::new(NullDevice));
        let mut producer = Producer::new(ctx);

        for _ in 0..2 {
            let sink = Arc::new(ScreenSink::new(1, 4, 8));
            producer.start(SessionRequest::new(URL, 4, 2), sink.clone());
            assert!(collect(&sink, Duration::from_secs(10)).is_some());
        }
        assert_eq!(backend.probe_count(), 1);
        assert_eq!(backend.opens.lock().len(), 2);
    }

    #[test]
    fn test_probe_failure_ends_quietly() {
        let ctx = context(FakeBackend::failing(), Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(1, 4, 8));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2).looping(true), sink.clone());

        assert_eq!(collect(&sink, Duration::from_secs(5)), Some(vec![]));
        assert!(sink.take_pending_init().is_none());
    }

    #[test]
    fn test_grab_error_does_not_loop() {
        let backend = FakeBackend::new(info(0), ScriptedStream::video(30.0, 10).failing_at(5));
        let ctx = context(Arc::clone(&backend), Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(1, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2).looping(true), sink.clone());

        let seen = collect(&sink, Duration::from_secs(10)).unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(backend.opens.lock().len(), 1);
    }

    #[test]
    fn test_loop_reopens_at_zero() {
        let backend = FakeBackend::new(
            info(0),
            ScriptedStream::video(30.0, 4).with_grab_delay(Duration::from_millis(1)),
        );
        let ctx = context(Arc::clone(&backend), Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(1, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(
            SessionRequest::new(URL, 4, 2).looping(true).start_at(0),
            sink.clone(),
        );

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = Vec::new();
        while backend.opens.lock().len() < 3 {
            assert!(Instant::now() < deadline, "did not loop");
            drain_queue(&sink, &mut seen);
            std::thread::sleep(Duration::from_millis(1));
        }
        producer.stop();
        seen.extend(collect(&sink, Duration::from_secs(5)).unwrap());

        let mut passes: Vec<Vec<i64>> = Vec::new();
        for ts in seen {
            match passes.last_mut() {
                Some(pass) if ts != 0 => pass.push(ts),
                _ => passes.push(vec![ts]),
            }
        }

        // The first two passes finished before the third open
        let full = vec![0, 33_333, 66_666, 99_999];
        assert!(passes.len() >= 2, "passes: {passes:?}");
        assert_eq!(passes[0], full);
        assert_eq!(passes[1], full);
        for pass in &passes[2..] {
            assert!(full.starts_with(pass), "pass {pass:?}");
        }
    }

    #[test]
    fn test_start_offset_includes_open_latency() {
        let stream = ScriptedStream::video(30.0, 120).with_seek_landing(Some(1_000_000));
        let seeks = Arc::clone(&stream.seeks);
        let backend = FakeBackend::slow_open(info(4_000), stream, Duration::from_millis(60));
        let ctx = context(backend, Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(2, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2).start_at(2_000), sink.clone());
        let seen = collect(&sink, Duration::from_secs(10)).unwrap();

        let seeks = seeks.lock().clone();
        assert_eq!(seeks.len(), 1);
        let target_us = seeks[0];
        assert!(target_us >= 2_060_000, "target {target_us}");

        // Decoding resumes from the first unit within 50ms of the target
        let first = (0..120i64)
            .find(|i| i * 33_333 >= target_us - 50_000)
            .unwrap();
        assert_eq!(seen.len() as i64, 120 - first);
        assert_eq!(seen[0], 0);
        assert_eq!(seen[1], 33_333);
        assert!(seen.windows(2).all(|w| w[1] - w[0] == 33_333));
    }

    #[test]
    fn test_stop_signals_once() {
        let backend = FakeBackend::new(
            info(0),
            ScriptedStream::video(30.0, 100_000).with_grab_delay(Duration::from_millis(1)),
        );
        let ctx = context(backend, Arc::new(NullDevice));
        let sink = Arc::new(ScreenSink::new(1, 4, 8));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2), sink.clone());
        std::thread::sleep(Duration::from_millis(20));
        producer.stop();
        producer.stop();

        assert!(collect(&sink, Duration::from_secs(5)).is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!sink.take_pending_stop());
        assert!(!producer.is_running());
    }

    #[test]
    fn test_audio_written_when_consumer_ready() {
        let device = Arc::new(FakeDevice::new(1 << 20));
        let backend = FakeBackend::new(
            info(0),
            ScriptedStream::video(30.0, 20).with_audio(48_000, 2),
        );
        let ctx = context(backend, device.clone());
        let sink = Arc::new(ScreenSink::new(4, 8, 12));
        sink.set_buffering(false);

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2).gain(0.5), sink.clone());

        let seen = collect(&sink, Duration::from_secs(10)).unwrap();
        assert!(sink.clock_start().is_some());
        // Audio shares the video timeline, frames may drop without backpressure
        assert_eq!(seen.first(), Some(&0));
        assert!(seen.iter().all(|ts| ts % 33_333 == 0));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let state = device.state.lock();
        assert!(state.started);
        assert!(state.closed);
        // 20 blocks of 64 samples at half gain
        assert_eq!(state.written.len(), 20 * 64 * 2);
        assert_eq!(&state.written[..2], &500i16.to_le_bytes());
    }

    #[test]
    fn test_audio_held_while_buffering() {
        let device = Arc::new(FakeDevice::new(1 << 20));
        let backend = FakeBackend::new(
            info(0),
            ScriptedStream::video(30.0, 10).with_audio(48_000, 2),
        );
        let ctx = context(backend, device.clone());
        let sink = Arc::new(ScreenSink::new(4, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2), sink.clone());

        assert!(collect(&sink, Duration::from_secs(10)).is_some());
        assert!(sink.clock_start().is_none());

        let state = device.state.lock();
        assert!(!state.started);
        assert!(state.written.is_empty());
        assert!(state.closed);
    }

    #[test]
    fn test_prebuffer_overflow_keeps_session_alive() {
        // 1000 blocks of 128 bytes against a 64KiB ceiling
        let device = Arc::new(FakeDevice::new(1 << 20));
        let backend = FakeBackend::new(
            info(0),
            ScriptedStream::video(30.0, 1_000).with_audio(8_000, 1),
        );
        let ctx = context(backend, device.clone());
        let sink = Arc::new(ScreenSink::new(4, 8, 12));

        let mut producer = Producer::new(ctx);
        producer.start(SessionRequest::new(URL, 4, 2), sink.clone());

        assert!(collect(&sink, Duration::from_secs(10)).is_some());
        let state = device.state.lock();
        assert!(!state.started);
        assert!(state.written.is_empty());
        assert!(state.closed);
    }
}
