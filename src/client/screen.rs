//! One in-world screen on the client
//!
//! A [`VideoScreen`] turns the latest server record into at most one decode
//! session. A session is identified by the anchor it was started from, so a
//! seek, URL change or restart on the server starts a new one, while repeated
//! syncs of unchanged state do not. A session that ends on its own stays
//! ended until the server sends a different anchor.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::config::PlayerConfig;
use crate::decode::{DecodeContext, Producer, SessionRequest};
use crate::error::ProtocolError;
use crate::media::{RenderPacer, ScreenSink, Surface, TickOutcome};
use crate::protocol::{Bounds, ScreenRecord};
use crate::sync::{video_duration, video_ended, PlaybackAnchor};

/// Smallest gain change forwarded to a running session
const GAIN_EPSILON: f32 = 0.001;

/// Where the local player is
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Listener {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Distance to the centre of `bounds`
    pub fn distance_to(&self, bounds: &Bounds) -> f64 {
        let (cx, cy, cz) = bounds.center();
        ((self.x - cx).powi(2) + (self.y - cy).powi(2) + (self.z - cz).powi(2)).sqrt()
    }
}

/// Inputs shared by every screen for one playback update
#[derive(Debug, Clone, Copy)]
pub struct PlaybackEnv<'a> {
    pub listener: Option<&'a Listener>,
    /// 0 or less disables range gating
    pub hear_radius: i32,
    pub global_volume: f32,
    /// Estimated server wall clock
    pub server_now_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionKey {
    url: String,
    start_epoch_ms: i64,
    base_pos_ms: i64,
    looping: bool,
}

impl SessionKey {
    fn of(record: &ScreenRecord) -> Self {
        Self {
            url: record.url.clone(),
            start_epoch_ms: record.start_epoch_ms,
            base_pos_ms: record.base_pos_ms,
            looping: record.looping,
        }
    }
}

/// Client-side playback of one screen
#[derive(Debug)]
pub struct VideoScreen {
    name: String,
    record: ScreenRecord,
    anchor: PlaybackAnchor,
    low_watermark: usize,
    high_watermark: usize,
    pool_size: usize,
    producer: Producer,
    pacer: RenderPacer,
    session: Option<SessionKey>,
    ended: Option<SessionKey>,
    gain: f32,
    duration_ms: i64,
    duration_reported: bool,
    clear_pending: bool,
    outgoing: Vec<Bytes>,
}

impl VideoScreen {
    pub fn new(
        record: ScreenRecord,
        anchor: PlaybackAnchor,
        ctx: Arc<DecodeContext>,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            name: record.name.clone(),
            record,
            anchor,
            low_watermark: config.low_watermark,
            high_watermark: config.high_watermark,
            pool_size: config.effective_pool_size(),
            producer: Producer::new(ctx),
            pacer: RenderPacer::new(),
            session: None,
            ended: None,
            gain: 1.0,
            duration_ms: 0,
            duration_reported: false,
            clear_pending: false,
            outgoing: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &ScreenRecord {
        &self.record
    }

    /// Whether a decode session was started and has not ended
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the last session ended on its own
    pub fn has_ended(&self) -> bool {
        self.ended.is_some()
    }

    /// Gain of the current session
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Duration reported by the decoder, 0 when unknown
    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn pacer(&self) -> &RenderPacer {
        &self.pacer
    }

    /// Take the latest server state for this screen
    pub fn update(&mut self, record: ScreenRecord, anchor: PlaybackAnchor) {
        if record.url != self.record.url {
            self.duration_ms = 0;
        }
        self.record = record;
        self.anchor = anchor;
    }

    /// Start, stop or adjust the session to match the server state
    pub fn tick_playback(&mut self, env: &PlaybackEnv<'_>) {
        let gain = env.global_volume.max(0.0) * self.record.volume.max(0.0);

        if !self.record.playing || self.record.url.is_empty() {
            self.ended = None;
            if self.session.is_some() {
                self.stop();
            }
            return;
        }

        if !self.in_range(env) {
            if self.session.is_some() {
                tracing::debug!(screen = %self.name, "Listener out of range");
                self.stop();
            }
            return;
        }

        let key = SessionKey::of(&self.record);
        if self.session.as_ref() == Some(&key) {
            if (gain - self.gain).abs() > GAIN_EPSILON {
                self.producer.set_gain(gain);
                self.gain = gain;
            }
            return;
        }
        if self.ended.as_ref() == Some(&key) {
            return;
        }

        self.start(key, gain, env.server_now_ms);
    }

    fn in_range(&self, env: &PlaybackEnv<'_>) -> bool {
        if env.hear_radius <= 0 {
            return true;
        }
        let Some(listener) = env.listener else {
            return true;
        };
        listener.world == self.record.world
            && listener.distance_to(&self.record.bounds) <= f64::from(env.hear_radius)
    }

    fn start(&mut self, key: SessionKey, gain: f32, server_now_ms: i64) {
        let mut start_ms = self.anchor.position(server_now_ms);
        if self.record.looping && self.duration_ms > 0 {
            start_ms %= self.duration_ms;
        }
        let (cells_w, cells_h) = self.record.bounds.face_cells(self.record.axis);

        let sink = Arc::new(ScreenSink::new(
            self.low_watermark,
            self.high_watermark,
            self.pool_size,
        ));
        self.pacer.attach(Arc::clone(&sink));

        let request = SessionRequest::new(key.url.clone(), cells_w, cells_h)
            .looping(key.looping)
            .start_at(start_ms)
            .gain(gain);

        tracing::info!(
            screen = %self.name,
            url = %key.url,
            start_ms = start_ms,
            cells_w = cells_w,
            cells_h = cells_h,
            "Starting playback"
        );
        self.producer.start(request, sink);

        self.session = Some(key);
        self.ended = None;
        self.gain = gain;
        self.duration_reported = false;
        self.clear_pending = false;
    }

    /// Stop the current session, if any
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            tracing::info!(screen = %self.name, "Playback stopped");
        }
        self.producer.stop();
        self.pacer.detach();
        self.clear_pending = true;
    }

    /// Run one render tick against `surface`
    pub fn render<S: Surface + ?Sized>(&mut self, now: Instant, surface: &mut S) -> TickOutcome {
        if std::mem::take(&mut self.clear_pending) {
            surface.clear();
        }

        let outcome = self.pacer.tick(now, surface);

        if let Some(sink) = self.pacer.sink().cloned() {
            if let Some(ms) = sink.take_duration().filter(|ms| *ms > 0) {
                self.duration_ms = ms;
                if !self.duration_reported {
                    self.duration_reported = true;
                    self.queue(video_duration(&self.name, ms));
                }
            }
        }

        if outcome == TickOutcome::Stopped {
            if let Some(key) = self.session.take() {
                tracing::info!(screen = %self.name, url = %key.url, "Video ended");
                self.ended = Some(key);
                self.queue(video_ended(&self.name));
            }
            self.pacer.detach();
        }
        outcome
    }

    /// Envelopes waiting to be sent to the server
    pub fn take_outgoing(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outgoing)
    }

    fn queue(&mut self, envelope: Result<Bytes, ProtocolError>) {
        match envelope {
            Ok(bytes) => self.outgoing.push(bytes),
            Err(e) => tracing::warn!(screen = %self.name, error = %e, "Failed to encode report"),
        }
    }
}
