//! Authoritative per-screen playback state
//!
//! ```text
//!              play                pause
//!   Stopped ─────────► Playing ─────────► Paused
//!      ▲                  ▲  ◄────────────  │
//!      │                  │     resume      │
//!      └──── stop ────────┴─────────────────┘
//! ```
//!
//! `play` always restarts from 0. Every transition is a plain field update
//! on the owning screen; callers hold the runtime lock.

use super::anchor::PlaybackAnchor;
use super::playlist::{Playlist, PlaylistEntry};

/// Coarse playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What the server knows about the media duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationState {
    #[default]
    Unknown,
    /// A server-side probe is running
    ProbePending,
    Known(i64),
}

impl DurationState {
    /// Duration in ms, 0 unless known
    pub fn as_ms(&self) -> i64 {
        match self {
            DurationState::Known(ms) => *ms,
            _ => 0,
        }
    }
}

/// Result of a relative seek
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Position moved within the media
    Moved { from_ms: i64, to_ms: i64 },
    /// Seeked past the end; playback continues with the next playlist entry
    Advanced(PlaylistEntry),
    /// Seeked past the end with nothing to play next
    Stopped,
}

/// Result of reaching the end of the media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Advanced(PlaylistEntry),
    Stopped,
}

/// Playback state of one screen
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenPlayback {
    state: PlaybackState,
    url: String,
    looping: bool,
    volume: f32,
    start_epoch_ms: i64,
    base_pos_ms: i64,
    duration: DurationState,
}

impl ScreenPlayback {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: PlaybackState::Stopped,
            url: url.into(),
            looping: false,
            volume: 1.0,
            start_epoch_ms: 0,
            base_pos_ms: 0,
            duration: DurationState::Unknown,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
    }

    pub fn duration(&self) -> DurationState {
        self.duration
    }

    pub fn start_epoch_ms(&self) -> i64 {
        self.start_epoch_ms
    }

    pub fn base_pos_ms(&self) -> i64 {
        self.base_pos_ms
    }

    /// Snapshot of the anchor
    pub fn anchor(&self) -> PlaybackAnchor {
        PlaybackAnchor {
            playing: self.is_playing(),
            looping: self.looping,
            gain: self.volume,
            start_epoch_ms: self.start_epoch_ms,
            base_pos_ms: self.base_pos_ms,
            duration_ms: self.duration.as_ms(),
        }
    }

    /// Current position
    pub fn position(&self, now_ms: i64) -> i64 {
        self.anchor().position(now_ms)
    }

    /// Start from the beginning
    pub fn play(&mut self, now_ms: i64) {
        self.state = PlaybackState::Playing;
        self.base_pos_ms = 0;
        self.start_epoch_ms = now_ms;
    }

    /// Freeze the position
    pub fn pause(&mut self, now_ms: i64) {
        self.base_pos_ms = self.position(now_ms);
        self.start_epoch_ms = 0;
        self.state = if self.base_pos_ms > 0 || self.state != PlaybackState::Stopped {
            PlaybackState::Paused
        } else {
            PlaybackState::Stopped
        };
    }

    /// Continue from the frozen position
    pub fn resume(&mut self, now_ms: i64) {
        if self.is_playing() {
            return;
        }
        self.state = PlaybackState::Playing;
        self.start_epoch_ms = now_ms;
    }

    /// Stop and forget position and duration
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.reset_anchor();
    }

    /// Change the source
    ///
    /// The old position and duration belong to the old media; a playing
    /// screen restarts the new one from 0.
    pub fn set_url(&mut self, url: impl Into<String>, now_ms: i64) {
        self.url = url.into();
        self.reset_anchor();
        if self.is_playing() {
            self.start_epoch_ms = now_ms;
        } else if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Stopped;
        }
    }

    /// Switch to a playlist entry and play it from 0
    ///
    /// Playlist items never loop individually, otherwise the playlist would
    /// never advance.
    pub fn play_entry(&mut self, entry: &PlaylistEntry, now_ms: i64) {
        self.url = entry.url.clone();
        self.looping = false;
        self.reset_anchor();
        self.play(now_ms);
    }

    /// Relative seek by `delta_ms`, clamped to `±max_delta_ms`
    ///
    /// A target at or past a known duration on a non-looping screen ends the
    /// video: the next playlist entry starts, or the screen stops.
    pub fn seek(
        &mut self,
        delta_ms: i64,
        max_delta_ms: i64,
        now_ms: i64,
        playlist: Option<&mut Playlist>,
    ) -> SeekOutcome {
        let max = max_delta_ms.max(0);
        let delta = delta_ms.clamp(-max, max);
        let from_ms = self.position(now_ms);
        let to_ms = from_ms.saturating_add(delta).max(0);

        let duration = self.duration.as_ms();
        if delta > 0 && duration > 0 && to_ms >= duration && !self.looping {
            return match self.end(now_ms, playlist) {
                EndOutcome::Advanced(entry) => SeekOutcome::Advanced(entry),
                EndOutcome::Stopped => SeekOutcome::Stopped,
            };
        }

        self.base_pos_ms = to_ms;
        self.start_epoch_ms = if self.is_playing() { now_ms } else { 0 };
        if self.state == PlaybackState::Stopped && to_ms > 0 {
            self.state = PlaybackState::Paused;
        }
        SeekOutcome::Moved { from_ms, to_ms }
    }

    /// Handle the end of the media
    pub fn end(&mut self, now_ms: i64, playlist: Option<&mut Playlist>) -> EndOutcome {
        if let Some(playlist) = playlist.filter(|p| p.is_active()) {
            if let Some(entry) = playlist.next().cloned() {
                self.play_entry(&entry, now_ms);
                return EndOutcome::Advanced(entry);
            }
        }
        self.stop();
        EndOutcome::Stopped
    }

    /// Whether the media has run out (playing, non-looping, known duration)
    pub fn is_ended(&self, now_ms: i64, guard_ms: i64) -> bool {
        self.anchor().is_ended(now_ms, guard_ms)
    }

    /// Whether a server-side duration probe should start
    pub fn needs_probe(&self, now_ms: i64, after_ms: i64) -> bool {
        self.is_playing()
            && !self.looping
            && self.duration == DurationState::Unknown
            && !self.url.is_empty()
            && self.position(now_ms) > after_ms
    }

    pub fn mark_probe_pending(&mut self) {
        self.duration = DurationState::ProbePending;
    }

    /// Apply a duration reported by a client
    ///
    /// Accepted when nothing is known yet, when a probe is pending, or when
    /// it is within `tolerance_ms` of the current value. Returns whether the
    /// value was taken.
    pub fn apply_client_duration(&mut self, duration_ms: i64, tolerance_ms: i64) -> bool {
        if duration_ms <= 0 {
            return false;
        }
        let accept = match self.duration {
            DurationState::Unknown | DurationState::ProbePending => true,
            DurationState::Known(current) => (current - duration_ms).abs() < tolerance_ms,
        };
        if accept {
            self.duration = DurationState::Known(duration_ms);
        }
        accept
    }

    /// Apply a duration measured by the server; always wins
    pub fn apply_server_duration(&mut self, duration_ms: i64) -> bool {
        if duration_ms <= 0 {
            return false;
        }
        self.duration = DurationState::Known(duration_ms);
        true
    }

    fn reset_anchor(&mut self) {
        self.start_epoch_ms = 0;
        self.base_pos_ms = 0;
        self.duration = DurationState::Unknown;
    }
}
