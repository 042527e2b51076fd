//! Server-side screen state and broadcast
//!
//! The runtime owns every screen's [`ScreenPlayback`] and playlist. Each
//! mutation that clients must see ends with a rebroadcast of the full state
//! as an encoded v2 sync envelope. Subscribers get the current state on
//! subscribe, so late joiners never wait for the next change.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};

use super::clock::{Clock, SystemClock};
use super::playback::{EndOutcome, PlaybackState, ScreenPlayback, SeekOutcome};
use super::playlist::{Playlist, PlaylistEntry};
use crate::error::{ProtocolError, SyncError};
use crate::protocol::{Bounds, Message, ScreenRecord, SyncMessage};
use crate::server::config::ServerConfig;

/// Static placement of a screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScreenSpec {
    pub name: String,
    pub world: String,
    pub bounds: Bounds,
    /// Face orientation (0 = XY, 1 = XZ, 2 = YZ)
    pub axis: u8,
}

impl ScreenSpec {
    pub fn new(name: impl Into<String>, world: impl Into<String>, bounds: Bounds, axis: u8) -> Self {
        Self {
            name: name.into(),
            world: world.into(),
            bounds,
            axis,
        }
    }
}

#[derive(Debug, Clone)]
struct ScreenEntry {
    spec: ScreenSpec,
    playback: ScreenPlayback,
    playlist: Option<Playlist>,
}

impl ScreenEntry {
    fn record(&self) -> ScreenRecord {
        let anchor = self.playback.anchor();
        ScreenRecord {
            name: self.spec.name.clone(),
            world: self.spec.world.clone(),
            bounds: self.spec.bounds,
            axis: self.spec.axis,
            url: self.playback.url().to_string(),
            playing: anchor.playing,
            looping: anchor.looping,
            volume: anchor.gain,
            start_epoch_ms: anchor.start_epoch_ms,
            base_pos_ms: anchor.base_pos_ms,
        }
    }
}

/// Point-in-time view of one screen
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSnapshot {
    pub record: ScreenRecord,
    pub state: PlaybackState,
    pub duration_ms: i64,
    pub position_ms: i64,
}

/// Server-wide playback settings carried in every v2 message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Globals {
    pub global_volume: f32,
    pub hear_radius: i32,
}

/// Request to measure a screen's duration out of band
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub screen: String,
    pub url: String,
}

/// Work produced by one authoritative tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Screens whose media ran out, with what happened next
    pub ended: Vec<(String, EndOutcome)>,
    /// Duration probes to start
    pub probes: Vec<ProbeRequest>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

/// Authoritative playback state for all screens
pub struct SyncRuntime {
    screens: RwLock<HashMap<String, ScreenEntry>>,
    globals: RwLock<Globals>,
    config: ServerConfig,
    clock: Arc<dyn Clock>,
    tx: broadcast::Sender<Bytes>,
}

impl SyncRuntime {
    /// Create a runtime on the system clock
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let globals = Globals {
            global_volume: config.default_global_volume,
            hear_radius: config.default_hear_radius,
        };
        Self {
            screens: RwLock::new(HashMap::new()),
            globals: RwLock::new(globals),
            config,
            clock,
            tx,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ---- screens ----

    /// Register a screen, initially stopped
    pub async fn add_screen(&self, spec: ScreenSpec, url: impl Into<String>) -> Result<(), SyncError> {
        {
            let mut screens = self.screens.write().await;
            let k = key(&spec.name);
            if screens.contains_key(&k) {
                return Err(SyncError::ScreenExists(spec.name));
            }
            tracing::info!(screen = %spec.name, world = %spec.world, "Screen added");
            screens.insert(
                k,
                ScreenEntry {
                    spec,
                    playback: ScreenPlayback::new(url),
                    playlist: None,
                },
            );
        }
        self.broadcast().await;
        Ok(())
    }

    pub async fn remove_screen(&self, name: &str) -> Result<(), SyncError> {
        let removed = self.screens.write().await.remove(&key(name));
        if removed.is_none() {
            return Err(SyncError::ScreenNotFound(name.to_string()));
        }
        tracing::info!(screen = %name, "Screen removed");
        self.broadcast().await;
        Ok(())
    }

    pub async fn screen(&self, name: &str) -> Option<ScreenSnapshot> {
        let now = self.now_ms();
        let screens = self.screens.read().await;
        screens.get(&key(name)).map(|entry| ScreenSnapshot {
            record: entry.record(),
            state: entry.playback.state(),
            duration_ms: entry.playback.duration().as_ms(),
            position_ms: entry.playback.position(now),
        })
    }

    pub async fn screen_count(&self) -> usize {
        self.screens.read().await.len()
    }

    /// Run `f` on one screen, then rebroadcast
    async fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut ScreenEntry, i64) -> T,
    ) -> Result<T, SyncError> {
        let now = self.now_ms();
        let out = {
            let mut screens = self.screens.write().await;
            let entry = screens
                .get_mut(&key(name))
                .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
            f(entry, now)
        };
        self.broadcast().await;
        Ok(out)
    }

    // ---- playback ----

    /// Play from the beginning
    pub async fn play(&self, name: &str) -> Result<(), SyncError> {
        self.update(name, |entry, now| entry.playback.play(now)).await?;
        tracing::info!(screen = %name, "Playback started");
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> Result<(), SyncError> {
        let pos = self
            .update(name, |entry, now| {
                entry.playback.pause(now);
                entry.playback.base_pos_ms()
            })
            .await?;
        tracing::info!(screen = %name, position_ms = pos, "Playback paused");
        Ok(())
    }

    pub async fn resume(&self, name: &str) -> Result<(), SyncError> {
        self.update(name, |entry, now| entry.playback.resume(now)).await?;
        tracing::info!(screen = %name, "Playback resumed");
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<(), SyncError> {
        self.update(name, |entry, _| entry.playback.stop()).await?;
        tracing::info!(screen = %name, "Playback stopped");
        Ok(())
    }

    /// Change a screen's URL, restarting it from 0 if playing
    pub async fn set_url(&self, name: &str, url: impl Into<String>) -> Result<(), SyncError> {
        let url = url.into();
        self.update(name, |entry, now| entry.playback.set_url(url, now))
            .await?;
        tracing::info!(screen = %name, "Screen URL changed");
        Ok(())
    }

    pub async fn set_looping(&self, name: &str, looping: bool) -> Result<(), SyncError> {
        self.update(name, |entry, _| entry.playback.set_looping(looping))
            .await
    }

    pub async fn set_volume(&self, name: &str, volume: f32) -> Result<(), SyncError> {
        self.update(name, |entry, _| entry.playback.set_volume(volume))
            .await
    }

    /// Relative seek; past the end of the media this advances or stops
    pub async fn seek(&self, name: &str, delta_ms: i64) -> Result<SeekOutcome, SyncError> {
        let max = self.config.max_seek.as_millis() as i64;
        let outcome = self
            .update(name, |entry, now| {
                entry
                    .playback
                    .seek(delta_ms, max, now, entry.playlist.as_mut())
            })
            .await?;

        match &outcome {
            SeekOutcome::Moved { from_ms, to_ms } => {
                tracing::info!(screen = %name, from_ms = from_ms, to_ms = to_ms, "Seek");
            }
            SeekOutcome::Advanced(entry) => {
                tracing::info!(
                    screen = %name,
                    index = entry.index,
                    title = %entry.title,
                    "Seek past end, playlist advanced"
                );
            }
            SeekOutcome::Stopped => {
                tracing::info!(screen = %name, "Seek past end, stopped");
            }
        }
        Ok(outcome)
    }

    /// Seek backwards by `ms`
    pub async fn back(&self, name: &str, ms: i64) -> Result<SeekOutcome, SyncError> {
        self.seek(name, -ms.saturating_abs()).await
    }

    // ---- globals ----

    pub async fn globals(&self) -> Globals {
        *self.globals.read().await
    }

    pub async fn set_global_volume(&self, volume: f32) {
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
        self.globals.write().await.global_volume = volume;
        self.broadcast().await;
    }

    pub async fn set_hear_radius(&self, radius: i32) {
        self.globals.write().await.hear_radius = radius.max(0);
        self.broadcast().await;
    }

    // ---- playlists ----

    /// Append `url` to a screen's playlist, creating it if needed
    pub async fn playlist_add(&self, name: &str, url: impl Into<String>) -> Result<usize, SyncError> {
        let url = url.into();
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        let index = entry.playlist.get_or_insert_with(Playlist::new).add(url);
        tracing::info!(screen = %name, index = index, "Playlist entry added");
        Ok(index)
    }

    pub async fn playlist_insert(
        &self,
        name: &str,
        position: usize,
        url: impl Into<String>,
    ) -> Result<usize, SyncError> {
        let url = url.into();
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        Ok(entry
            .playlist
            .get_or_insert_with(Playlist::new)
            .insert(position, url))
    }

    pub async fn playlist_remove(&self, name: &str, index: usize) -> Result<PlaylistEntry, SyncError> {
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        entry
            .playlist
            .as_mut()
            .and_then(|p| p.remove(index))
            .ok_or_else(|| SyncError::PlaylistIndex {
                screen: name.to_string(),
                index,
            })
    }

    pub async fn playlist_clear(&self, name: &str) -> Result<(), SyncError> {
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        entry.playlist = None;
        tracing::info!(screen = %name, "Playlist cleared");
        Ok(())
    }

    pub async fn playlist_set_looping(&self, name: &str, looping: bool) -> Result<(), SyncError> {
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        entry
            .playlist
            .get_or_insert_with(Playlist::new)
            .set_looping(looping);
        Ok(())
    }

    pub async fn playlist_set_enabled(&self, name: &str, enabled: bool) -> Result<(), SyncError> {
        let mut screens = self.screens.write().await;
        let entry = screens
            .get_mut(&key(name))
            .ok_or_else(|| SyncError::ScreenNotFound(name.to_string()))?;
        entry
            .playlist
            .get_or_insert_with(Playlist::new)
            .set_enabled(enabled);
        Ok(())
    }

    /// Copy of a screen's playlist
    pub async fn playlist(&self, name: &str) -> Option<Playlist> {
        let screens = self.screens.read().await;
        screens.get(&key(name)).and_then(|e| e.playlist.clone())
    }

    /// Play entry `index` of the playlist
    pub async fn playlist_play(&self, name: &str, index: usize) -> Result<PlaylistEntry, SyncError> {
        self.playlist_step(name, |p| p.jump_to(index).cloned(), Some(index))
            .await
    }

    pub async fn playlist_next(&self, name: &str) -> Result<PlaylistEntry, SyncError> {
        self.playlist_step(name, |p| p.next().cloned(), None).await
    }

    pub async fn playlist_previous(&self, name: &str) -> Result<PlaylistEntry, SyncError> {
        self.playlist_step(name, |p| p.previous().cloned(), None)
            .await
    }

    async fn playlist_step(
        &self,
        name: &str,
        step: impl FnOnce(&mut Playlist) -> Option<PlaylistEntry>,
        index: Option<usize>,
    ) -> Result<PlaylistEntry, SyncError> {
        let result = self
            .update(name, |entry, now| -> Result<PlaylistEntry, SyncError> {
                let playlist = entry
                    .playlist
                    .as_mut()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| SyncError::PlaylistEmpty(name.to_string()))?;
                let next = step(&mut *playlist).ok_or_else(|| SyncError::PlaylistIndex {
                    screen: name.to_string(),
                    index: index.unwrap_or(playlist.len() + 1),
                })?;
                entry.playback.play_entry(&next, now);
                Ok(next)
            })
            .await?;

        if let Ok(entry) = &result {
            tracing::info!(screen = %name, index = entry.index, title = %entry.title, "Playlist entry playing");
        }
        result
    }

    // ---- durations ----

    /// Apply a duration reported by a client
    pub async fn apply_client_duration(&self, name: &str, duration_ms: i64) -> bool {
        let tolerance = self.config.duration_tolerance_ms;
        let mut screens = self.screens.write().await;
        let Some(entry) = screens.get_mut(&key(name)) else {
            return false;
        };
        let accepted = entry.playback.apply_client_duration(duration_ms, tolerance);
        if accepted {
            tracing::debug!(screen = %name, duration_ms = duration_ms, "Client duration accepted");
        } else {
            tracing::debug!(
                screen = %name,
                duration_ms = duration_ms,
                current = ?entry.playback.duration(),
                "Client duration rejected"
            );
        }
        accepted
    }

    /// Apply a duration measured by the server for `url`
    ///
    /// Ignored if the screen moved on to another URL while probing.
    pub async fn apply_server_duration(&self, name: &str, url: &str, duration_ms: i64) -> bool {
        let mut screens = self.screens.write().await;
        let Some(entry) = screens.get_mut(&key(name)) else {
            return false;
        };
        if entry.playback.url() != url {
            return false;
        }
        let applied = entry.playback.apply_server_duration(duration_ms);
        if applied {
            tracing::info!(screen = %name, duration_ms = duration_ms, "Server duration applied");
        }
        applied
    }

    /// Handle one envelope from a client
    ///
    /// Malformed input is dropped. Video-ended reports are informational;
    /// end of playback is decided by [`tick`](Self::tick).
    pub async fn handle_client_bytes(&self, data: &[u8]) {
        let message = match Message::decode(data, self.config.max_client_packet) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, len = data.len(), "Dropped client packet");
                return;
            }
        };

        match message {
            Message::VideoEnded { name } => {
                tracing::debug!(screen = %name, "Client reported video end (ignored)");
            }
            Message::VideoDuration { name, duration_ms } => {
                self.apply_client_duration(&name, duration_ms).await;
            }
            Message::Sync(_) => {
                tracing::debug!("Dropped sync message from client");
            }
        }
    }

    // ---- authoritative tick ----

    /// End detection and probe scheduling for every screen
    ///
    /// Rebroadcasts when any screen ended.
    pub async fn tick(&self) -> TickReport {
        let now = self.now_ms();
        let guard = self.config.end_guard_ms;
        let probe_after = self.config.probe_after_ms;
        let mut report = TickReport::default();

        {
            let mut screens = self.screens.write().await;
            for entry in screens.values_mut() {
                let playback = &mut entry.playback;
                if !playback.is_playing() || playback.is_looping() {
                    continue;
                }

                if playback.needs_probe(now, probe_after) {
                    playback.mark_probe_pending();
                    report.probes.push(ProbeRequest {
                        screen: entry.spec.name.clone(),
                        url: playback.url().to_string(),
                    });
                }

                if !playback.is_ended(now, guard) {
                    continue;
                }

                let outcome = playback.end(now, entry.playlist.as_mut());
                match &outcome {
                    EndOutcome::Advanced(next) => tracing::info!(
                        screen = %entry.spec.name,
                        index = next.index,
                        title = %next.title,
                        "Video ended, playlist advanced"
                    ),
                    EndOutcome::Stopped => {
                        tracing::info!(screen = %entry.spec.name, "Video ended")
                    }
                }
                report.ended.push((entry.spec.name.clone(), outcome));
            }
        }

        if !report.ended.is_empty() {
            self.broadcast().await;
        }
        report
    }

    // ---- broadcast ----

    /// Current full state as a v2 sync message
    pub async fn snapshot(&self) -> SyncMessage {
        let globals = self.globals().await;
        let screens = self.screens.read().await;
        let mut records: Vec<ScreenRecord> = screens.values().map(ScreenEntry::record).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        SyncMessage::v2(
            globals.global_volume,
            globals.hear_radius,
            self.now_ms(),
            records,
        )
    }

    /// Current full state as an envelope
    pub async fn encode_state(&self) -> Result<Bytes, ProtocolError> {
        Message::Sync(self.snapshot().await).encode()
    }

    /// Subscribe to state broadcasts
    ///
    /// Returns the receiver and the current state for immediate delivery.
    pub async fn subscribe(&self) -> (broadcast::Receiver<Bytes>, Option<Bytes>) {
        let rx = self.tx.subscribe();
        let current = match self.encode_state().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode state for subscriber");
                None
            }
        };
        (rx, current)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Encode and send the full state to every subscriber
    pub async fn broadcast(&self) {
        match self.encode_state().await {
            Ok(bytes) => {
                // No receivers is fine
                let _ = self.tx.send(bytes);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode state"),
        }
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("config", &self.config)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
