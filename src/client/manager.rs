//! Applies server sync messages to the local screens

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::config::PlayerConfig;
use super::screen::{Listener, PlaybackEnv, VideoScreen};
use crate::audio::AudioDevice;
use crate::decode::{DecodeContext, MediaBackend};
use crate::media::{Surface, TickOutcome};
use crate::resolve::Resolver;
use crate::stats::TickStats;
use crate::sync::ClientSync;

/// Every screen known to this client
#[derive(Debug)]
pub struct ScreenManager {
    config: PlayerConfig,
    ctx: Arc<DecodeContext>,
    sync: ClientSync,
    screens: HashMap<String, VideoScreen>,
    listener: Option<Listener>,
    stats: TickStats,
}

impl ScreenManager {
    /// Create a manager with its own resolver
    pub fn new(
        config: PlayerConfig,
        backend: Arc<dyn MediaBackend>,
        audio: Arc<dyn AudioDevice>,
    ) -> Self {
        let ctx = Arc::new(DecodeContext {
            backend,
            audio,
            resolver: Arc::new(Resolver::new(&config.resolver)),
            config: config.producer.clone(),
        });
        Self::with_context(config, ctx)
    }

    /// Create a manager sharing an existing decode context
    pub fn with_context(config: PlayerConfig, ctx: Arc<DecodeContext>) -> Self {
        Self {
            config,
            ctx,
            sync: ClientSync::new(),
            screens: HashMap::new(),
            listener: None,
            stats: TickStats::new("client"),
        }
    }

    pub fn set_listener(&mut self, listener: Option<Listener>) {
        self.listener = listener;
    }

    pub fn sync(&self) -> &ClientSync {
        &self.sync
    }

    pub fn screen(&self, name: &str) -> Option<&VideoScreen> {
        self.screens.get(&name.to_lowercase())
    }

    pub fn screen_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.screens.values().map(|s| s.name().to_string()).collect();
        names.sort();
        names
    }

    /// Position of `name` at local time `local_now_ms`
    pub fn position_ms(&self, name: &str, local_now_ms: i64) -> Option<i64> {
        self.sync.position_ms(name, local_now_ms)
    }

    /// Apply an envelope from the server
    ///
    /// Returns false if it was dropped.
    pub fn receive(&mut self, data: &[u8], local_now_ms: i64) -> bool {
        let Some(snapshot) = self.sync.receive(data, local_now_ms) else {
            return false;
        };

        let names: HashSet<String> = snapshot
            .screens()
            .iter()
            .map(|r| r.name.to_lowercase())
            .collect();
        self.screens.retain(|key, screen| {
            let keep = names.contains(key);
            if !keep {
                tracing::info!(screen = %screen.name(), "Screen removed");
                screen.stop();
            }
            keep
        });

        for record in snapshot.screens() {
            let anchor = snapshot.anchor_of(record);
            match self.screens.entry(record.name.to_lowercase()) {
                Entry::Occupied(entry) => entry.into_mut().update(record.clone(), anchor),
                Entry::Vacant(entry) => {
                    tracing::debug!(screen = %record.name, "Screen added");
                    entry.insert(VideoScreen::new(
                        record.clone(),
                        anchor,
                        Arc::clone(&self.ctx),
                        &self.config,
                    ));
                }
            }
        }

        self.tick(local_now_ms);
        true
    }

    /// Re-evaluate range, gain and sessions for every screen
    pub fn tick(&mut self, local_now_ms: i64) {
        let started = Instant::now();
        let Some(snapshot) = self.sync.snapshot() else {
            return;
        };

        let env = PlaybackEnv {
            listener: self.listener.as_ref(),
            hear_radius: snapshot.hear_radius(),
            global_volume: snapshot.global_volume(),
            server_now_ms: snapshot.server_now(local_now_ms),
        };
        for screen in self.screens.values_mut() {
            screen.tick_playback(&env);
        }

        self.stats.record(started, Instant::now());
    }

    /// Render tick for one screen
    pub fn render<S: Surface + ?Sized>(
        &mut self,
        name: &str,
        now: Instant,
        surface: &mut S,
    ) -> Option<TickOutcome> {
        let screen = self.screens.get_mut(&name.to_lowercase())?;
        Some(screen.render(now, surface))
    }

    /// Reports for the server from every screen
    pub fn take_outgoing(&mut self) -> Vec<Bytes> {
        self.screens
            .values_mut()
            .flat_map(|s| s.take_outgoing())
            .collect()
    }

    pub fn stop_all(&mut self) {
        for screen in self.screens.values_mut() {
            screen.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::screen::tests::{context, record, short_clip};
    use crate::media::MemorySurface;
    use crate::protocol::{Message, SyncMessage};

    const T0: i64 = 1_700_000_000_000;

    fn manager() -> ScreenManager {
        let config = PlayerConfig::default().watermarks(2, 8);
        ScreenManager::with_context(config, context(short_clip()))
    }

    fn sync(records: Vec<crate::protocol::ScreenRecord>, radius: i32) -> Bytes {
        Message::Sync(SyncMessage::v2(1.0, radius, T0, records))
            .encode()
            .unwrap()
    }

    #[test]
    fn test_sync_creates_and_removes_screens() {
        let mut manager = manager();
        assert!(manager.receive(&sync(vec![record(true, T0)], 100), T0));
        assert_eq!(manager.screen_names(), vec!["lobby".to_string()]);
        assert!(manager.screen("LOBBY").unwrap().is_active());

        assert!(manager.receive(&sync(vec![], 100), T0 + 1_000));
        assert!(manager.screen("lobby").is_none());
    }

    #[test]
    fn test_dropped_packet_keeps_screens() {
        let mut manager = manager();
        manager.receive(&sync(vec![record(false, 0)], 100), T0);
        assert!(!manager.receive(b"COLL\x00\x00\x00\x10", T0));
        assert!(manager.screen("lobby").is_some());
        assert!(!manager.screen("lobby").unwrap().is_active());
    }

    #[test]
    fn test_listener_moves_out_of_range() {
        let mut manager = manager();
        manager.set_listener(Some(Listener::new("world", 5.0, 1.0, 0.0)));
        manager.receive(&sync(vec![record(true, T0)], 50), T0);
        assert!(manager.screen("lobby").unwrap().is_active());

        manager.set_listener(Some(Listener::new("world", 400.0, 1.0, 0.0)));
        manager.tick(T0 + 100);
        assert!(!manager.screen("lobby").unwrap().is_active());
    }

    #[test]
    fn test_reports_collected_after_end() {
        let mut manager = manager();
        manager.receive(&sync(vec![record(true, T0)], 100), T0);

        let mut surface = MemorySurface::default();
        let started = Instant::now();
        let mut stopped = false;
        while started.elapsed() < Duration::from_secs(5) {
            if manager.render("lobby", Instant::now(), &mut surface) == Some(TickOutcome::Stopped) {
                stopped = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(stopped);

        let outgoing = manager.take_outgoing();
        assert_eq!(outgoing.len(), 2);
        assert!(manager.take_outgoing().is_empty());
        assert_eq!(manager.render("missing", Instant::now(), &mut surface), None);
    }
}
