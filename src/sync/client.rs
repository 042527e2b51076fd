//! Receiver side of the sync protocol
//!
//! A client never interprets the server's anchor with its own wall clock.
//! It records the local time a sync arrived and estimates server time as
//! `serverNowMs + (localNow - localReceipt)`. Transit time before receipt is
//! not compensated. v1 messages carry no anchor, so a playing v1 screen is
//! taken to have just started when the message arrived.

use bytes::Bytes;

use super::anchor::PlaybackAnchor;
use crate::error::ProtocolError;
use crate::protocol::constants::MAX_PACKET_BYTES;
use crate::protocol::{Message, ScreenRecord, SyncMessage};

/// A received sync message and when it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub message: SyncMessage,
    /// Local wall clock at receipt
    pub received_at_ms: i64,
}

impl SyncSnapshot {
    pub fn new(message: SyncMessage, received_at_ms: i64) -> Self {
        Self {
            message,
            received_at_ms,
        }
    }

    pub fn global_volume(&self) -> f32 {
        self.message.global_volume.max(0.0)
    }

    pub fn hear_radius(&self) -> i32 {
        self.message.hear_radius
    }

    pub fn screens(&self) -> &[ScreenRecord] {
        &self.message.screens
    }

    pub fn record(&self, name: &str) -> Option<&ScreenRecord> {
        let name = name.to_lowercase();
        self.message
            .screens
            .iter()
            .find(|r| r.name.to_lowercase() == name)
    }

    /// Estimated server wall clock at local time `local_now_ms`
    ///
    /// Without an anchor the local clock stands in for the server's.
    pub fn server_now(&self, local_now_ms: i64) -> i64 {
        if !self.message.has_anchor() {
            return local_now_ms;
        }
        let since = local_now_ms.saturating_sub(self.received_at_ms).max(0);
        self.message.server_now_ms.saturating_add(since)
    }

    /// Anchor of `record` on the [`server_now`](Self::server_now) timeline
    pub fn anchor_of(&self, record: &ScreenRecord) -> PlaybackAnchor {
        let anchor = if !record.playing {
            PlaybackAnchor::frozen(if self.message.has_anchor() {
                record.base_pos_ms
            } else {
                0
            })
        } else if self.message.has_anchor() && record.start_epoch_ms > 0 {
            PlaybackAnchor::running(record.start_epoch_ms, record.base_pos_ms)
        } else {
            // Just started
            PlaybackAnchor::running(self.server_now(self.received_at_ms), record.base_pos_ms)
        };
        anchor
            .with_looping(record.looping)
            .with_gain(record.volume)
    }

    pub fn anchor(&self, name: &str) -> Option<PlaybackAnchor> {
        self.record(name).map(|r| self.anchor_of(r))
    }

    /// Media position of `name` at local time `local_now_ms`
    pub fn position_ms(&self, name: &str, local_now_ms: i64) -> Option<i64> {
        let anchor = self.anchor(name)?;
        Some(anchor.position(self.server_now(local_now_ms)))
    }
}

/// Latest state received from the server
#[derive(Debug, Default)]
pub struct ClientSync {
    snapshot: Option<SyncSnapshot>,
}

impl ClientSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one envelope received at `local_now_ms`
    ///
    /// Returns the new snapshot, or `None` if the envelope was dropped.
    pub fn receive(&mut self, data: &[u8], local_now_ms: i64) -> Option<&SyncSnapshot> {
        match Message::decode(data, MAX_PACKET_BYTES) {
            Ok(Message::Sync(message)) => {
                tracing::trace!(
                    version = message.version,
                    screens = message.screens.len(),
                    "Sync received"
                );
                self.snapshot = Some(SyncSnapshot::new(message, local_now_ms));
                self.snapshot.as_ref()
            }
            Ok(other) => {
                tracing::debug!(msg_type = other.msg_type(), "Dropped unexpected message");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, len = data.len(), "Dropped sync packet");
                None
            }
        }
    }

    pub fn snapshot(&self) -> Option<&SyncSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn position_ms(&self, name: &str, local_now_ms: i64) -> Option<i64> {
        self.snapshot.as_ref()?.position_ms(name, local_now_ms)
    }
}

/// Envelope telling the server a screen's video ended locally
pub fn video_ended(name: &str) -> Result<Bytes, ProtocolError> {
    Message::VideoEnded {
        name: name.to_string(),
    }
    .encode()
}

/// Envelope reporting the duration a client observed
pub fn video_duration(name: &str, duration_ms: i64) -> Result<Bytes, ProtocolError> {
    Message::VideoDuration {
        name: name.to_string(),
        duration_ms,
    }
    .encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Bounds;

    const SERVER_T0: i64 = 1_700_000_000_000;
    // Receiver clock runs 7 minutes behind the server
    const LOCAL_T0: i64 = SERVER_T0 - 420_000;

    fn record(playing: bool, start: i64, base: i64) -> ScreenRecord {
        ScreenRecord {
            name: "Lobby".into(),
            world: "world".into(),
            bounds: Bounds::new(0, 64, 0, 7, 67, 0),
            axis: 0,
            url: "https://cdn.example/a.mp4".into(),
            playing,
            looping: false,
            volume: 0.8,
            start_epoch_ms: start,
            base_pos_ms: base,
        }
    }

    fn envelope(message: SyncMessage) -> Bytes {
        Message::Sync(message).encode().unwrap()
    }

    #[test]
    fn test_v2_position_ignores_clock_skew() {
        let mut client = ClientSync::new();
        let sync = SyncMessage::v2(
            1.0,
            100,
            SERVER_T0,
            vec![record(true, SERVER_T0 - 10_000, 2_000)],
        );
        client.receive(&envelope(sync), LOCAL_T0).unwrap();

        assert_eq!(client.position_ms("lobby", LOCAL_T0), Some(12_000));
        assert_eq!(client.position_ms("LOBBY", LOCAL_T0 + 5_000), Some(17_000));
    }

    #[test]
    fn test_v2_paused_is_frozen() {
        let mut client = ClientSync::new();
        let sync = SyncMessage::v2(1.0, 100, SERVER_T0, vec![record(false, 0, 33_000)]);
        client.receive(&envelope(sync), LOCAL_T0).unwrap();
        assert_eq!(client.position_ms("lobby", LOCAL_T0 + 60_000), Some(33_000));
    }

    #[test]
    fn test_v1_assumes_just_started() {
        let mut client = ClientSync::new();
        client
            .receive(&envelope(SyncMessage::v1(vec![record(true, 0, 0)])), LOCAL_T0)
            .unwrap();

        assert_eq!(client.position_ms("lobby", LOCAL_T0), Some(0));
        assert_eq!(client.position_ms("lobby", LOCAL_T0 + 2_500), Some(2_500));
        let anchor = client.snapshot().unwrap().anchor("lobby").unwrap();
        assert_eq!(anchor.gain, 0.8);
    }

    #[test]
    fn test_bad_input_keeps_previous_state() {
        let mut client = ClientSync::new();
        let good = envelope(SyncMessage::v2(0.5, 32, SERVER_T0, vec![record(false, 0, 0)]));
        client.receive(&good, LOCAL_T0).unwrap();

        assert!(client.receive(&good[..good.len() - 1], LOCAL_T0).is_none());
        assert!(client.receive(b"junk", LOCAL_T0).is_none());
        assert!(client.receive(&video_ended("lobby").unwrap(), LOCAL_T0).is_none());

        let snapshot = client.snapshot().unwrap();
        assert_eq!(snapshot.global_volume(), 0.5);
        assert_eq!(snapshot.hear_radius(), 32);
    }

    #[test]
    fn test_reports() {
        let bytes = video_duration("lobby", 61_000).unwrap();
        assert_eq!(
            Message::decode(&bytes, 1024).unwrap(),
            Message::VideoDuration {
                name: "lobby".into(),
                duration_ms: 61_000
            }
        );
    }
}
