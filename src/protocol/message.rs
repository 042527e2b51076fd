//! Envelope and message (de)serialization
//!
//! ```text
//! Envelope:  magic[4]="COLL"  length:int32  payload[length]
//! Payload:   msgType:byte  version:int32  body...
//! ```
//!
//! Sync body, version 1:
//! ```text
//! count:int32, count × { name:UTF world:UTF 6×int32 axis:byte url:UTF
//!                        playing:bool loop:bool volume:float32 }
//! ```
//!
//! Sync body, version 2:
//! ```text
//! globalVolume:float32 hearRadius:int32 serverNowMs:int64 count:int32,
//! count × { <v1 entry> startEpochMs:int64 basePosMs:int64 }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::{read_bool, read_f32, read_i32, read_i64, read_u8, read_utf, write_bool, write_utf};
use super::constants::*;
use crate::error::ProtocolError;

/// Screen corner coordinates in world cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub z1: i32,
    pub x2: i32,
    pub y2: i32,
    pub z2: i32,
}

impl Bounds {
    pub fn new(x1: i32, y1: i32, z1: i32, x2: i32, y2: i32, z2: i32) -> Self {
        Self {
            x1,
            y1,
            z1,
            x2,
            y2,
            z2,
        }
    }

    /// Centre of the cell volume
    pub fn center(&self) -> (f64, f64, f64) {
        (
            (self.x1.min(self.x2) + self.x1.max(self.x2) + 1) as f64 * 0.5,
            (self.y1.min(self.y2) + self.y1.max(self.y2) + 1) as f64 * 0.5,
            (self.z1.min(self.z2) + self.z1.max(self.z2) + 1) as f64 * 0.5,
        )
    }

    /// Width and height in cells of the face selected by `axis`
    ///
    /// Axis 0 spans X/Y, 1 spans X/Z, 2 spans Z/Y.
    pub fn face_cells(&self, axis: u8) -> (u32, u32) {
        let dx = self.x1.abs_diff(self.x2) + 1;
        let dy = self.y1.abs_diff(self.y2) + 1;
        let dz = self.z1.abs_diff(self.z2) + 1;
        match axis {
            1 => (dx, dz),
            2 => (dz, dy),
            _ => (dx, dy),
        }
    }

    fn read(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            x1: read_i32(buf)?,
            y1: read_i32(buf)?,
            z1: read_i32(buf)?,
            x2: read_i32(buf)?,
            y2: read_i32(buf)?,
            z2: read_i32(buf)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        for v in [self.x1, self.y1, self.z1, self.x2, self.y2, self.z2] {
            buf.put_i32(v);
        }
    }
}

/// One screen as carried in a sync message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScreenRecord {
    pub name: String,
    pub world: String,
    pub bounds: Bounds,
    /// Face orientation (0 = XY, 1 = XZ, 2 = YZ)
    pub axis: u8,
    pub url: String,
    pub playing: bool,
    pub looping: bool,
    pub volume: f32,
    /// Wall-clock ms when playback (re)started, 0 when not running (v2 only)
    pub start_epoch_ms: i64,
    /// Accumulated position at `start_epoch_ms` (v2 only)
    pub base_pos_ms: i64,
}

impl ScreenRecord {
    fn read(buf: &mut Bytes, version: i32) -> Result<Self, ProtocolError> {
        let name = read_utf(buf)?;
        let world = read_utf(buf)?;
        let bounds = Bounds::read(buf)?;
        let axis = read_u8(buf)?;
        let url = read_utf(buf)?;
        let playing = read_bool(buf)?;
        let looping = read_bool(buf)?;
        let volume = read_f32(buf)?;

        let (start_epoch_ms, base_pos_ms) = if version >= SYNC_VERSION_2 {
            (read_i64(buf)?, read_i64(buf)?)
        } else {
            (0, 0)
        };

        Ok(Self {
            name,
            world,
            bounds,
            axis,
            url,
            playing,
            looping,
            volume,
            start_epoch_ms,
            base_pos_ms,
        })
    }

    fn write(&self, buf: &mut BytesMut, version: i32) -> Result<(), ProtocolError> {
        write_utf(buf, &self.name)?;
        write_utf(buf, &self.world)?;
        self.bounds.write(buf);
        buf.put_u8(self.axis);
        write_utf(buf, &self.url)?;
        write_bool(buf, self.playing);
        write_bool(buf, self.looping);
        buf.put_f32(self.volume);

        if version >= SYNC_VERSION_2 {
            buf.put_i64(self.start_epoch_ms);
            buf.put_i64(self.base_pos_ms);
        }
        Ok(())
    }
}

/// Full state broadcast from the server
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessage {
    /// Wire version (1 or 2)
    pub version: i32,
    pub global_volume: f32,
    pub hear_radius: i32,
    /// Server wall clock at encode time; 0 for v1
    pub server_now_ms: i64,
    pub screens: Vec<ScreenRecord>,
}

impl SyncMessage {
    /// Create a v2 sync message
    pub fn v2(
        global_volume: f32,
        hear_radius: i32,
        server_now_ms: i64,
        screens: Vec<ScreenRecord>,
    ) -> Self {
        Self {
            version: SYNC_VERSION_2,
            global_volume,
            hear_radius,
            server_now_ms,
            screens,
        }
    }

    /// Create a v1 sync message (no globals, no anchor)
    pub fn v1(screens: Vec<ScreenRecord>) -> Self {
        Self {
            version: SYNC_VERSION_1,
            global_volume: DEFAULT_GLOBAL_VOLUME,
            hear_radius: DEFAULT_HEAR_RADIUS,
            server_now_ms: 0,
            screens,
        }
    }

    /// Whether receivers can derive elapsed time from this message
    pub fn has_anchor(&self) -> bool {
        self.version >= SYNC_VERSION_2
    }

    fn read(buf: &mut Bytes, version: i32) -> Result<Self, ProtocolError> {
        let mut msg = match version {
            SYNC_VERSION_1 => Self::v1(Vec::new()),
            SYNC_VERSION_2 => {
                let global_volume = read_f32(buf)?;
                let hear_radius = read_i32(buf)?;
                let server_now_ms = read_i64(buf)?;
                Self::v2(global_volume, hear_radius, server_now_ms, Vec::new())
            }
            _ => {
                return Err(ProtocolError::UnsupportedVersion {
                    msg_type: MSG_SYNC,
                    version,
                })
            }
        };

        let count = read_i32(buf)?;
        if !(0..=MAX_SCREENS).contains(&count) {
            return Err(ProtocolError::BadCount(count));
        }

        // Each entry is at least 37 bytes on the wire; don't trust the count
        // for preallocation beyond what the buffer could hold.
        let hint = (count as usize).min(buf.remaining() / 37);
        msg.screens.reserve(hint);
        for _ in 0..count {
            msg.screens.push(ScreenRecord::read(buf, version)?);
        }
        Ok(msg)
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.has_anchor() {
            buf.put_f32(self.global_volume);
            buf.put_i32(self.hear_radius);
            buf.put_i64(self.server_now_ms);
        }

        let count = i32::try_from(self.screens.len())
            .ok()
            .filter(|c| *c <= MAX_SCREENS)
            .ok_or(ProtocolError::BadCount(i32::MAX))?;
        buf.put_i32(count);

        for screen in &self.screens {
            screen.write(buf, self.version)?;
        }
        Ok(())
    }
}

/// Any message carried by an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server to client: full screen state
    Sync(SyncMessage),
    /// Client to server: playback reached its end locally (informational)
    VideoEnded { name: String },
    /// Client to server: observed media duration
    VideoDuration { name: String, duration_ms: i64 },
}

impl Message {
    /// Message type byte
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Sync(_) => MSG_SYNC,
            Message::VideoEnded { .. } => MSG_VIDEO_ENDED,
            Message::VideoDuration { .. } => MSG_VIDEO_DURATION,
        }
    }

    /// Encode into a complete envelope
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut inner = BytesMut::with_capacity(64);
        inner.put_u8(self.msg_type());

        match self {
            Message::Sync(sync) => {
                inner.put_i32(sync.version);
                sync.write(&mut inner)?;
            }
            Message::VideoEnded { name } => {
                inner.put_i32(PROTOCOL_VERSION);
                write_utf(&mut inner, name)?;
            }
            Message::VideoDuration { name, duration_ms } => {
                inner.put_i32(PROTOCOL_VERSION);
                write_utf(&mut inner, name)?;
                inner.put_i64(*duration_ms);
            }
        }

        if inner.len() > MAX_PACKET_BYTES {
            return Err(ProtocolError::PayloadTooLarge(inner.len()));
        }

        let mut out = BytesMut::with_capacity(ENVELOPE_HEADER_LEN + inner.len());
        out.put_slice(&MAGIC);
        out.put_i32(inner.len() as i32);
        out.put_slice(&inner);
        Ok(out.freeze())
    }

    /// Decode one envelope
    ///
    /// `max_len` bounds the declared payload length; anything larger is
    /// rejected before reading the body. Bytes after the payload are ignored.
    pub fn decode(data: &[u8], max_len: usize) -> Result<Message, ProtocolError> {
        let mut buf = Bytes::copy_from_slice(data);
        if buf.remaining() < ENVELOPE_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: ENVELOPE_HEADER_LEN,
                available: buf.remaining(),
            });
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }

        let len = buf.get_i32();
        if len < 0 || len as usize > max_len {
            return Err(ProtocolError::BadLength(len));
        }
        let len = len as usize;
        if buf.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                available: buf.remaining(),
            });
        }

        let mut inner = buf.split_to(len);
        Self::decode_payload(&mut inner)
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Message, ProtocolError> {
        let msg_type = read_u8(buf)?;
        let version = read_i32(buf)?;

        match msg_type {
            MSG_SYNC => Ok(Message::Sync(SyncMessage::read(buf, version)?)),
            MSG_VIDEO_ENDED | MSG_VIDEO_DURATION if version != PROTOCOL_VERSION => {
                Err(ProtocolError::UnsupportedVersion { msg_type, version })
            }
            MSG_VIDEO_ENDED => Ok(Message::VideoEnded {
                name: read_utf(buf)?,
            }),
            MSG_VIDEO_DURATION => {
                let name = read_utf(buf)?;
                let duration_ms = read_i64(buf)?;
                Ok(Message::VideoDuration { name, duration_ms })
            }
            other => Err(ProtocolError::UnknownMessage(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_screen(name: &str) -> ScreenRecord {
        ScreenRecord {
            name: name.into(),
            world: "world".into(),
            bounds: Bounds::new(-10, 64, 3, 5, 72, 3),
            axis: 0,
            url: "https://cdn.example.com/clip.mp4".into(),
            playing: true,
            looping: false,
            volume: 0.75,
            start_epoch_ms: 1_700_000_000_123,
            base_pos_ms: 42_500,
        }
    }

    #[test]
    fn test_v2_sync_roundtrip() {
        let msg = Message::Sync(SyncMessage::v2(
            1.5,
            64,
            1_700_000_005_000,
            vec![sample_screen("Lobby"), sample_screen("cinema")],
        ));

        let encoded = msg.encode().unwrap();
        assert_eq!(&encoded[..4], b"COLL");

        let decoded = Message::decode(&encoded, MAX_PACKET_BYTES).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_v1_sync_has_no_anchor() {
        let mut screen = sample_screen("lobby");
        let msg = Message::Sync(SyncMessage::v1(vec![screen.clone()]));

        let decoded = Message::decode(&msg.encode().unwrap(), MAX_PACKET_BYTES).unwrap();
        let Message::Sync(sync) = decoded else {
            panic!("expected sync");
        };

        assert!(!sync.has_anchor());
        assert_eq!(sync.server_now_ms, 0);
        assert_eq!(sync.global_volume, DEFAULT_GLOBAL_VOLUME);
        assert_eq!(sync.hear_radius, DEFAULT_HEAR_RADIUS);

        // Anchor fields are not carried by v1
        screen.start_epoch_ms = 0;
        screen.base_pos_ms = 0;
        assert_eq!(sync.screens, vec![screen]);
    }

    #[test]
    fn test_client_messages_roundtrip() {
        let ended = Message::VideoEnded {
            name: "lobby".into(),
        };
        let duration = Message::VideoDuration {
            name: "lobby".into(),
            duration_ms: 124_000,
        };

        for msg in [ended, duration] {
            let encoded = msg.encode().unwrap();
            assert!(encoded.len() - ENVELOPE_HEADER_LEN <= MAX_CLIENT_PACKET_BYTES);
            assert_eq!(Message::decode(&encoded, MAX_CLIENT_PACKET_BYTES).unwrap(), msg);
        }
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let encoded = Message::Sync(SyncMessage::v2(1.0, 100, 5, vec![sample_screen("a")]))
            .encode()
            .unwrap();

        // Declared length exceeds what is actually present
        let cut = &encoded[..encoded.len() - 3];
        assert!(matches!(
            Message::decode(cut, MAX_PACKET_BYTES),
            Err(ProtocolError::Truncated { .. })
        ));

        // Header only
        assert!(matches!(
            Message::decode(&encoded[..6], MAX_PACKET_BYTES),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut encoded = Message::VideoEnded { name: "a".into() }
            .encode()
            .unwrap()
            .to_vec();
        encoded[0] = b'X';
        assert!(matches!(
            Message::decode(&encoded, MAX_PACKET_BYTES),
            Err(ProtocolError::BadMagic(_))
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"COLL");
        data.extend_from_slice(&(MAX_PACKET_BYTES as i32 + 1).to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        assert_eq!(
            Message::decode(&data, MAX_PACKET_BYTES),
            Err(ProtocolError::BadLength(MAX_PACKET_BYTES as i32 + 1))
        );

        let mut data = Vec::new();
        data.extend_from_slice(b"COLL");
        data.extend_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            Message::decode(&data, MAX_PACKET_BYTES),
            Err(ProtocolError::BadLength(-1))
        );
    }

    #[test]
    fn test_client_limit_applies() {
        let msg = Message::VideoEnded {
            name: "n".repeat(2000),
        };
        let encoded = msg.encode().unwrap();
        assert!(matches!(
            Message::decode(&encoded, MAX_CLIENT_PACKET_BYTES),
            Err(ProtocolError::BadLength(_))
        ));
    }

    #[test]
    fn test_bad_count_rejected() {
        let mut inner = BytesMut::new();
        inner.put_u8(MSG_SYNC);
        inner.put_i32(SYNC_VERSION_1);
        inner.put_i32(MAX_SCREENS + 1);

        let mut data = BytesMut::new();
        data.put_slice(&MAGIC);
        data.put_i32(inner.len() as i32);
        data.put_slice(&inner);

        assert_eq!(
            Message::decode(&data, MAX_PACKET_BYTES),
            Err(ProtocolError::BadCount(MAX_SCREENS + 1))
        );
    }

    #[test]
    fn test_unknown_message_and_version() {
        let wrap = |inner: &[u8]| {
            let mut data = BytesMut::new();
            data.put_slice(&MAGIC);
            data.put_i32(inner.len() as i32);
            data.put_slice(inner);
            data
        };

        let mut inner = BytesMut::new();
        inner.put_u8(9);
        inner.put_i32(PROTOCOL_VERSION);
        assert_eq!(
            Message::decode(&wrap(&inner), MAX_PACKET_BYTES),
            Err(ProtocolError::UnknownMessage(9))
        );

        let mut inner = BytesMut::new();
        inner.put_u8(MSG_VIDEO_DURATION);
        inner.put_i32(1);
        assert_eq!(
            Message::decode(&wrap(&inner), MAX_PACKET_BYTES),
            Err(ProtocolError::UnsupportedVersion {
                msg_type: MSG_VIDEO_DURATION,
                version: 1
            })
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut data = Message::VideoEnded { name: "a".into() }
            .encode()
            .unwrap()
            .to_vec();
        data.extend_from_slice(&[0xDE, 0xAD]);
        assert_eq!(
            Message::decode(&data, MAX_PACKET_BYTES).unwrap(),
            Message::VideoEnded { name: "a".into() }
        );
    }

    #[test]
    fn test_face_cells() {
        let bounds = Bounds::new(0, 60, 4, 7, 63, 4);
        assert_eq!(bounds.face_cells(0), (8, 4));
        assert_eq!(bounds.face_cells(1), (8, 1));
        assert_eq!(bounds.face_cells(2), (1, 4));
        assert_eq!(bounds.center(), (4.0, 62.0, 4.5));
    }
}
