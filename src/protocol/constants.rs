//! Wire protocol constants

/// Envelope magic
pub const MAGIC: [u8; 4] = *b"COLL";

/// Envelope header size (magic + length)
pub const ENVELOPE_HEADER_LEN: usize = 8;

/// Current protocol version for client-to-server messages
pub const PROTOCOL_VERSION: i32 = 2;

/// Sync payload without time anchor
pub const SYNC_VERSION_1: i32 = 1;

/// Sync payload with shared time anchor
pub const SYNC_VERSION_2: i32 = 2;

// Message types
pub const MSG_SYNC: u8 = 1;
pub const MSG_VIDEO_ENDED: u8 = 2;
pub const MSG_VIDEO_DURATION: u8 = 3;

/// Largest envelope payload accepted from the server
pub const MAX_PACKET_BYTES: usize = 5_000_000;

/// Largest envelope payload accepted from a client
pub const MAX_CLIENT_PACKET_BYTES: usize = 1024;

/// Upper bound on screens in one sync message
pub const MAX_SCREENS: i32 = 10_000;

/// Globals assumed when a v1 sync carries none
pub const DEFAULT_GLOBAL_VOLUME: f32 = 1.0;
pub const DEFAULT_HEAR_RADIUS: i32 = 100;
