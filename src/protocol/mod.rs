//! Wire protocol
//!
//! Compact big-endian framing shared by the authoritative server and the
//! playback clients. Every message travels in a `COLL` envelope; malformed
//! input is reported as a [`ProtocolError`](crate::error::ProtocolError) and
//! receivers drop it without answering the peer.

pub mod codec;
pub mod constants;
pub mod message;

pub use message::{Bounds, Message, ScreenRecord, SyncMessage};
