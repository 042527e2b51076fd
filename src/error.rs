//! Error types
//!
//! Each area of the pipeline has its own error enum. None of them ever cross
//! a playback session boundary: the producer logs them and reports the
//! session as ended, and protocol receivers drop the offending envelope.

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or unsupported wire input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("bad envelope length {0}")]
    BadLength(i32),

    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("screen count {0} out of range")]
    BadCount(i32),

    #[error("unknown message type {0}")]
    UnknownMessage(u8),

    #[error("unsupported version {version} for message type {msg_type}")]
    UnsupportedVersion { msg_type: u8, version: i32 },

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("string of {0} bytes does not fit a 2-byte length prefix")]
    StringTooLong(usize),

    #[error("payload of {0} bytes exceeds the envelope limit")]
    PayloadTooLarge(usize),
}

/// Failure of one decode attempt
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("failed to probe {url}: {reason}")]
    Probe { url: String, reason: String },

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("decode failed: {0}")]
    Grab(String),

    #[error("stream reports invalid dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("session cancelled")]
    Cancelled,
}

/// Failure to turn a source URL into a directly decodable one
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("http probe failed: {0}")]
    Http(String),

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),

    #[error("resolver failed: {0}")]
    Resolver(String),
}

/// Audio output could not be used
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Rejected playback command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("screen not found: {0}")]
    ScreenNotFound(String),

    #[error("screen already exists: {0}")]
    ScreenExists(String),

    #[error("playlist of {screen} has no entry {index}")]
    PlaylistIndex { screen: String, index: usize },

    #[error("playlist of {0} is empty")]
    PlaylistEmpty(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_converts() {
        let err: Error = ProtocolError::BadCount(-1).into();
        assert!(matches!(err, Error::Protocol(ProtocolError::BadCount(-1))));
        assert_eq!(
            err.to_string(),
            "protocol error: screen count -1 out of range"
        );
    }

    #[test]
    fn test_truncated_message() {
        let err = ProtocolError::Truncated {
            needed: 8,
            available: 3,
        };
        assert_eq!(err.to_string(), "truncated input: need 8 bytes, have 3");
    }
}
