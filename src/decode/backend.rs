//! Decode library seam
//!
//! Container parsing and codecs are delegated to an external library. The
//! producer only needs metadata probing, a scaled BGR24 video path, 16-bit
//! PCM audio and a coarse seek.

use super::options::NetOptions;
use crate::audio::SampleBlock;
use crate::error::DecodeError;

/// Metadata captured by a probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: i32,
    pub height: i32,
    /// Frames per second, non-positive when unknown
    pub fps: f64,
    /// Milliseconds, 0 when unknown
    pub duration_ms: i64,
}

/// One scaled BGR24 picture
#[derive(Debug, Clone, Default)]
pub struct VideoImage {
    pub data: Vec<u8>,
    /// Byte distance between rows, 0 when tightly packed
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

/// A unit produced by [`MediaStream::grab`]
#[derive(Debug, Clone)]
pub enum DecodedUnit {
    Video {
        image: VideoImage,
        /// Stream timestamp in microseconds, negative when unknown
        timestamp_us: i64,
    },
    Audio {
        block: SampleBlock,
        timestamp_us: i64,
    },
}

impl DecodedUnit {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            DecodedUnit::Video { timestamp_us, .. } | DecodedUnit::Audio { timestamp_us, .. } => {
                *timestamp_us
            }
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, DecodedUnit::Audio { .. })
    }
}

/// Opens probe and decode sessions
///
/// Every call may block on the network and must only run on a producer
/// thread.
pub trait MediaBackend: Send + Sync {
    /// Open a metadata-only session
    fn probe(&self, url: &str, options: &NetOptions) -> Result<StreamInfo, DecodeError>;

    /// Open a decode session scaling video to `width` x `height`
    fn open(
        &self,
        url: &str,
        width: u32,
        height: u32,
        options: &NetOptions,
    ) -> Result<Box<dyn MediaStream>, DecodeError>;
}

/// An open decode session
pub trait MediaStream: Send {
    /// Coarse seek to a stream timestamp in microseconds
    fn seek(&mut self, timestamp_us: i64) -> Result<(), DecodeError>;

    /// Timestamp of the last decoded unit, negative when unknown
    fn position_us(&self) -> i64;

    /// Decode the next unit; `Ok(None)` at end of stream
    fn grab(&mut self) -> Result<Option<DecodedUnit>, DecodeError>;

    /// Native sample rate and channel count, `None` without an audio track
    fn audio_params(&self) -> Option<(i32, i32)>;

    /// Frame rate reported by the stream, non-positive when unknown
    fn frame_rate(&self) -> f64;
}
