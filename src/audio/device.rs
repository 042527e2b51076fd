//! Audio output seam

use crate::error::AudioError;

/// Default sample rate when the stream does not report one
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default channel count when the stream does not report one
pub const DEFAULT_CHANNELS: u16 = 2;

/// 16-bit signed little-endian PCM format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Build a format from stream parameters
    ///
    /// Non-positive values fall back to 48 kHz stereo; channels are capped
    /// at 2.
    pub fn from_stream(sample_rate: i32, channels: i32) -> Self {
        let sample_rate = u32::try_from(sample_rate)
            .ok()
            .filter(|r| *r > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE);
        let channels = u16::try_from(channels)
            .ok()
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CHANNELS)
            .min(2);
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per interleaved sample frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }
}

/// Something that can open PCM outputs
pub trait AudioDevice: Send + Sync {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn AudioOutput>, AudioError>;
}

/// An open PCM output line
///
/// Writes never block: callers check [`available`](Self::available) and
/// retry later when the device buffer is full.
pub trait AudioOutput: Send {
    /// Begin draining written samples
    fn start(&mut self);

    /// Bytes that can be written without blocking
    fn available(&self) -> usize;

    /// Write up to `pcm.len()` bytes, returning how many were accepted
    fn write(&mut self, pcm: &[u8]) -> usize;

    /// Playback position of the device in microseconds
    fn position_us(&self) -> i64;

    /// Stop, discard buffered audio and release the device
    fn close(&mut self);
}

/// Device for hosts without audio output
///
/// Every open fails, so sessions run video-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDevice;

impl AudioDevice for NullDevice {
    fn open(&self, _format: AudioFormat) -> Result<Box<dyn AudioOutput>, AudioError> {
        Err(AudioError::NoDevice)
    }
}
