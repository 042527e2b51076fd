//! Audio output for decode sessions
//!
//! PCM is always signed 16-bit little-endian at the stream's native rate,
//! mono or stereo. Device access sits behind [`AudioDevice`] so hosts
//! without audio (and tests) can run sessions video-only.

pub mod device;
pub mod pcm;
#[cfg(feature = "cpal")]
pub mod platform;
pub mod sink;

pub use device::{AudioDevice, AudioFormat, AudioOutput, NullDevice};
pub use pcm::{scale_clamp, to_pcm16le, SampleBlock};
#[cfg(feature = "cpal")]
pub use platform::CpalDevice;
pub use sink::{AudioControl, AudioSink};
