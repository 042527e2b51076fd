//! Decode producer
//!
//! One [`Producer`] per screen owns a background thread that resolves the
//! source, opens it through a [`MediaBackend`], seeks to the requested start
//! and feeds converted frames to a [`FrameSink`](crate::media::FrameSink).
//! Audio goes straight to the output device and paces the whole session.

pub mod backend;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod options;
pub mod producer;
pub mod seek;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{DecodedUnit, MediaBackend, MediaStream, StreamInfo, VideoImage};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegBackend;
pub use options::NetOptions;
pub use producer::{DecodeContext, Producer, ProducerConfig, SessionRequest};
pub use seek::{effective_seek_ms, seek_to, skip_budget, SeekOutcome, SkipLimits};
