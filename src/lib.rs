//! Synchronized network video playback for in-world screens
//!
//! A server keeps the authoritative playback timeline of every screen and
//! broadcasts it as compact anchors. Each client decodes the source itself
//! and joins the timeline at the position the anchor implies.
//!
//! ```text
//!   server:  SyncRuntime ──tick──► end detection, duration probes
//!                │
//!                └─ broadcast (COLL envelopes) ─────────────┐
//!                                                           ▼
//!   client:  ScreenManager ─► VideoScreen ─► Producer ─► ScreenSink ─► RenderPacer ─► Surface
//!                                             │
//!                                             └─► AudioSink ─► device
//! ```
//!
//! Decoding goes through the [`decode::MediaBackend`] seam; the `ffmpeg`
//! feature provides a real backend and the `cpal` feature a real audio
//! device.

pub mod audio;
pub mod client;
pub mod decode;
pub mod error;
pub mod media;
pub mod protocol;
pub mod resolve;
pub mod server;
pub mod stats;
pub mod sync;

pub use error::{Error, Result};
