//! Playback client
//!
//! Turns sync messages from the server into decode sessions:
//! - [`ScreenManager`] keeps one [`VideoScreen`] per screen in the latest sync
//! - each [`VideoScreen`] owns a producer and a render pacer
//! - duration and end-of-video reports are queued for the caller to send

pub mod config;
pub mod manager;
pub mod screen;

pub use config::PlayerConfig;
pub use manager::ScreenManager;
pub use screen::{Listener, PlaybackEnv, VideoScreen};
