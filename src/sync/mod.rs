//! Playback position model
//!
//! The server owns each screen's [`ScreenPlayback`] inside a
//! [`SyncRuntime`] and broadcasts compact anchors; clients turn the latest
//! anchor back into a position with [`ClientSync`].

pub mod anchor;
pub mod client;
pub mod clock;
pub mod playback;
pub mod playlist;
pub mod runtime;

pub use anchor::PlaybackAnchor;
pub use client::{video_duration, video_ended, ClientSync, SyncSnapshot};
pub use clock::{epoch_ms, Clock, ManualClock, SystemClock};
pub use playback::{DurationState, EndOutcome, PlaybackState, ScreenPlayback, SeekOutcome};
pub use playlist::{title_for, Playlist, PlaylistEntry};
pub use runtime::{Globals, ProbeRequest, ScreenSnapshot, ScreenSpec, SyncRuntime, TickReport};
