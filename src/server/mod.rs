//! Authoritative sync server
//!
//! [`SyncRuntime`](crate::sync::SyncRuntime) holds the state; this module
//! adds what runs around it: configuration, the periodic tick, the external
//! duration probe and a TCP listener that fans broadcasts out to clients.

pub mod config;
pub mod listener;
pub mod probe;
pub mod ticker;

pub use config::ServerConfig;
pub use listener::SyncServer;
pub use probe::{parse_seconds, CommandProbe, DurationProbe};
pub use ticker::{run_until, spawn_probe, spawn_ticker};
