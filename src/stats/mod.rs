//! Playback and tick statistics

pub mod metrics;

pub use metrics::{DecodeStats, PacerStats, PeakReport, TickStats, REPORT_INTERVAL};
