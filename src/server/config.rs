//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the sync listener binds to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// Period of the authoritative tick (end detection, probes)
    pub tick_interval: Duration,

    /// Largest relative seek accepted, in either direction
    pub max_seek: Duration,

    /// A video counts as ended this many ms before its duration
    pub end_guard_ms: i64,

    /// Client duration reports further than this from the known value are rejected
    pub duration_tolerance_ms: i64,

    /// Probe an unknown duration once the position passes this many ms
    pub probe_after_ms: i64,

    /// Upper bound for one external duration probe
    pub probe_timeout: Duration,

    /// Program used to probe direct media URLs
    pub ffprobe_path: String,

    /// Program used to probe video-sharing links
    pub ytdlp_path: String,

    /// Capacity of the state broadcast channel
    pub broadcast_capacity: usize,

    /// Largest client envelope payload accepted
    pub max_client_packet: usize,

    /// Hear radius at startup (0 = unlimited)
    pub default_hear_radius: i32,

    /// Global volume at startup
    pub default_global_volume: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7270)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            tick_interval: Duration::from_secs(2),
            max_seek: Duration::from_secs(3600),
            end_guard_ms: 1_000,
            duration_tolerance_ms: 5_000,
            probe_after_ms: 5_000,
            probe_timeout: Duration::from_secs(30),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            broadcast_capacity: 64,
            max_client_packet: MAX_CLIENT_PACKET_BYTES,
            default_hear_radius: DEFAULT_HEAR_RADIUS,
            default_global_volume: DEFAULT_GLOBAL_VOLUME,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the authoritative tick period
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the largest accepted relative seek
    pub fn max_seek(mut self, max: Duration) -> Self {
        self.max_seek = max;
        self
    }

    /// Set the end-of-video guard
    pub fn end_guard_ms(mut self, ms: i64) -> Self {
        self.end_guard_ms = ms.max(0);
        self
    }

    /// Set the external probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the probe programs
    pub fn probe_programs(mut self, ffprobe: impl Into<String>, ytdlp: impl Into<String>) -> Self {
        self.ffprobe_path = ffprobe.into();
        self.ytdlp_path = ytdlp.into();
        self
    }

    /// Set the startup hear radius
    pub fn hear_radius(mut self, radius: i32) -> Self {
        self.default_hear_radius = radius.max(0);
        self
    }

    /// Set the startup global volume
    pub fn global_volume(mut self, volume: f32) -> Self {
        self.default_global_volume = volume.max(0.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(2));
        assert_eq!(config.max_seek.as_millis(), 3_600_000);
        assert_eq!(config.max_client_packet, 1024);
        assert_eq!(config.default_hear_radius, 100);
    }

    #[test]
    fn test_builder_clamps() {
        let config = ServerConfig::default()
            .hear_radius(-5)
            .global_volume(-1.0)
            .end_guard_ms(-10);
        assert_eq!(config.default_hear_radius, 0);
        assert_eq!(config.default_global_volume, 0.0);
        assert_eq!(config.end_guard_ms, 0);
    }
}
