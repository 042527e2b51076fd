//! Network resilience options passed to the decode library

use std::time::Duration;

/// Options applied to every probe and decode session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetOptions {
    /// Reconnect dropped HTTP connections
    pub reconnect: bool,

    /// Also reconnect streams without a known length
    pub reconnect_streamed: bool,

    /// Maximum delay between reconnect attempts
    pub reconnect_delay_max: Duration,

    /// Read/write timeout for a single network operation
    pub rw_timeout: Duration,

    /// Bytes read while detecting the stream format
    pub probe_size: u64,

    /// Time analysed while detecting stream parameters
    pub analyze_duration: Duration,

    /// HTTP user agent
    pub user_agent: String,

    /// Disable input buffering for faster startup
    pub no_buffer: bool,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_streamed: true,
            reconnect_delay_max: Duration::from_secs(2),
            rw_timeout: Duration::from_secs(8),
            probe_size: 2_000_000,
            analyze_duration: Duration::from_secs(2),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            no_buffer: true,
        }
    }
}

impl NetOptions {
    /// Set the read/write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.rw_timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the probe size in bytes
    pub fn probe_size(mut self, bytes: u64) -> Self {
        self.probe_size = bytes;
        self
    }

    /// Key/value pairs in the decode library's option syntax
    ///
    /// Durations use the library's units: seconds for reconnect delay,
    /// microseconds for timeouts and analysis.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        let mut pairs = vec![
            ("reconnect", flag(self.reconnect)),
            ("reconnect_streamed", flag(self.reconnect_streamed)),
            (
                "reconnect_delay_max",
                self.reconnect_delay_max.as_secs().to_string(),
            ),
            ("rw_timeout", self.rw_timeout.as_micros().to_string()),
            ("probesize", self.probe_size.to_string()),
            (
                "analyzeduration",
                self.analyze_duration.as_micros().to_string(),
            ),
            ("user_agent", self.user_agent.clone()),
        ];
        if self.no_buffer {
            pairs.push(("fflags", "nobuffer".to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_pairs() {
        let pairs = NetOptions::default().to_pairs();
        assert_eq!(lookup(&pairs, "reconnect"), Some("1"));
        assert_eq!(lookup(&pairs, "reconnect_streamed"), Some("1"));
        assert_eq!(lookup(&pairs, "reconnect_delay_max"), Some("2"));
        assert_eq!(lookup(&pairs, "rw_timeout"), Some("8000000"));
        assert_eq!(lookup(&pairs, "probesize"), Some("2000000"));
        assert_eq!(lookup(&pairs, "analyzeduration"), Some("2000000"));
        assert_eq!(lookup(&pairs, "fflags"), Some("nobuffer"));
    }

    #[test]
    fn test_builder() {
        let opts = NetOptions::default()
            .rw_timeout(Duration::from_secs(3))
            .user_agent("collins");
        let pairs = opts.to_pairs();
        assert_eq!(lookup(&pairs, "rw_timeout"), Some("3000000"));
        assert_eq!(lookup(&pairs, "user_agent"), Some("collins"));
    }
}
