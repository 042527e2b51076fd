//! External duration probe
//!
//! Runs `ffprobe` (or `yt-dlp` for video-sharing links) as a child process
//! and reads the duration in seconds from its stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::resolve::is_indirect;
use crate::server::config::ServerConfig;

/// Measures the duration of a media URL
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration in ms, `None` if it could not be determined
    async fn duration_ms(&self, url: &str) -> Option<i64>;
}

/// Probe backed by external programs
#[derive(Debug, Clone)]
pub struct CommandProbe {
    ffprobe: String,
    ytdlp: String,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            ffprobe: config.ffprobe_path.clone(),
            ytdlp: config.ytdlp_path.clone(),
            timeout: config.probe_timeout,
        }
    }

    /// Program and arguments used for `url`
    pub fn command_line(&self, url: &str) -> (String, Vec<String>) {
        if is_indirect(url) {
            let args = ["--no-download", "--print", "duration", "--no-warnings", "--quiet", url];
            (self.ytdlp.clone(), args.iter().map(|s| s.to_string()).collect())
        } else {
            let args = [
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                url,
            ];
            (self.ffprobe.clone(), args.iter().map(|s| s.to_string()).collect())
        }
    }
}

#[async_trait]
impl DurationProbe for CommandProbe {
    async fn duration_ms(&self, url: &str) -> Option<i64> {
        let (program, args) = self.command_line(url);

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(program = %program, error = %e, "Duration probe failed to run");
                return None;
            }
            Err(_) => {
                tracing::warn!(program = %program, url = %url, "Duration probe timed out");
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(program = %program, status = %output.status, "Duration probe failed");
            return None;
        }
        parse_seconds(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the first line of probe output (seconds) into positive ms
pub fn parse_seconds(output: &str) -> Option<i64> {
    let secs: f64 = output.lines().next()?.trim().parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as i64)
}
