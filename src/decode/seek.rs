//! Start-offset seeking
//!
//! Container seeks usually land on a keyframe before the target. When the
//! stream still lags by more than the tolerance, frames are decoded and
//! discarded until it catches up, bounded by a frame budget and a time
//! budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::backend::{DecodedUnit, MediaStream};

/// Bounds for the linear skip after a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipLimits {
    /// Acceptable distance below the target
    pub tolerance: Duration,
    /// Wall time the skip may take
    pub time_budget: Duration,
}

impl Default for SkipLimits {
    fn default() -> Self {
        Self {
            tolerance: Duration::from_millis(50),
            time_budget: Duration::from_secs(2),
        }
    }
}

/// Where a seek ended up
#[derive(Debug, Clone, Default)]
pub struct SeekOutcome {
    /// Stream position after the direct seek
    pub position_us: i64,
    /// Units decoded and discarded
    pub skipped: u32,
    /// First unit within tolerance; decoding continues from it
    pub pending: Option<DecodedUnit>,
}

/// Seek target adjusted for the time it took to open the session
///
/// `requested_at` is when the start was issued; `None` (loop restarts)
/// means no compensation.
pub fn effective_seek_ms(seek_ms: i64, requested_at: Option<Instant>, opened_at: Instant) -> i64 {
    let lag_ms = requested_at
        .map(|at| opened_at.saturating_duration_since(at).as_millis() as i64)
        .unwrap_or(0);
    seek_ms.max(0) + lag_ms
}

/// Maximum number of units to skip for a gap of `gap_us`
pub fn skip_budget(fps: f64, gap_us: i64) -> u32 {
    let gap_s = (gap_us.max(0) / 1000) as f64 / 1000.0;
    let frames = (fps * gap_s + 120.0) as i64;
    frames.clamp(600, 20_000) as u32
}

/// Seek to `target_us`, then skip forward until within tolerance
pub fn seek_to(
    stream: &mut dyn MediaStream,
    target_us: i64,
    fps: f64,
    limits: &SkipLimits,
    cancel: &AtomicBool,
) -> SeekOutcome {
    if let Err(e) = stream.seek(target_us) {
        tracing::debug!(target_us = target_us, error = %e, "Direct seek failed");
    }

    let tolerance_us = limits.tolerance.as_micros() as i64;
    let position_us = stream.position_us();
    let mut outcome = SeekOutcome {
        position_us,
        ..Default::default()
    };
    if position_us < 0 || position_us + tolerance_us >= target_us {
        return outcome;
    }

    let budget = skip_budget(fps, target_us - position_us);
    let started = Instant::now();

    while !cancel.load(Ordering::Acquire) && outcome.skipped < budget {
        if started.elapsed() > limits.time_budget {
            break;
        }
        let unit = match stream.grab() {
            Ok(Some(unit)) => unit,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Decode failed while skipping");
                break;
            }
        };

        let ts = match unit.timestamp_us() {
            ts if ts >= 0 => ts,
            _ => stream.position_us(),
        };
        if ts >= target_us - tolerance_us {
            outcome.pending = Some(unit);
            break;
        }
        outcome.skipped += 1;
    }

    tracing::debug!(
        target_us = target_us,
        landed_us = position_us,
        skipped = outcome.skipped,
        budget = budget,
        "Seek complete"
    );
    outcome
}
