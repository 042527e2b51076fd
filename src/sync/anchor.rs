//! Wall-clock to media-position mapping

/// Compact description of where playback is
///
/// While playing, the position is `base_pos_ms + (now - start_epoch_ms)`;
/// while not playing `start_epoch_ms` is 0 and the position is frozen at
/// `base_pos_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackAnchor {
    pub playing: bool,
    pub looping: bool,
    pub gain: f32,
    /// Wall-clock ms at which playback (re)started; 0 when not playing
    pub start_epoch_ms: i64,
    /// Position accumulated before `start_epoch_ms`
    pub base_pos_ms: i64,
    /// Media duration, 0 or negative when unknown
    pub duration_ms: i64,
}

impl PlaybackAnchor {
    /// Anchor of a session that starts from `base_pos_ms` at `now_ms`
    pub fn running(now_ms: i64, base_pos_ms: i64) -> Self {
        Self {
            playing: true,
            gain: 1.0,
            start_epoch_ms: now_ms,
            base_pos_ms: base_pos_ms.max(0),
            ..Default::default()
        }
    }

    /// Anchor frozen at `pos_ms`
    pub fn frozen(pos_ms: i64) -> Self {
        Self {
            gain: 1.0,
            base_pos_ms: pos_ms.max(0),
            ..Default::default()
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain.max(0.0);
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Media position at wall-clock `now_ms`
    ///
    /// Never negative, and never decreasing in `now_ms` while playing.
    pub fn position(&self, now_ms: i64) -> i64 {
        let base = self.base_pos_ms.max(0);
        if !self.playing || self.start_epoch_ms <= 0 {
            return base;
        }
        base.saturating_add(now_ms.saturating_sub(self.start_epoch_ms).max(0))
    }

    pub fn has_duration(&self) -> bool {
        self.duration_ms > 0
    }

    /// Whether a playing, non-looping session is within `guard_ms` of its end
    pub fn is_ended(&self, now_ms: i64, guard_ms: i64) -> bool {
        self.playing
            && !self.looping
            && self.has_duration()
            && self.start_epoch_ms > 0
            && self.position(now_ms) >= self.duration_ms - guard_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_position_never_negative() {
        // Clock behind the anchor, e.g. a skewed receiver
        let anchor = PlaybackAnchor::running(T0, 0);
        assert_eq!(anchor.position(T0 - 10_000), 0);

        let frozen = PlaybackAnchor::frozen(-50);
        assert_eq!(frozen.position(T0), 0);
    }

    #[test]
    fn test_position_monotonic_while_playing() {
        let anchor = PlaybackAnchor::running(T0, 2_000);
        let mut last = i64::MIN;
        for step in 0..100 {
            let pos = anchor.position(T0 - 500 + step * 37);
            assert!(pos >= last);
            assert!(pos >= 0);
            last = pos;
        }
    }

    #[test]
    fn test_five_seconds_elapsed() {
        let anchor = PlaybackAnchor::running(T0, 0);
        assert_eq!(anchor.position(T0 + 5_000), 5_000);
    }

    #[test]
    fn test_frozen_ignores_time() {
        let anchor = PlaybackAnchor::frozen(42_000);
        assert_eq!(anchor.position(T0), 42_000);
        assert_eq!(anchor.position(T0 + 60_000), 42_000);
    }

    #[test]
    fn test_end_detection() {
        let anchor = PlaybackAnchor::running(T0, 0).with_duration(10_000);
        assert!(!anchor.is_ended(T0 + 8_999, 1_000));
        assert!(anchor.is_ended(T0 + 9_000, 1_000));

        assert!(!anchor.with_looping(true).is_ended(T0 + 20_000, 1_000));
        assert!(!anchor.with_duration(0).is_ended(T0 + 20_000, 1_000));
    }
}
