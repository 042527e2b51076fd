//! Signed 16-bit PCM conversion with gain

/// Decoded audio for one unit, as delivered by the decode library
///
/// One plane means interleaved samples; two or more planes are planar
/// (one channel per plane).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBlock {
    pub planes: Vec<Vec<i16>>,
}

impl SampleBlock {
    pub fn interleaved(samples: Vec<i16>) -> Self {
        Self {
            planes: vec![samples],
        }
    }

    pub fn planar(left: Vec<i16>, right: Vec<i16>) -> Self {
        Self {
            planes: vec![left, right],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.planes.first().map_or(true, |p| p.is_empty())
    }
}

/// Scale a sample by `gain`, rounding half away from zero and saturating
pub fn scale_clamp(sample: i16, gain: f32) -> i16 {
    if gain == 1.0 {
        return sample;
    }
    let v = (sample as f32 * gain).round();
    v.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a block to little-endian PCM in `out`
///
/// `out` is cleared first. With `channels >= 2` and two planes the planes are
/// interleaved L/R, truncated to the shorter one; otherwise the first plane is
/// written as-is. Returns the number of bytes written.
pub fn to_pcm16le(block: &SampleBlock, channels: u16, gain: f32, out: &mut Vec<u8>) -> usize {
    out.clear();
    let Some(first) = block.planes.first() else {
        return 0;
    };

    if channels >= 2 && block.planes.len() >= 2 {
        let (left, right) = (first, &block.planes[1]);
        let n = left.len().min(right.len());
        out.reserve(n * 4);
        for (l, r) in left[..n].iter().zip(&right[..n]) {
            out.extend_from_slice(&scale_clamp(*l, gain).to_le_bytes());
            out.extend_from_slice(&scale_clamp(*r, gain).to_le_bytes());
        }
    } else {
        out.reserve(first.len() * 2);
        for s in first {
            out.extend_from_slice(&scale_clamp(*s, gain).to_le_bytes());
        }
    }
    out.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain_is_identity() {
        assert_eq!(scale_clamp(-12345, 1.0), -12345);
    }

    #[test]
    fn test_gain_saturates() {
        assert_eq!(scale_clamp(20_000, 2.0), i16::MAX);
        assert_eq!(scale_clamp(-20_000, 2.0), i16::MIN);
        assert_eq!(scale_clamp(1001, 0.5), 501);
        assert_eq!(scale_clamp(100, 0.0), 0);
    }

    #[test]
    fn test_planar_stereo_interleaves() {
        let block = SampleBlock::planar(vec![1, 2, 3], vec![-1, -2]);
        let mut out = Vec::new();
        assert_eq!(to_pcm16le(&block, 2, 1.0, &mut out), 8);
        assert_eq!(out, vec![1, 0, 0xFF, 0xFF, 2, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn test_interleaved_passthrough() {
        let block = SampleBlock::interleaved(vec![0x0102, 0x0304]);
        let mut out = vec![9; 16];
        assert_eq!(to_pcm16le(&block, 2, 1.0, &mut out), 4);
        assert_eq!(out, vec![0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn test_mono_uses_first_plane() {
        let block = SampleBlock::planar(vec![10], vec![20]);
        let mut out = Vec::new();
        to_pcm16le(&block, 1, 2.0, &mut out);
        assert_eq!(out, vec![20, 0]);
    }
}
