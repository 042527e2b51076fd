//! Output size selection
//!
//! A screen is measured in world cells; each cell maps to a fixed number of
//! pixels. The decoded frame is scaled to fit inside that box without
//! distorting the source aspect ratio, then clamped per axis.

/// Pixel limits for decoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Pixels per screen cell
    pub px_per_cell: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            px_per_cell: 128,
            min_width: 256,
            min_height: 144,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Pick the output size for a screen of `cells_w` x `cells_h`
///
/// Longest-edge fit: the source is scaled by the smaller of the two axis
/// ratios so it fills the box along one edge. Dimensions are rounded down to
/// even values, which most scalers require.
pub fn fit_target(
    cells_w: u32,
    cells_h: u32,
    video_w: u32,
    video_h: u32,
    limits: &SizeLimits,
) -> (u32, u32) {
    let box_w = cells_w
        .max(1)
        .saturating_mul(limits.px_per_cell)
        .clamp(limits.min_width, limits.max_width);
    let box_h = cells_h
        .max(1)
        .saturating_mul(limits.px_per_cell)
        .clamp(limits.min_height, limits.max_height);

    if video_w == 0 || video_h == 0 {
        return (even(box_w), even(box_h));
    }

    let scale = (box_w as f64 / video_w as f64).min(box_h as f64 / video_h as f64);
    let w = (video_w as f64 * scale).round() as u32;
    let h = (video_h as f64 * scale).round() as u32;

    (
        even(w.clamp(limits.min_width, limits.max_width)),
        even(h.clamp(limits.min_height, limits.max_height)),
    )
}

fn even(v: u32) -> u32 {
    (v & !1).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_source_in_wide_screen() {
        let limits = SizeLimits::default();
        // 8x4 cells -> 1024x512 box; 16:9 source is height-bound
        assert_eq!(fit_target(8, 4, 1920, 1080, &limits), (910, 512));
    }

    #[test]
    fn test_box_clamped_to_max() {
        let limits = SizeLimits::default();
        // 40x20 cells would be 5120x2560
        assert_eq!(fit_target(40, 20, 3840, 2160, &limits), (1920, 1080));
    }

    #[test]
    fn test_small_screen_clamped_to_min() {
        let limits = SizeLimits::default();
        // 1x1 cell -> 256x144 box
        assert_eq!(fit_target(1, 1, 1280, 720, &limits), (256, 144));
    }

    #[test]
    fn test_portrait_source() {
        let limits = SizeLimits::default();
        // 4x4 cells -> 512x512 box; 9:16 source is height-bound
        let (w, h) = fit_target(4, 4, 1080, 1920, &limits);
        assert_eq!(h, 512);
        assert_eq!(w, 288);
    }

    #[test]
    fn test_unknown_source_uses_box() {
        let limits = SizeLimits::default();
        assert_eq!(fit_target(3, 2, 0, 0, &limits), (384, 256));
    }
}
