//! Decoded frame types shared between the producer and the render pacer

/// Packed pixel storage, one `u32` per pixel in `0xAABBGGRR` order
pub type PixelBuffer = Vec<u32>;

/// A decoded, converted video frame
///
/// The pixel buffer is borrowed from the [`BufferPool`](super::BufferPool) by
/// the producer and handed back by the consumer exactly once, either after
/// display or when the frame is dropped.
#[derive(Debug)]
pub struct Frame {
    /// Converted pixels, `width * height` long
    pub pixels: PixelBuffer,
    pub width: u32,
    pub height: u32,
    /// Presentation time relative to the first stream timestamp
    pub timestamp_us: i64,
}

impl Frame {
    pub fn new(pixels: PixelBuffer, width: u32, height: u32, timestamp_us: i64) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp_us,
        }
    }

    /// Whether the frame matches the given output size
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Output geometry announced by the producer when a session opens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInit {
    /// Native stream size
    pub video_width: u32,
    pub video_height: u32,
    /// Size frames are scaled to
    pub target_width: u32,
    pub target_height: u32,
    pub fps: f64,
}

impl VideoInit {
    /// Pixels per output frame
    pub fn pixels(&self) -> usize {
        self.target_width as usize * self.target_height as usize
    }
}
