//! Native-to-engine pixel conversion

/// Convert BGR24 rows into packed `0xAABBGGRR` pixels
///
/// `stride` is the byte distance between source rows; 0 means tightly
/// packed. Rows missing from a short source are left untouched in `dst`.
pub fn bgr24_to_abgr(src: &[u8], stride: usize, width: usize, height: usize, dst: &mut [u32]) {
    let row_bytes = width * 3;
    let stride = if stride == 0 { row_bytes } else { stride };

    for y in 0..height {
        let start = y * stride;
        let Some(row) = src.get(start..start + row_bytes) else {
            break;
        };
        let Some(out) = dst.get_mut(y * width..(y + 1) * width) else {
            break;
        };

        for (px, bgr) in out.iter_mut().zip(row.chunks_exact(3)) {
            let b = bgr[0] as u32;
            let g = bgr[1] as u32;
            let r = bgr[2] as u32;
            *px = 0xFF00_0000 | (b << 16) | (g << 8) | r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_conversion() {
        // 2x1: pure blue, pure red
        let src = [0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF];
        let mut dst = [0u32; 2];
        bgr24_to_abgr(&src, 0, 2, 1, &mut dst);
        assert_eq!(dst, [0xFFFF_0000, 0xFF00_00FF]);
    }

    #[test]
    fn test_stride_padding_skipped() {
        // 1x2 with 2 bytes of row padding
        let src = [0x01, 0x02, 0x03, 0xEE, 0xEE, 0x04, 0x05, 0x06];
        let mut dst = [0u32; 2];
        bgr24_to_abgr(&src, 5, 1, 2, &mut dst);
        assert_eq!(dst, [0xFF01_0203, 0xFF04_0506]);
    }

    #[test]
    fn test_short_source() {
        let src = [0x10, 0x20, 0x30];
        let mut dst = [7u32; 2];
        bgr24_to_abgr(&src, 0, 1, 2, &mut dst);
        assert_eq!(dst, [0xFF10_2030, 7]);
    }
}
