//! Fixed-point slice positions
//!
//! The metadata chunk stores slice boundaries as frame offsets multiplied by a
//! device scale and clamped to [`MAX_POSITION`]. Encoding is total: negative
//! frames clamp to zero and oversized ones saturate at the sentinel.

use crate::{DEFAULT_POSITION_SCALE, MAX_POSITION};

/// Converts between frame offsets and stored positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCodec {
    scale: u32,
}

impl Default for PositionCodec {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_SCALE)
    }
}

impl PositionCodec {
    /// Create a codec with a custom ticks-per-frame scale.
    ///
    /// A zero scale is raised to 1 so decoding never divides by zero.
    pub const fn new(scale: u32) -> Self {
        Self {
            scale: if scale == 0 { 1 } else { scale },
        }
    }

    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Encode a single frame offset.
    pub fn encode_one(&self, frame: i64) -> u32 {
        let frames = frame.max(0) as u64;
        let scaled = frames.saturating_mul(self.scale as u64);
        scaled.min(MAX_POSITION as u64) as u32
    }

    /// Encode frame offsets into stored positions.
    pub fn encode(&self, frames: &[i64]) -> Vec<u32> {
        frames.iter().map(|&f| self.encode_one(f)).collect()
    }

    /// Decode a stored position to the nearest frame.
    ///
    /// Lossy: positions that were clamped, or written with another scale,
    /// do not map back to the original frame.
    pub fn decode_one(&self, position: u32) -> u64 {
        let scale = self.scale as u64;
        (position as u64 + scale / 2) / scale
    }

    pub fn decode(&self, positions: &[u32]) -> Vec<u64> {
        positions.iter().map(|&p| self.decode_one(p)).collect()
    }
}

/// Encode with the default device scale.
pub fn encode_positions(frames: &[i64]) -> Vec<u32> {
    PositionCodec::default().encode(frames)
}

/// Decode with the default device scale.
pub fn decode_positions(positions: &[u32]) -> Vec<u64> {
    PositionCodec::default().decode(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scales_by_default_factor() {
        assert_eq!(encode_positions(&[1]), vec![4096]);
        assert_eq!(encode_positions(&[0]), vec![0]);
        assert_eq!(encode_positions(&[22050]), vec![22050 * 4096]);
    }

    #[test]
    fn test_encode_clamps_to_sentinel() {
        assert_eq!(encode_positions(&[999_999_999]), vec![0x7FFF_FFFE]);
        assert_eq!(encode_positions(&[i64::MAX]), vec![MAX_POSITION]);
    }

    #[test]
    fn test_negative_frames_clamp_to_zero() {
        assert_eq!(encode_positions(&[-1, -44100]), vec![0, 0]);
    }

    #[test]
    fn test_encode_matches_formula() {
        let codec = PositionCodec::new(4058);
        for f in [0i64, 1, 2, 441, 44100, 529_200, 600_000] {
            let expected = (f as u64 * 4058).min(MAX_POSITION as u64) as u32;
            assert_eq!(codec.encode_one(f), expected, "frame {f}");
        }
    }

    #[test]
    fn test_encode_is_monotonic() {
        let frames: Vec<i64> = (0..2_000_000).step_by(997).collect();
        let encoded = encode_positions(&frames);
        assert!(encoded.windows(2).all(|w| w[0] <= w[1]));
        assert!(encoded.iter().all(|&p| p <= MAX_POSITION));
    }

    #[test]
    fn test_decode_rounds_to_nearest() {
        let codec = PositionCodec::default();
        assert_eq!(codec.decode_one(4096 * 10), 10);
        assert_eq!(codec.decode_one(4096 * 10 + 2047), 10);
        assert_eq!(codec.decode_one(4096 * 10 + 2048), 11);
        assert_eq!(decode_positions(&encode_positions(&[2200, 5660])), vec![2200, 5660]);
    }

    #[test]
    fn test_decode_of_clamped_value_is_lossy() {
        let codec = PositionCodec::default();
        let clamped = codec.encode_one(999_999_999);
        assert_ne!(codec.decode_one(clamped), 999_999_999);
    }

    #[test]
    fn test_zero_scale_is_raised() {
        let codec = PositionCodec::new(0);
        assert_eq!(codec.scale(), 1);
        assert_eq!(codec.decode_one(5), 5);
    }
}
