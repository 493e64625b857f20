//! Pixel and sample layout conversion
//!
//! All video conversions produce packed `0xAARRGGBB` words. UYVY uses the
//! integer BT.601 approximation (coefficients scaled by 1024).

use crate::types::{CodecKind, Resolution};

const C_RV: i32 = 1436; // 1.402 * 1024
const C_GU: i32 = 352; // 0.344 * 1024
const C_GV: i32 = 731; // 0.714 * 1024
const C_BU: i32 = 1815; // 1.772 * 1024

/// Exact payload length a video layout requires, if the geometry is valid
pub fn expected_len(codec: CodecKind, resolution: Resolution) -> Option<usize> {
    if !codec.is_video() || resolution.width == 0 || resolution.height == 0 {
        return None;
    }
    if codec == CodecKind::Uyvy && resolution.width % 2 != 0 {
        return None;
    }
    resolution.pixels().checked_mul(codec.bytes_per_unit())
}

#[inline]
fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
fn yuv_to_argb(y: u8, u: u8, v: u8) -> u32 {
    let y = y as i32 * 1024;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = clamp_u8((y + C_RV * v) >> 10);
    let g = clamp_u8((y - C_GU * u - C_GV * v) >> 10);
    let b = clamp_u8((y + C_BU * u) >> 10);
    pack(0xFF, r, g, b)
}

/// Convert a payload of the given layout into `out`.
///
/// `data` must be exactly [`expected_len`] bytes; `out` is cleared first.
pub fn to_argb(codec: CodecKind, data: &[u8], out: &mut Vec<u32>) {
    out.clear();
    match codec {
        CodecKind::Bgra => {
            out.extend(data.chunks_exact(4).map(|p| pack(p[3], p[2], p[1], p[0])));
        }
        CodecKind::Bgrx => {
            out.extend(data.chunks_exact(4).map(|p| pack(0xFF, p[2], p[1], p[0])));
        }
        CodecKind::Rgba => {
            out.extend(data.chunks_exact(4).map(|p| pack(p[3], p[0], p[1], p[2])));
        }
        CodecKind::Rgbx => {
            out.extend(data.chunks_exact(4).map(|p| pack(0xFF, p[0], p[1], p[2])));
        }
        CodecKind::Uyvy => {
            for quad in data.chunks_exact(4) {
                let (u, y0, v, y1) = (quad[0], quad[1], quad[2], quad[3]);
                out.push(yuv_to_argb(y0, u, v));
                out.push(yuv_to_argb(y1, u, v));
            }
        }
        CodecKind::PcmF32 => {}
    }
}

/// Decode interleaved little-endian f32 samples.
///
/// Returns `None` when the byte count is not a whole number of frames.
pub fn pcm_f32_le(data: &[u8], channels: u16) -> Option<Vec<f32>> {
    let frame_bytes = 4 * channels as usize;
    if frame_bytes == 0 || data.len() % frame_bytes != 0 {
        return None;
    }
    Some(
        data.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bgra_reorders_to_argb() {
        let mut out = Vec::new();
        to_argb(CodecKind::Bgra, &[0x01, 0x02, 0x03, 0x04], &mut out);
        assert_eq!(out, vec![0x0403_0201]);
    }

    #[test]
    fn bgrx_forces_opaque_alpha() {
        let mut out = Vec::new();
        to_argb(CodecKind::Bgrx, &[0x10, 0x20, 0x30, 0x00], &mut out);
        assert_eq!(out, vec![0xFF30_2010]);
    }

    #[test]
    fn rgba_and_rgbx() {
        let mut out = Vec::new();
        to_argb(CodecKind::Rgba, &[0xAA, 0xBB, 0xCC, 0x80], &mut out);
        assert_eq!(out, vec![0x80AA_BBCC]);
        to_argb(CodecKind::Rgbx, &[0xAA, 0xBB, 0xCC, 0x00], &mut out);
        assert_eq!(out, vec![0xFFAA_BBCC]);
    }

    #[test]
    fn uyvy_neutral_chroma_is_grey() {
        let mut out = Vec::new();
        to_argb(CodecKind::Uyvy, &[128, 16, 128, 235], &mut out);
        assert_eq!(out, vec![0xFF10_1010, 0xFFEB_EBEB]);
    }

    #[test]
    fn uyvy_saturated_chroma_clamps() {
        let mut out = Vec::new();
        // Max V pushes red past 255, max U pushes blue past 255.
        to_argb(CodecKind::Uyvy, &[255, 200, 255, 200], &mut out);
        let px = out[0];
        assert_eq!((px >> 16) & 0xFF, 255);
        assert_eq!(px & 0xFF, 255);
        assert_eq!(px >> 24, 0xFF);
    }

    #[test]
    fn expected_len_validates_geometry() {
        assert_eq!(expected_len(CodecKind::Bgra, Resolution::new(4, 2)), Some(32));
        assert_eq!(expected_len(CodecKind::Uyvy, Resolution::new(4, 2)), Some(16));
        assert_eq!(expected_len(CodecKind::Uyvy, Resolution::new(3, 2)), None);
        assert_eq!(expected_len(CodecKind::Bgra, Resolution::new(0, 2)), None);
        assert_eq!(expected_len(CodecKind::PcmF32, Resolution::new(2, 2)), None);
    }

    #[test]
    fn pcm_requires_whole_frames() {
        let mut bytes = Vec::new();
        for s in [0.5f32, -0.25, 1.0, 0.0] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(pcm_f32_le(&bytes, 2), Some(vec![0.5, -0.25, 1.0, 0.0]));
        assert_eq!(pcm_f32_le(&bytes[..12], 2), None);
        assert_eq!(pcm_f32_le(&bytes, 0), None);
    }

    proptest! {
        #[test]
        fn prop_output_has_one_word_per_pixel(
            half_width in 1u32..32,
            height in 1u32..16,
            codec in prop::sample::select(vec![
                CodecKind::Uyvy, CodecKind::Bgra, CodecKind::Bgrx, CodecKind::Rgba, CodecKind::Rgbx
            ]),
        ) {
            let resolution = Resolution::new(half_width * 2, height);
            let len = expected_len(codec, resolution).unwrap();
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut out = Vec::new();
            to_argb(codec, &data, &mut out);
            prop_assert_eq!(out.len(), resolution.pixels());
        }

        #[test]
        fn prop_uyvy_output_is_opaque(u in any::<u8>(), y in any::<u8>(), v in any::<u8>()) {
            let mut out = Vec::new();
            to_argb(CodecKind::Uyvy, &[u, y, v, y], &mut out);
            prop_assert_eq!(out[0] >> 24, 0xFF);
            prop_assert_eq!(out[0], out[1]);
        }
    }
}
