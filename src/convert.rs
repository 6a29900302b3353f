//! YUYV (4:2:2 packed) to RGB24 conversion.

/// Bytes per YUYV group: `[Y0, U, Y1, V]`, two pixels sharing chroma.
const GROUP_BYTES: usize = 4;

/// Convert a packed YUYV buffer into a tightly packed RGB24 buffer.
///
/// The output always holds `width * height * 3` bytes. Pixels the input is
/// too short to cover stay black.
pub fn yuyv_to_rgb24(packed: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    let mut rgb = vec![0u8; pixels * 3];

    let input = packed.get(..pixels * 2).unwrap_or(packed);
    for (group, out) in input
        .chunks_exact(GROUP_BYTES)
        .zip(rgb.chunks_exact_mut(6))
    {
        if let (&[y0, u, y1, v], [r0, g0, b0, r1, g1, b1]) = (group, out) {
            (*r0, *g0, *b0) = yuv_to_rgb(y0, u, v);
            (*r1, *g1, *b1) = yuv_to_rgb(y1, u, v);
        }
    }

    rgb
}

/// Convert one studio-range YUV sample to RGB.
///
/// Uses the ITU-R BT.601 integer approximation with 8 fractional bits.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    (clamp(r), clamp(g), clamp(b))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn clamp(value: i32) -> u8 {
    if value < 0 {
        0
    } else if value > 255 {
        255
    } else {
        value as u8
    }
}
