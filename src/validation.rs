//! Frame validation utilities for test pattern verification.
//!
//! This module provides functions to validate that captured frames contain
//! expected test patterns. Useful for integration testing with virtual cameras.
//!
//! Captured images are rotated by 180 degrees relative to the sensor, so every
//! check samples through [`sensor_pixel`], which undoes the rotation.

use rgb::RGB8;

use crate::bitmap::RasterImage;
use crate::error::{Error, Result};
use crate::traits::FrameMetadata;

/// Expected RGB values for 100% color bars (8 bars).
///
/// These are the RGB values resulting from converting the studio-range YUV
/// bars with the integer BT.601 transform, which expands them to full range.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const COLOR_BARS: [(u8, u8, u8); 8] = [
    (255, 255, 255), // White
    (255, 255, 0),   // Yellow
    (0, 255, 255),   // Cyan
    (0, 255, 0),     // Green
    (255, 0, 255),   // Magenta
    (255, 0, 0),     // Red
    (0, 0, 255),     // Blue
    (0, 0, 0),       // Black
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u8 = 15;

/// Pixel at sensor coordinates `(x, y)`, `y = 0` being the sensor's top row.
pub fn sensor_pixel(image: &RasterImage, x: u32, y: u32) -> Result<RGB8> {
    let (width, height) = (image.width(), image.height());
    if x >= width || y >= height {
        return Err(Error::Bounds {
            x,
            y,
            width,
            height,
        });
    }
    image.get_pixel(width - 1 - x, height - 1 - y)
}

/// Validates that a frame contains the color bar pattern.
///
/// This function checks 8 vertical stripes at their center positions,
/// verifying that each stripe contains the expected color with a tolerance
/// for YUV-to-RGB conversion inaccuracies.
///
/// # Errors
///
/// Returns `Validation` if any color bar doesn't match the expected color
/// within tolerance.
pub fn validate_color_bars(image: &RasterImage) -> Result<()> {
    let bar_width = image.width() / 8;
    let center_y = image.height() / 2;

    for (bar_idx, &(r, g, b)) in (0u32..).zip(COLOR_BARS.iter()) {
        // Sample the center of each bar
        let sample_x = (bar_idx * bar_width) + (bar_width / 2);
        let expected = RGB8::new(r, g, b);
        let actual = sensor_pixel(image, sample_x, center_y)?;

        if !colors_match(actual, expected, COLOR_TOLERANCE) {
            return Err(Error::Validation(format!(
                "color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected {expected:?}, got {actual:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that a frame contains a horizontal gradient pattern.
///
/// Samples the center row every 10 pixels and checks that luminance rises
/// from left to right (small dips allowed for rounding) by at least 50
/// overall, so a solid frame fails.
pub fn validate_gradient(image: &RasterImage) -> Result<()> {
    let center_y = image.height() / 2;

    let mut first_luminance: Option<f32> = None;
    let mut prev_luminance: Option<f32> = None;

    for x in (0..image.width()).step_by(10) {
        let luminance = luminance(sensor_pixel(image, x, center_y)?);

        if first_luminance.is_none() {
            first_luminance = Some(luminance);
        }

        if let Some(prev) = prev_luminance {
            if luminance < prev - 1.0 {
                return Err(Error::Validation(format!(
                    "gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                )));
            }
        }

        prev_luminance = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first_luminance, prev_luminance) {
        let luminance_change = last - first;
        if luminance_change < 50.0 {
            return Err(Error::Validation(format!(
                "insufficient luminance change for gradient: {luminance_change} \
                 (expected at least 50.0)"
            )));
        }
    }

    Ok(())
}

/// Validates that frame sequence numbers increment by 1 with no gaps.
pub fn validate_frame_sequence(frames: &[FrameMetadata]) -> Result<()> {
    if frames.is_empty() {
        return Err(Error::Validation(
            "cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let expected = prev.sequence.wrapping_add(1);
            if curr.sequence != expected {
                return Err(Error::Validation(format!(
                    "frame sequence gap at index {}: expected {expected}, got {}",
                    i + 1,
                    curr.sequence
                )));
            }
        }
    }

    Ok(())
}

/// Luminance (Y' in Rec. 601).
fn luminance(color: RGB8) -> f32 {
    0.114f32.mul_add(
        f32::from(color.b),
        0.587f32.mul_add(f32::from(color.g), 0.299 * f32::from(color.r)),
    )
}

fn colors_match(actual: RGB8, expected: RGB8, tolerance: u8) -> bool {
    actual.r.abs_diff(expected.r) <= tolerance
        && actual.g.abs_diff(expected.g) <= tolerance
        && actual.b.abs_diff(expected.b) <= tolerance
}
