//! Luminance extraction.
//!
//! The first step of the pipeline: an RGBA source image in, a single
//! floating-point luminance field out. Alpha is ignored.

use crate::field::{ScalarField, scalar_field};
use crate::types::RgbaImage;

/// Weighted channel sum `0.299*R + 0.587*G + 0.114*B` for one pixel.
#[must_use]
pub fn pixel_luminance(rgba: [u8; 4]) -> f32 {
    let [r, g, b, _] = rgba.map(f32::from);
    0.114f32.mul_add(b, 0.299f32.mul_add(r, 0.587 * g))
}

/// Convert an RGBA image into a luminance field on the 0-255 scale.
///
/// Unlike `image`'s `to_luma8`, the result keeps full float precision so
/// the blur and Sobel stages do not accumulate quantization error.
#[must_use = "returns the luminance field"]
pub fn luminance(image: &RgbaImage) -> ScalarField {
    scalar_field(image.width(), image.height(), |x, y| {
        pixel_luminance(image.get_pixel(x, y).0)
    })
}
