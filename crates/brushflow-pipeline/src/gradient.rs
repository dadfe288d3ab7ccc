//! Sobel gradient field, normalized magnitude, and unit tangent flow.
//!
//! - Correlates the 3×3 Sobel pair with [`imageproc::filter::filter_clamped`]
//!   at `f32` precision, then zeroes the 1-pixel border of every output.
//! - Normalizes the magnitude to 0-255 against the field maximum, scaled
//!   by the user sensitivity.
//! - Rotates the gradient by 90° into a unit tangent that follows edges
//!   and contours. Where the gradient vanishes the tangent is the zero
//!   vector: there is no direction to follow.

use image::Luma;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

use crate::field::{ScalarField, VectorField, scalar_field};

/// Gradient magnitudes at or below this are treated as direction-less.
pub const TANGENT_EPSILON: f32 = 1e-5;

/// Horizontal Sobel taps, row-major.
const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];

/// Vertical Sobel taps, row-major.
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];

/// Everything the tracer needs from the gradient stage.
#[derive(Debug, Clone)]
pub struct GradientField {
    /// Raw Sobel response (`gx`, `gy`).
    pub gradient: VectorField,
    /// Euclidean norm of the gradient.
    pub magnitude: ScalarField,
    /// Magnitude rescaled to 0-255 and multiplied by sensitivity.
    pub normalized: ScalarField,
    /// Unit tangent `(-gy, gx) / |g|`, or zero where `|g| <= TANGENT_EPSILON`.
    pub tangent: VectorField,
    /// Largest raw magnitude in the field.
    pub max_magnitude: f32,
}

impl GradientField {
    /// Width of the underlying fields.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.magnitude.width()
    }

    /// Height of the underlying fields.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.magnitude.height()
    }

    /// Number of pixels that carry a defined (non-zero) tangent.
    #[must_use]
    pub fn directed_pixel_count(&self) -> usize {
        self.tangent
            .x
            .iter()
            .zip(self.tangent.y.iter())
            .filter(|(x, y)| **x != 0.0 || **y != 0.0)
            .count()
    }
}

/// One Sobel component with its border cleared.
fn sobel(luma: &ScalarField, taps: &[f32; 9]) -> ScalarField {
    let mut out: ScalarField = filter_clamped(luma, Kernel::new(taps, 3, 3));
    let (width, height) = out.dimensions();
    if width == 0 || height == 0 {
        return out;
    }
    for x in 0..width {
        out.put_pixel(x, 0, Luma([0.0]));
        out.put_pixel(x, height - 1, Luma([0.0]));
    }
    for y in 0..height {
        out.put_pixel(0, y, Luma([0.0]));
        out.put_pixel(width - 1, y, Luma([0.0]));
    }
    out
}

/// Build the gradient field from a (blurred) luminance field.
///
/// `sensitivity` multiplies the normalized magnitude before clamping, so
/// values above 1 saturate weaker edges to full strength.
#[must_use = "returns the gradient field"]
pub fn build_gradient_field(luma: &ScalarField, sensitivity: f32) -> GradientField {
    let (width, height) = luma.dimensions();
    let gradient = VectorField {
        x: sobel(luma, &SOBEL_X),
        y: sobel(luma, &SOBEL_Y),
    };

    let magnitude = scalar_field(width, height, |x, y| {
        let (gx, gy) = gradient.get(x, y);
        gx.hypot(gy)
    });
    let max_magnitude = magnitude.iter().copied().fold(0.0, f32::max);

    let scale = 255.0 / max_magnitude.max(1.0) * sensitivity;
    let normalized = scalar_field(width, height, |x, y| {
        (magnitude[(x, y)][0] * scale).clamp(0.0, 255.0)
    });

    let mut tangent = VectorField::zeros(width, height);
    for (x, y, mag) in magnitude.enumerate_pixels() {
        let mag = mag[0];
        if mag > TANGENT_EPSILON {
            let (gx, gy) = gradient.get(x, y);
            tangent.set(x, y, (-gy / mag, gx / mag));
        }
    }

    GradientField {
        gradient,
        magnitude,
        normalized,
        tangent,
        max_magnitude,
    }
}
