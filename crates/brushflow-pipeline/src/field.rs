//! Dense per-pixel float rasters.
//!
//! Scalar rasters are plain `imageproc` float images, so they go straight
//! into its filters. [`VectorField`] pairs two of them as the x and y
//! components of a per-pixel vector.

use image::Luma;
use imageproc::definitions::Image;

/// One `f32` per pixel: luminance, blurred luminance, gradient magnitude.
pub type ScalarField = Image<Luma<f32>>;

/// Build a scalar field by evaluating `f(x, y)` for every pixel.
#[must_use]
pub fn scalar_field(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> ScalarField {
    ScalarField::from_fn(width, height, |x, y| Luma([f(x, y)]))
}

/// Per-pixel 2D vectors stored as two scalar components.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    /// Horizontal component.
    pub x: ScalarField,
    /// Vertical component.
    pub y: ScalarField,
}

impl VectorField {
    /// A field of zero vectors.
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            x: ScalarField::new(width, height),
            y: ScalarField::new(width, height),
        }
    }

    /// Vector at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        (self.x[(x, y)][0], self.y[(x, y)][0])
    }

    /// Overwrite the vector at `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, (vx, vy): (f32, f32)) {
        self.x.put_pixel(x, y, Luma([vx]));
        self.y.put_pixel(x, y, Luma([vy]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn scalar_field_is_row_major() {
        let field = scalar_field(3, 2, |x, y| (y * 3 + x) as f32);
        assert_eq!(field.as_raw(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((field[(2, 1)][0] - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn vector_field_set_and_get() {
        let mut field = VectorField::zeros(2, 2);
        field.set(1, 0, (0.6, -0.8));
        assert_eq!(field.get(1, 0), (0.6, -0.8));
        assert_eq!(field.get(0, 1), (0.0, 0.0));
    }
}
