//! RGBA previews of intermediate stage outputs.
//!
//! Every preview has the source dimensions so a display collaborator can
//! swap between stages without rescaling.

use crate::field::ScalarField;
use crate::occupancy::OccupancyMask;
use crate::types::{Dimensions, Rgb, RgbaImage, Stroke};

/// Heat map stops: low, middle, high magnitude.
const HEAT_COLD: Rgb = Rgb::new(20, 34, 51);
const HEAT_MID: Rgb = Rgb::new(3, 169, 156);
const HEAT_HOT: Rgb = Rgb::new(255, 142, 79);

/// Background tint for claimed pixels in the traced-strokes preview.
const CLAIMED: Rgb = Rgb::new(38, 42, 48);

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(value: f32) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

const fn opaque(color: Rgb) -> image::Rgba<u8> {
    let [r, g, b] = color.0;
    image::Rgba([r, g, b, 255])
}

/// Grayscale view of a 0-255 field.
#[must_use]
pub fn mono_to_rgba(field: &ScalarField) -> RgbaImage {
    RgbaImage::from_fn(field.width(), field.height(), |x, y| {
        let v = to_byte(field[(x, y)][0]);
        image::Rgba([v, v, v, 255])
    })
}

/// Three-stop heat color for a 0-255 value.
#[must_use]
pub fn heat_color(value: f32) -> Rgb {
    let t = value.clamp(0.0, 255.0) / 255.0;
    if t < 0.5 {
        HEAT_COLD.mix(HEAT_MID, t * 2.0)
    } else {
        HEAT_MID.mix(HEAT_HOT, (t - 0.5) * 2.0)
    }
}

/// Heat-map view of a 0-255 field.
#[must_use]
pub fn heat_to_rgba(field: &ScalarField) -> RgbaImage {
    RgbaImage::from_fn(field.width(), field.height(), |x, y| {
        opaque(heat_color(field[(x, y)][0]))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn plot(image: &mut RgbaImage, stroke: &Stroke, color: Rgb) {
    for point in stroke.positions() {
        let (x, y) = point.round_to_pixel();
        if x >= 0 && y >= 0 && x < i64::from(image.width()) && y < i64::from(image.height()) {
            image.put_pixel(x as u32, y as u32, opaque(color));
        }
    }
}

/// Traced strokes in their sampled colors over the occupancy mask.
#[must_use]
pub fn strokes_to_rgba(strokes: &[Stroke], mask: &OccupancyMask) -> RgbaImage {
    let Dimensions { width, height } = mask.dimensions();
    let mut image = RgbaImage::from_fn(width, height, |x, y| {
        if mask.is_occupied(i64::from(x), i64::from(y)) {
            opaque(CLAIMED)
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    });
    for stroke in strokes {
        plot(&mut image, stroke, stroke.color);
    }
    image
}

/// Ranked strokes, brighter for higher rank, on black.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn ranked_to_rgba(strokes: &[Stroke], dimensions: Dimensions) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(dimensions.width, dimensions.height, image::Rgba([0, 0, 0, 255]));
    // Paint weakest first so strong strokes stay on top.
    for stroke in strokes.iter().rev() {
        let factor = 0.65f64.mul_add(stroke.strength_rank, 0.35) as f32;
        plot(&mut image, stroke, stroke.color.scale(factor));
    }
    image
}
