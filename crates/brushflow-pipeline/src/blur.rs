//! Separable box blur for noise reduction before gradient estimation.
//!
//! A horizontal pass followed by a vertical pass, each a running-sum
//! sliding window of `2 * radius + 1` samples. Samples that fall off the
//! image are clamped to the nearest row or column, so borders repeat
//! their edge value rather than fading to zero or wrapping around.
//!
//! `imageproc::filter::box_filter` only takes 8-bit images; the luminance
//! field is `f32`, so the window is summed here.

use image::Luma;

use crate::field::ScalarField;

/// Blur a scalar field with a `(2 * radius + 1)`-wide box kernel.
///
/// A radius of 0 returns an unchanged copy. Each pass costs one add and
/// one subtract per pixel whatever the radius.
#[must_use = "returns the blurred field"]
pub fn box_blur(field: &ScalarField, radius: u32) -> ScalarField {
    if radius == 0 || field.width() == 0 || field.height() == 0 {
        return field.clone();
    }

    let horizontal = blur_pass(field, radius, Axis::Horizontal);
    blur_pass(&horizontal, radius, Axis::Vertical)
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// One running-sum pass along `axis`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn blur_pass(source: &ScalarField, radius: u32, axis: Axis) -> ScalarField {
    let (width, height) = source.dimensions();
    let mut out = ScalarField::new(width, height);
    let window = 2.0f64.mul_add(f64::from(radius), 1.0);
    let r = i64::from(radius);

    // `lines` runs across the axis, `len` along it.
    let (lines, len) = match axis {
        Axis::Horizontal => (height, width),
        Axis::Vertical => (width, height),
    };
    let last = i64::from(len) - 1;
    let sample = |line: u32, pos: i64| -> f64 {
        #[allow(clippy::cast_sign_loss)]
        let pos = pos.clamp(0, last) as u32;
        let value = match axis {
            Axis::Horizontal => source[(pos, line)][0],
            Axis::Vertical => source[(line, pos)][0],
        };
        f64::from(value)
    };

    for line in 0..lines {
        // The opening window is `r` copies of the first sample, the line
        // itself up to `r`, then copies of the last sample past its end.
        let inside = r.min(last);
        let mut sum = (r as f64).mul_add(sample(line, 0), (r - inside) as f64 * sample(line, last))
            + (0..=inside).map(|p| sample(line, p)).sum::<f64>();
        for pos in 0..len {
            let value = Luma([(sum / window) as f32]);
            match axis {
                Axis::Horizontal => out.put_pixel(pos, line, value),
                Axis::Vertical => out.put_pixel(line, pos, value),
            }
            let p = i64::from(pos);
            sum += sample(line, p + r + 1) - sample(line, p - r);
        }
    }

    out
}
