//! Three-color palette extraction.
//!
//! Pixels are sampled sparsely, quantized into coarse buckets, and the
//! most frequent buckets that are visually distinct are kept. The
//! result is ordered dark, mid, bright by luminance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Rgb, RgbaImage};

/// Every Nth pixel is sampled.
const SAMPLE_EVERY: usize = 6;

/// Samples more transparent than this are ignored.
const MIN_ALPHA: u8 = 200;

/// Quantization step per channel.
const BUCKET: f32 = 32.0;

/// Minimum RGB distance between selected colors.
const MIN_DISTANCE: f32 = 42.0;

/// Cap on distinct colors considered before picking three.
const MAX_SELECTED: usize = 5;

/// Exactly three colors, ordered by luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette(pub [Rgb; 3]);

impl Palette {
    /// Used when an image has no usable samples, and to pad short
    /// selections.
    pub const FALLBACK: Self = Self([
        Rgb::new(12, 28, 52),
        Rgb::new(0, 189, 171),
        Rgb::new(255, 151, 92),
    ]);

    /// Darkest color.
    #[must_use]
    pub const fn dark(&self) -> Rgb {
        self.0[0]
    }

    /// Middle color.
    #[must_use]
    pub const fn mid(&self) -> Rgb {
        self.0[1]
    }

    /// Brightest color.
    #[must_use]
    pub const fn bright(&self) -> Rgb {
        self.0[2]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::FALLBACK
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(channel: u8) -> u8 {
    ((f32::from(channel) / BUCKET).round() * BUCKET).min(255.0) as u8
}

/// Derive a palette from the dominant, mutually distinct colors of `image`.
#[must_use = "returns the extracted palette"]
pub fn extract_palette(image: &RgbaImage) -> Palette {
    // Bucket counts in first-seen order.
    let mut counts: Vec<(Rgb, usize)> = Vec::new();
    let mut index: HashMap<Rgb, usize> = HashMap::new();

    for pixel in image.pixels().step_by(SAMPLE_EVERY) {
        let [r, g, b, a] = pixel.0;
        if a < MIN_ALPHA {
            continue;
        }
        let color = Rgb::new(quantize(r), quantize(g), quantize(b));
        match index.get(&color) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(color, counts.len());
                counts.push((color, 1));
            }
        }
    }

    if counts.is_empty() {
        return Palette::FALLBACK;
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let mut selected: Vec<Rgb> = Vec::with_capacity(MAX_SELECTED);
    for (color, _) in counts {
        if selected.iter().all(|c| c.distance(color) >= MIN_DISTANCE) {
            selected.push(color);
        }
        if selected.len() >= MAX_SELECTED {
            break;
        }
    }
    while selected.len() < 3 {
        selected.push(Palette::FALLBACK.0[selected.len()]);
    }

    selected.sort_by(|a, b| a.luminance().total_cmp(&b.luminance()));
    let last = selected.len() - 1;
    Palette([selected[0], selected[selected.len() / 2], selected[last]])
}
