//! Shared types for the brushflow stroke pipeline.

use serde::{Deserialize, Serialize};

use crate::palette::Palette;
use crate::rank::StrokeOrderKind;

/// Re-export `RgbaImage` so downstream crates can pass source images
/// and read composites without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in continuous image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Nearest pixel coordinate, as signed integers so callers can
    /// bounds-check positions that drifted off the image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn round_to_pixel(self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Linear interpolation toward `other`; `t = 0` is `self`, `t = 1`
    /// is `other`. Channels are rounded to the nearest integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn mix(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self(std::array::from_fn(|c| {
            let a = f32::from(self.0[c]);
            let b = f32::from(other.0[c]);
            (b - a).mul_add(t, a).round().clamp(0.0, 255.0) as u8
        }))
    }

    /// Multiply every channel by `factor` (clamped to the byte range).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn scale(self, factor: f32) -> Self {
        Self(self.0.map(|c| (f32::from(c) * factor).round().clamp(0.0, 255.0) as u8))
    }

    /// Rec. 709 relative luminance on the 0-255 scale.
    #[must_use]
    pub fn luminance(self) -> f32 {
        let [r, g, b] = self.0.map(f32::from);
        0.0722f32.mul_add(b, 0.2126f32.mul_add(r, 0.7152 * g))
    }

    /// Euclidean distance in RGB space.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        let d: [f32; 3] =
            std::array::from_fn(|c| f32::from(self.0[c]) - f32::from(other.0[c]));
        d[2].mul_add(d[2], d[0].mul_add(d[0], d[1] * d[1])).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Build a source image from raw RGBA8 bytes, checking the buffer
/// length against the declared dimensions.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if either dimension is zero and
/// [`PipelineError::BufferSizeMismatch`] if `pixels` is not exactly
/// `width * height * 4` bytes long.
pub fn source_image(width: u32, height: u32, pixels: Vec<u8>) -> Result<RgbaImage, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::EmptyInput);
    }
    let expected = width as usize * height as usize * 4;
    let actual = pixels.len();
    if actual != expected {
        return Err(PipelineError::BufferSizeMismatch {
            width,
            height,
            expected,
            actual,
        });
    }
    RgbaImage::from_raw(width, height, pixels).ok_or(PipelineError::BufferSizeMismatch {
        width,
        height,
        expected,
        actual,
    })
}

/// A sampled position along a traced stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    /// Continuous (sub-pixel) position.
    pub position: Point,
    /// Normalized gradient magnitude at the nearest pixel (0-255).
    pub strength: f64,
}

/// A traced brush stroke with its derived statistics.
///
/// Created by the tracer; the scorer fills in [`goodness`](Self::goodness)
/// and [`strength_rank`](Self::strength_rank).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Ordered path points.
    pub points: Vec<StrokePoint>,
    /// Sum of distances between consecutive points.
    pub length: f64,
    /// Mean strength across all points.
    pub average_strength: f64,
    /// Maximum strength across all points.
    pub peak_strength: f64,
    /// Mean position of all points.
    pub centroid: Point,
    /// Source color averaged along the path.
    pub color: Rgb,
    /// Quality score assigned by the scorer.
    pub goodness: f64,
    /// Goodness relative to the best stroke of the run (0-1).
    pub strength_rank: f64,
}

impl Stroke {
    /// Number of points in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the stroke has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over the path positions.
    pub fn positions(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().map(|p| p.position)
    }
}

/// Empirically tuned constants used by the tracer and the ranker.
///
/// The defaults are the values the pipeline was tuned with; they carry
/// no derivation and are exposed so they can be adjusted without code
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Weight of the previous step direction when blending with the new
    /// tangent (the candidate gets `1 - weight`).
    pub previous_direction_weight: f64,
    /// Number of strokes examined per pick during spatial reordering.
    pub lookahead_window: usize,
    /// Distance penalty added per position inside the lookahead window.
    pub window_index_penalty: f64,
    /// Occupancy disk radius at zero brush load.
    pub occupancy_radius_base: f32,
    /// Occupancy disk radius growth per unit of brush load.
    pub occupancy_radius_per_load: f32,
}

impl Tuning {
    pub const DEFAULT_PREVIOUS_DIRECTION_WEIGHT: f64 = 0.4;
    pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 36;
    pub const DEFAULT_WINDOW_INDEX_PENALTY: f64 = 2.4;
    pub const DEFAULT_OCCUPANCY_RADIUS_BASE: f32 = 0.8;
    pub const DEFAULT_OCCUPANCY_RADIUS_PER_LOAD: f32 = 1.4;
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            previous_direction_weight: Self::DEFAULT_PREVIOUS_DIRECTION_WEIGHT,
            lookahead_window: Self::DEFAULT_LOOKAHEAD_WINDOW,
            window_index_penalty: Self::DEFAULT_WINDOW_INDEX_PENALTY,
            occupancy_radius_base: Self::DEFAULT_OCCUPANCY_RADIUS_BASE,
            occupancy_radius_per_load: Self::DEFAULT_OCCUPANCY_RADIUS_PER_LOAD,
        }
    }
}

/// Configuration for the stroke pipeline.
///
/// Out-of-range values are clamped where they are consumed (threshold to
/// 0-255, brush load to 0-1, negative blur radius to 0). Only non-finite
/// values are rejected, by [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Multiplier applied to the normalized gradient magnitude.
    pub sensitivity: f32,

    /// Seed threshold on the normalized magnitude (0-255). The tracer's
    /// stopping threshold is derived from it.
    pub threshold: f32,

    /// Box blur radius in pixels. Negative values behave like 0.
    pub blur_radius: i32,

    /// Single 0-1 knob scaling stroke density, trace length, and
    /// brush thickness/alpha together.
    pub brush_load: f32,

    /// Strategy used to order strokes for painting.
    #[serde(default)]
    pub order: StrokeOrderKind,

    /// Tuned tracing and ordering constants.
    #[serde(default)]
    pub tuning: Tuning,

    /// Fixed seed for bristle jitter. `None` draws a fresh seed per run.
    #[serde(default)]
    pub brush_seed: Option<u64>,
}

impl PipelineConfig {
    pub const DEFAULT_SENSITIVITY: f32 = 1.6;
    pub const DEFAULT_THRESHOLD: f32 = 48.0;
    pub const DEFAULT_BLUR_RADIUS: i32 = 1;
    pub const DEFAULT_BRUSH_LOAD: f32 = 0.55;

    /// Reject configurations that would poison the numeric stages.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// non-finite parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let checks = [
            ("sensitivity", f64::from(self.sensitivity)),
            ("threshold", f64::from(self.threshold)),
            ("brush_load", f64::from(self.brush_load)),
            (
                "tuning.previous_direction_weight",
                self.tuning.previous_direction_weight,
            ),
            (
                "tuning.window_index_penalty",
                self.tuning.window_index_penalty,
            ),
            (
                "tuning.occupancy_radius_base",
                f64::from(self.tuning.occupancy_radius_base),
            ),
            (
                "tuning.occupancy_radius_per_load",
                f64::from(self.tuning.occupancy_radius_per_load),
            ),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Threshold clamped to the 0-255 magnitude scale.
    #[must_use]
    pub fn clamped_threshold(&self) -> f32 {
        self.threshold.clamp(0.0, 255.0)
    }

    /// Brush load clamped to 0-1.
    #[must_use]
    pub fn clamped_brush_load(&self) -> f32 {
        self.brush_load.clamp(0.0, 1.0)
    }

    /// Blur radius with negative values treated as 0.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn effective_blur_radius(&self) -> u32 {
        if self.blur_radius < 0 {
            0
        } else {
            self.blur_radius as u32
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sensitivity: Self::DEFAULT_SENSITIVITY,
            threshold: Self::DEFAULT_THRESHOLD,
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            brush_load: Self::DEFAULT_BRUSH_LOAD,
            order: StrokeOrderKind::default(),
            tuning: Tuning::default(),
            brush_seed: None,
        }
    }
}

/// Summary statistics for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaintSummary {
    /// Number of strokes painted.
    pub stroke_count: usize,
    /// Whether any stroke was found at all.
    pub has_strokes: bool,
}

impl PaintSummary {
    /// Summary for a stroke list.
    #[must_use]
    pub const fn for_strokes(strokes: &[Stroke]) -> Self {
        Self {
            stroke_count: strokes.len(),
            has_strokes: !strokes.is_empty(),
        }
    }
}

/// Result of running the pipeline with all intermediate stage outputs preserved.
///
/// Each raster field is the RGBA8 preview of one stage at the source
/// resolution, so a display collaborator can show every step.
///
/// Uses custom `Serialize`/`Deserialize` implementations because
/// `image` buffers do not implement serde traits. Raster images are
/// serialized as `(width, height, raw_pixels)` tuples.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Source image as supplied by the caller.
    pub original: RgbaImage,
    /// Luminance preview.
    pub luminance: RgbaImage,
    /// Blurred luminance preview.
    pub blurred: RgbaImage,
    /// Normalized gradient magnitude as a heat map.
    pub gradient: RgbaImage,
    /// Traced strokes over the occupancy mask.
    pub traced: RgbaImage,
    /// Ranked strokes, brightness by rank.
    pub ranked: RgbaImage,
    /// Strokes in paint order, scored and ranked.
    pub strokes: Vec<Stroke>,
    /// Palette used for toning and accents.
    pub palette: Palette,
    /// Final composite.
    pub output: RgbaImage,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// Stroke count and emptiness for status reporting.
    #[must_use]
    pub fn summary(&self) -> PaintSummary {
        PaintSummary::for_strokes(&self.strokes)
    }
}

/// Final composite and paint-ordered strokes, without intermediates.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Final composite.
    pub output: RgbaImage,
    /// Strokes in paint order.
    pub strokes: Vec<Stroke>,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl ProcessResult {
    /// Stroke count and emptiness for status reporting.
    #[must_use]
    pub fn summary(&self) -> PaintSummary {
        PaintSummary::for_strokes(&self.strokes)
    }
}

type RawImage = (u32, u32, Vec<u8>);

/// Serde-compatible proxy for `StagedResult`.
#[derive(Serialize, Deserialize)]
struct StagedResultProxy {
    original: RawImage,
    luminance: RawImage,
    blurred: RawImage,
    gradient: RawImage,
    traced: RawImage,
    ranked: RawImage,
    strokes: Vec<Stroke>,
    palette: Palette,
    output: RawImage,
    dimensions: Dimensions,
}

fn raw(image: &RgbaImage) -> RawImage {
    (image.width(), image.height(), image.as_raw().clone())
}

fn from_raw<E: serde::de::Error>(raw: RawImage, what: &str) -> Result<RgbaImage, E> {
    RgbaImage::from_raw(raw.0, raw.1, raw.2)
        .ok_or_else(|| E::custom(format!("invalid {what} image dimensions")))
}

impl Serialize for StagedResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = StagedResultProxy {
            original: raw(&self.original),
            luminance: raw(&self.luminance),
            blurred: raw(&self.blurred),
            gradient: raw(&self.gradient),
            traced: raw(&self.traced),
            ranked: raw(&self.ranked),
            strokes: self.strokes.clone(),
            palette: self.palette,
            output: raw(&self.output),
            dimensions: self.dimensions,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StagedResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = StagedResultProxy::deserialize(deserializer)?;
        Ok(Self {
            original: from_raw(proxy.original, "original")?,
            luminance: from_raw(proxy.luminance, "luminance")?,
            blurred: from_raw(proxy.blurred, "blurred")?,
            gradient: from_raw(proxy.gradient, "gradient")?,
            traced: from_raw(proxy.traced, "traced")?,
            ranked: from_raw(proxy.ranked, "ranked")?,
            strokes: proxy.strokes,
            palette: proxy.palette,
            output: from_raw(proxy.output, "output")?,
            dimensions: proxy.dimensions,
        })
    }
}

/// Errors that can occur before the pipeline starts.
///
/// Sparse inputs (no seeds, no strokes) are not errors: the run completes
/// with an empty stroke list and a base-layer composite.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The pixel buffer does not match the declared dimensions.
    #[error(
        "pixel buffer holds {actual} bytes but a {width}x{height} RGBA image needs {expected}"
    )]
    BufferSizeMismatch {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Bytes required by the declared dimensions.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// The input image has zero width or height.
    #[error("input image has no pixels")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_rounds_to_nearest_pixel() {
        assert_eq!(Point::new(2.49, 3.5).round_to_pixel(), (2, 4));
        assert_eq!(Point::new(-0.6, 0.2).round_to_pixel(), (-1, 0));
    }

    #[test]
    fn rgb_mix_endpoints_and_midpoint() {
        let a = Rgb::new(0, 100, 200);
        let b = Rgb::new(100, 200, 0);
        assert_eq!(a.mix(b, 0.0), a);
        assert_eq!(a.mix(b, 1.0), b);
        assert_eq!(a.mix(b, 0.5), Rgb::new(50, 150, 100));
    }

    #[test]
    fn rgb_luminance_orders_primaries() {
        let r = Rgb::new(255, 0, 0).luminance();
        let g = Rgb::new(0, 255, 0).luminance();
        let b = Rgb::new(0, 0, 255).luminance();
        assert!(g > r && r > b);
    }

    #[test]
    fn source_image_accepts_matching_buffer() {
        let img = source_image(3, 2, vec![0; 24]).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn source_image_rejects_mismatched_buffer() {
        let err = source_image(3, 2, vec![0; 20]).unwrap_err();
        assert_eq!(
            err,
            PipelineError::BufferSizeMismatch {
                width: 3,
                height: 2,
                expected: 24,
                actual: 20,
            }
        );
    }

    #[test]
    fn source_image_rejects_zero_dimensions() {
        assert_eq!(source_image(0, 5, vec![]), Err(PipelineError::EmptyInput));
    }

    #[test]
    fn config_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_non_finite_values() {
        let config = PipelineConfig {
            sensitivity: f32::NAN,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("sensitivity")
        ));

        let config = PipelineConfig {
            tuning: Tuning {
                window_index_penalty: f64::INFINITY,
                ..Tuning::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_clamps_out_of_range_values() {
        let config = PipelineConfig {
            threshold: 400.0,
            brush_load: -2.0,
            blur_radius: -3,
            ..PipelineConfig::default()
        };
        assert!((config.clamped_threshold() - 255.0).abs() < f32::EPSILON);
        assert!(config.clamped_brush_load().abs() < f32::EPSILON);
        assert_eq!(config.effective_blur_radius(), 0);
    }

    #[test]
    fn config_serde_round_trip_with_missing_optional_fields() {
        let json = r#"{"sensitivity":2.0,"threshold":30.0,"blur_radius":2,"brush_load":0.8}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tuning, Tuning::default());
        assert_eq!(config.order, StrokeOrderKind::default());
        assert_eq!(config.brush_seed, None);

        let back: PipelineConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn error_display() {
        assert_eq!(PipelineError::EmptyInput.to_string(), "input image has no pixels");
        assert_eq!(
            PipelineError::InvalidConfig("bad".into()).to_string(),
            "invalid pipeline configuration: bad",
        );
    }

    #[test]
    fn staged_result_serde_round_trip() {
        let staged = StagedResult {
            original: RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255])),
            luminance: RgbaImage::from_pixel(2, 2, image::Rgba([18, 18, 18, 255])),
            blurred: RgbaImage::from_pixel(2, 2, image::Rgba([18, 18, 18, 255])),
            gradient: RgbaImage::from_pixel(2, 2, image::Rgba([20, 34, 51, 255])),
            traced: RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255])),
            ranked: RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255])),
            strokes: Vec::new(),
            palette: Palette::FALLBACK,
            output: RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255])),
            dimensions: Dimensions {
                width: 2,
                height: 2,
            },
        };
        let json = serde_json::to_string(&staged).unwrap();
        let back: StagedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output.as_raw(), staged.output.as_raw());
        assert_eq!(back.palette, staged.palette);
        assert_eq!(back.dimensions, staged.dimensions);
        assert!(!back.summary().has_strokes);
    }
}
