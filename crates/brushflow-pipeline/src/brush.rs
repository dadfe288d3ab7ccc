//! Brush compositor: toned base layer plus layered bristle strokes.
//!
//! Each stroke is painted as one wide shadow pass, a fan of jittered
//! bristle passes offset across the brush width, and a faint additive
//! highlight. Rasterization goes through `tiny-skia` so every pass is
//! anti-aliased with round caps and joins.

use rand::Rng;
use tiny_skia::{BlendMode, IntSize, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Transform};

use crate::luminance::pixel_luminance;
use crate::palette::Palette;
use crate::types::{PipelineError, Point, Rgb, RgbaImage, Stroke};

/// Nominal display frame used to size paint batches.
pub const PAINT_FRAME_MS: u64 = 16;

/// Lower bound of the painting duration budget.
pub const PAINT_BUDGET_MIN_MS: u64 = 2600;

/// Upper bound of the painting duration budget.
pub const PAINT_BUDGET_MAX_MS: u64 = 8200;

/// Budget growth per stroke before clamping.
pub const PAINT_MS_PER_STROKE: u64 = 4;

/// Time budget for painting `stroke_count` strokes.
#[must_use]
pub fn paint_budget_ms(stroke_count: usize) -> u64 {
    let per_stroke = u64::try_from(stroke_count).unwrap_or(u64::MAX);
    per_stroke
        .saturating_mul(PAINT_MS_PER_STROKE)
        .clamp(PAINT_BUDGET_MIN_MS, PAINT_BUDGET_MAX_MS)
}

/// Strokes painted per frame so the whole set fits the budget.
#[must_use]
pub fn batch_size(stroke_count: usize) -> usize {
    let frames = usize::try_from(paint_budget_ms(stroke_count) / PAINT_FRAME_MS).unwrap_or(1);
    stroke_count.div_ceil(frames.max(1)).max(1)
}

/// Per-channel multipliers for the positional grain.
const GRAIN_CHANNELS: [f32; 3] = [1.0, 0.8, 0.6];

/// Deterministic grain offset for pixel `(x, y)`.
#[allow(clippy::cast_precision_loss)]
fn grain(x: u32, y: u32) -> f32 {
    let phase = (u64::from(x) * 17 + u64::from(y) * 11) % 23;
    phase as f32 * 0.18
}

/// Palette-toned underpainting of `source`.
///
/// Each pixel blends the dark and mid palette colors by luminance, keeps
/// a little of the original, and adds positional grain.
#[must_use = "returns the base layer"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn base_layer(source: &RgbaImage, palette: &Palette) -> RgbaImage {
    let (dark, mid) = (palette.dark(), palette.mid());
    RgbaImage::from_fn(source.width(), source.height(), |x, y| {
        let pixel = source.get_pixel(x, y).0;
        let t = 0.36f32.mul_add(pixel_luminance(pixel) / 255.0, 0.16);
        let tone = dark.mix(mid, t);
        let g = grain(x, y);
        let mut out = [0u8, 0, 0, 255];
        for c in 0..3 {
            let v = 0.82f32.mul_add(
                f32::from(tone.0[c]),
                0.12f32.mul_add(f32::from(pixel[c]), g * GRAIN_CHANNELS[c]),
            );
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        image::Rgba(out)
    })
}

/// Resolved colors and sizes for one stroke.
#[derive(Debug, Clone, Copy)]
struct BrushStyle {
    body: Rgb,
    shadow: Rgb,
    highlight: Rgb,
    width: f32,
    alpha: f32,
    bristles: usize,
}

impl BrushStyle {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn new(stroke: &Stroke, palette: &Palette, load: f32) -> Self {
        let rank = (stroke.strength_rank as f32).clamp(0.0, 1.0);
        let accent = palette.mid().mix(palette.bright(), rank);
        let body = stroke.color.mix(accent, 0.3);
        Self {
            body,
            shadow: body.mix(palette.dark(), 0.45).scale(0.8),
            highlight: body.mix(Rgb::new(255, 255, 255), 0.85),
            width: 3.2f32.mul_add(load, 1.4) * 0.6f32.mul_add(rank, 0.7),
            alpha: 0.4f32.mul_add(load, 0.35) * 0.4f32.mul_add(rank, 0.6),
            bristles: 2 + 4.0f32.mul_add(load, rank * 2.0).round() as usize,
        }
    }
}

/// Unit normals along a path: `next - prev` rotated by 90°, endpoints
/// using their single neighbour. Degenerate spans get a zero normal.
fn normals(points: &[Point]) -> Vec<(f64, f64)> {
    let last = points.len().saturating_sub(1);
    (0..points.len())
        .map(|i| {
            let prev = points[i.saturating_sub(1)];
            let next = points[(i + 1).min(last)];
            let (dx, dy) = (next.x - prev.x, next.y - prev.y);
            let len = dx.hypot(dy);
            if len > f64::EPSILON {
                (-dy / len, dx / len)
            } else {
                (0.0, 0.0)
            }
        })
        .collect()
}

/// Incremental painter over a pixmap seeded with the base layer.
pub struct BrushRenderer {
    pixmap: Pixmap,
    palette: Palette,
    brush_load: f32,
}

impl BrushRenderer {
    /// Start painting on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if `base` has no pixels.
    pub fn new(base: &RgbaImage, palette: Palette, brush_load: f32) -> Result<Self, PipelineError> {
        let size = IntSize::from_wh(base.width(), base.height()).ok_or(PipelineError::EmptyInput)?;
        // The base layer is opaque, so straight and premultiplied RGBA agree.
        let pixmap = Pixmap::from_vec(base.as_raw().clone(), size).ok_or(PipelineError::EmptyInput)?;
        Ok(Self {
            pixmap,
            palette,
            brush_load: brush_load.clamp(0.0, 1.0),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw(&mut self, path: &[Point], color: Rgb, alpha: f32, width: f32, blend_mode: BlendMode) {
        let mut pb = PathBuilder::new();
        let Some(first) = path.first() else {
            return;
        };
        pb.move_to(first.x as f32, first.y as f32);
        for p in &path[1..] {
            pb.line_to(p.x as f32, p.y as f32);
        }
        let Some(path) = pb.finish() else {
            return;
        };

        let stroke = tiny_skia::Stroke {
            width: width.max(0.1),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..tiny_skia::Stroke::default()
        };
        let mut paint = Paint::default();
        let [r, g, b] = color.0;
        paint.set_color_rgba8(r, g, b, to_alpha(alpha));
        paint.anti_alias = true;
        paint.blend_mode = blend_mode;

        self.pixmap
            .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    /// Paint one stroke. Strokes with fewer than two points are skipped.
    pub fn paint_stroke<R: Rng + ?Sized>(&mut self, stroke: &Stroke, rng: &mut R) {
        if stroke.len() < 2 {
            return;
        }
        let style = BrushStyle::new(stroke, &self.palette, self.brush_load);
        let path: Vec<Point> = stroke.positions().collect();
        let normals = normals(&path);

        self.draw(
            &path,
            style.shadow,
            style.alpha * 0.35,
            style.width * 1.8,
            BlendMode::SourceOver,
        );

        let n = style.bristles;
        #[allow(clippy::cast_precision_loss)]
        let span = (n - 1).max(1) as f32;
        #[allow(clippy::cast_precision_loss)]
        let bristle_width = (style.width / n as f32 * 1.6).max(0.6);
        for i in 0..n {
            #[allow(clippy::cast_precision_loss)]
            let offset = f64::from((i as f32 / span - 0.5) * style.width);
            let tone: f32 = rng.random_range(-18.0..=18.0);
            let color = Rgb(style.body.0.map(|c| shift(c, tone)));
            let alpha = style.alpha * rng.random_range(0.75..=1.25);
            let bristle: Vec<Point> = path
                .iter()
                .zip(&normals)
                .map(|(p, (nx, ny))| {
                    let jx: f64 = rng.random_range(-0.35..=0.35);
                    let jy: f64 = rng.random_range(-0.35..=0.35);
                    Point::new(nx.mul_add(offset, p.x) + jx, ny.mul_add(offset, p.y) + jy)
                })
                .collect();
            self.draw(&bristle, color, alpha, bristle_width, BlendMode::SourceOver);
        }

        self.draw(
            &path,
            style.highlight,
            0.12,
            style.width * 0.35,
            BlendMode::Plus,
        );
    }

    /// Paint a run of strokes in order.
    pub fn paint_batch<R: Rng + ?Sized>(&mut self, strokes: &[Stroke], rng: &mut R) {
        for stroke in strokes {
            self.paint_stroke(stroke, rng);
        }
    }

    /// Snapshot of the canvas as straight-alpha RGBA.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_image(&self) -> RgbaImage {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        let data = self.pixmap.data();
        let mut img = RgbaImage::new(width, height);
        for (i, pixel) in img.pixels_mut().enumerate() {
            let off = i * 4;
            let a = data[off + 3];
            if a == 0 {
                *pixel = image::Rgba([0, 0, 0, 0]);
            } else {
                let un = |c: u8| (u16::from(c) * 255 / u16::from(a)).min(255) as u8;
                *pixel = image::Rgba([un(data[off]), un(data[off + 1]), un(data[off + 2]), a]);
            }
        }
        img
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shift(channel: u8, by: f32) -> u8 {
    (f32::from(channel) + by).round().clamp(0.0, 255.0) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_alpha(alpha: f32) -> u8 {
    (alpha.clamp(0.0, 1.0) * 255.0).round() as u8
}
