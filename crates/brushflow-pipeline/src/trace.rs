//! Bidirectional flow tracing from seeds into strokes.
//!
//! Each seed is followed along the tangent field in both directions. The
//! walk low-pass filters its direction so it does not zig-zag across
//! single-pixel ridges, and stops where the edge fades, the tangent
//! vanishes, or the path leaves the image interior. Accepted strokes
//! claim their neighbourhood in the [`OccupancyMask`] before the next
//! seed is considered.

use serde::{Deserialize, Serialize};

use crate::gradient::GradientField;
use crate::occupancy::OccupancyMask;
use crate::seeds::{Seed, SeedSet};
use crate::types::{Dimensions, Point, Rgb, RgbaImage, Stroke, StrokePoint, Tuning};

/// Strokes whose average strength falls below this fraction of the low
/// threshold are rejected.
pub const MIN_AVERAGE_FACTOR: f64 = 0.92;

/// Maximum number of path points sampled for a stroke's color.
pub const COLOR_SAMPLES: usize = 12;

/// Tracing parameters derived from the threshold and brush load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    /// Normalized magnitude below which a walk stops.
    pub low_threshold: f32,
    /// Grid spacing for seed collection.
    pub seed_stride: u32,
    /// Stop accepting strokes once this many exist.
    pub max_strokes: usize,
    /// Iteration cap for each direction of a walk.
    pub max_steps: usize,
    /// Minimum point count and minimum arc length of a stroke.
    pub min_points: usize,
    /// Distance advanced per step, in pixels.
    pub step_size: f64,
    /// Radius of the disk claimed around every accepted point.
    pub occupancy_radius: u32,
}

impl TraceParams {
    /// Derive parameters for an image of `dimensions`.
    ///
    /// `threshold` is clamped to 0-255 and `brush_load` to 0-1.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn derive(dimensions: Dimensions, threshold: f32, brush_load: f32, tuning: &Tuning) -> Self {
        let threshold = threshold.clamp(0.0, 255.0);
        let load = f64::from(brush_load.clamp(0.0, 1.0));

        let seed_stride = 2.4f64.mul_add(-load, 6.0).round().clamp(2.0, 6.0) as u32;
        let cells = dimensions.area() as f64 / f64::from(seed_stride * seed_stride);
        let max_strokes = (cells * 0.09).round().clamp(260.0, 3200.0) as usize;
        let max_steps = 58.0f64.mul_add(load, 36.0).round().clamp(26.0, 96.0) as usize;
        let min_points = 6.0f64.mul_add(load, 5.0).round().clamp(5.0, 12.0) as usize;
        let radius = tuning
            .occupancy_radius_per_load
            .mul_add(brush_load.clamp(0.0, 1.0), tuning.occupancy_radius_base);

        Self {
            low_threshold: (threshold * 0.45).max(4.0),
            seed_stride,
            max_strokes,
            max_steps,
            min_points,
            step_size: 0.25f64.mul_add(load, 1.05),
            occupancy_radius: radius.round().clamp(1.0, 2.0) as u32,
        }
    }
}

/// Which way along the tangent field a walk proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    const fn sign(self) -> f64 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }
}

/// Walk the tangent field from `start` in one direction.
///
/// The first recorded point is `start` itself (if it passes the stop
/// checks). Returns the visited points in walk order.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn follow_flow(
    field: &GradientField,
    start: Point,
    direction: Direction,
    params: &TraceParams,
    tuning: &Tuning,
) -> Vec<StrokePoint> {
    let max_x = i64::from(field.width()) - 2;
    let max_y = i64::from(field.height()) - 2;
    let blend = tuning.previous_direction_weight;

    let mut position = start;
    let mut previous: Option<(f64, f64)> = None;
    let mut points = Vec::new();

    for _ in 0..params.max_steps {
        let (px, py) = position.round_to_pixel();
        if px < 1 || py < 1 || px > max_x || py > max_y {
            break;
        }
        let (x, y) = (px as u32, py as u32);

        let strength = field.normalized[(x, y)][0];
        if strength < params.low_threshold {
            break;
        }
        let (tx, ty) = field.tangent.get(x, y);
        if tx == 0.0 && ty == 0.0 {
            break;
        }

        let sign = direction.sign();
        let mut candidate = (f64::from(tx) * sign, f64::from(ty) * sign);
        let heading = match previous {
            None => candidate,
            Some(prev) => {
                // Tangents are only defined up to sign.
                if prev.0.mul_add(candidate.0, prev.1 * candidate.1) < 0.0 {
                    candidate = (-candidate.0, -candidate.1);
                }
                let bx = blend.mul_add(prev.0, (1.0 - blend) * candidate.0);
                let by = blend.mul_add(prev.1, (1.0 - blend) * candidate.1);
                let len = bx.hypot(by);
                if len > f64::EPSILON {
                    (bx / len, by / len)
                } else {
                    candidate
                }
            }
        };

        points.push(StrokePoint {
            position,
            strength: f64::from(strength),
        });
        position = Point::new(
            heading.0.mul_add(params.step_size, position.x),
            heading.1.mul_add(params.step_size, position.y),
        );
        previous = Some(heading);
    }

    points
}

/// Average source color over up to [`COLOR_SAMPLES`] evenly spaced points.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sample_color(source: &RgbaImage, points: &[StrokePoint]) -> Rgb {
    let count = points.len().min(COLOR_SAMPLES);
    if count == 0 || source.width() == 0 || source.height() == 0 {
        return Rgb::new(0, 0, 0);
    }
    let max_x = i64::from(source.width()) - 1;
    let max_y = i64::from(source.height()) - 1;

    let mut sum = [0u32; 3];
    for i in 0..count {
        let index = if count == 1 {
            0
        } else {
            i * (points.len() - 1) / (count - 1)
        };
        let (x, y) = points[index].position.round_to_pixel();
        let pixel = source.get_pixel(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32);
        for (acc, channel) in sum.iter_mut().zip(pixel.0) {
            *acc += u32::from(channel);
        }
    }
    Rgb(sum.map(|s| (s as f32 / count as f32).round() as u8))
}

/// Trace one seed in both directions and build a stroke.
///
/// Returns `None` when the merged path is too short, too weak, or has
/// less arc length than `min_points`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trace_from_seed(
    source: &RgbaImage,
    field: &GradientField,
    seed: &Seed,
    params: &TraceParams,
    tuning: &Tuning,
) -> Option<Stroke> {
    let start = Point::new(f64::from(seed.x), f64::from(seed.y));
    let forward = follow_flow(field, start, Direction::Forward, params, tuning);
    let mut backward = follow_flow(field, start, Direction::Backward, params, tuning);
    if forward.is_empty() && backward.is_empty() {
        return None;
    }

    backward.reverse();
    let mut points = backward;
    points.extend(forward.into_iter().skip(1));
    if points.len() < params.min_points {
        return None;
    }

    let length: f64 = points
        .windows(2)
        .map(|w| w[0].position.distance(w[1].position))
        .sum();
    let n = points.len() as f64;
    let average_strength = points.iter().map(|p| p.strength).sum::<f64>() / n;
    let peak_strength = points.iter().map(|p| p.strength).fold(0.0, f64::max);
    let centroid = Point::new(
        points.iter().map(|p| p.position.x).sum::<f64>() / n,
        points.iter().map(|p| p.position.y).sum::<f64>() / n,
    );

    if average_strength < MIN_AVERAGE_FACTOR * f64::from(params.low_threshold)
        || length < params.min_points as f64
    {
        return None;
    }

    Some(Stroke {
        color: sample_color(source, &points),
        points,
        length,
        average_strength,
        peak_strength,
        centroid,
        goodness: 0.0,
        strength_rank: 0.0,
    })
}

/// Counters describing one tracing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceStats {
    /// Seeds handed to the tracer.
    pub seeds: usize,
    /// Seeds skipped because their pixel was already claimed.
    pub occupied_skips: usize,
    /// Traces that produced no acceptable stroke.
    pub rejected: usize,
    /// Strokes kept.
    pub accepted: usize,
    /// Whether the seed collector had to rescan more densely.
    pub densified: bool,
}

/// Accepted strokes in seed order, plus counters.
#[derive(Debug, Clone, Default)]
pub struct TraceOutcome {
    pub strokes: Vec<Stroke>,
    pub stats: TraceStats,
}

/// Trace every seed in order, claiming occupancy as strokes are accepted.
#[must_use = "returns the traced strokes"]
pub fn trace_strokes(
    source: &RgbaImage,
    field: &GradientField,
    seeds: &SeedSet,
    mask: &mut OccupancyMask,
    params: &TraceParams,
    tuning: &Tuning,
) -> TraceOutcome {
    let mut outcome = TraceOutcome {
        strokes: Vec::new(),
        stats: TraceStats {
            seeds: seeds.seeds.len(),
            densified: seeds.densified,
            ..TraceStats::default()
        },
    };

    for seed in &seeds.seeds {
        if outcome.strokes.len() >= params.max_strokes {
            break;
        }
        if mask.is_occupied(i64::from(seed.x), i64::from(seed.y)) {
            outcome.stats.occupied_skips += 1;
            continue;
        }
        let Some(stroke) = trace_from_seed(source, field, seed, params, tuning) else {
            outcome.stats.rejected += 1;
            continue;
        };
        for point in &stroke.points {
            mask.mark_disk(point.position, params.occupancy_radius);
        }
        outcome.strokes.push(stroke);
    }

    outcome.stats.accepted = outcome.strokes.len();
    tracing::debug!(
        seeds = outcome.stats.seeds,
        occupied_skips = outcome.stats.occupied_skips,
        rejected = outcome.stats.rejected,
        accepted = outcome.stats.accepted,
        densified = outcome.stats.densified,
        "traced strokes"
    );
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blur::box_blur;
    use crate::gradient::build_gradient_field;
    use crate::luminance::luminance;
    use crate::seeds::collect_seeds;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    /// Dark left, bright right, switching at column `step`.
    fn step_image(width: u32, height: u32, step: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| {
            if x < step {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    fn field_for(image: &RgbaImage) -> GradientField {
        build_gradient_field(&box_blur(&luminance(image), 0), 1.0)
    }

    #[test]
    fn params_follow_brush_load_formulas() {
        let tuning = Tuning::default();
        let light = TraceParams::derive(dims(32, 32), 50.0, 0.0, &tuning);
        assert!((light.low_threshold - 22.5).abs() < 1e-6);
        assert_eq!(light.seed_stride, 6);
        assert_eq!(light.max_strokes, 260);
        assert_eq!(light.max_steps, 36);
        assert_eq!(light.min_points, 5);
        assert!((light.step_size - 1.05).abs() < 1e-9);
        assert_eq!(light.occupancy_radius, 1);

        let heavy = TraceParams::derive(dims(32, 32), 50.0, 1.0, &tuning);
        assert_eq!(heavy.seed_stride, 4);
        assert_eq!(heavy.max_steps, 94);
        assert_eq!(heavy.min_points, 11);
        assert!((heavy.step_size - 1.3).abs() < 1e-9);
        assert_eq!(heavy.occupancy_radius, 2);
    }

    #[test]
    fn params_clamp_extremes() {
        let tuning = Tuning::default();
        let big = TraceParams::derive(dims(2000, 2000), 2.0, 1.0, &tuning);
        assert_eq!(big.max_strokes, 3200);
        assert!((big.low_threshold - 4.0).abs() < f32::EPSILON);

        let wild = TraceParams::derive(dims(10, 10), 900.0, 7.0, &tuning);
        assert!((wild.low_threshold - 255.0 * 0.45).abs() < 1e-3);
        assert_eq!(wild.min_points, 11);
    }

    #[test]
    fn vertical_step_traces_near_full_column() {
        let image = step_image(8, 8, 4);
        let field = field_for(&image);
        let params = TraceParams::derive(dims(8, 8), 50.0, 0.0, &Tuning::default());
        let seed = Seed {
            x: 4,
            y: 4,
            strength: field.normalized[(4, 4)][0],
        };

        let stroke = trace_from_seed(&image, &field, &seed, &params, &Tuning::default()).unwrap();
        assert_eq!(stroke.len(), 6);
        for point in &stroke.points {
            assert!((point.position.x - 4.0).abs() < 1e-9, "crossed the step");
        }
        let ys: Vec<f64> = stroke.positions().map(|p| p.y).collect();
        assert!(ys.windows(2).all(|w| w[1] > w[0]), "not monotonic: {ys:?}");
        assert!((ys[0] - 0.85).abs() < 1e-9);
        assert!((ys[5] - 6.1).abs() < 1e-9);
        assert!((stroke.length - 5.25).abs() < 1e-9);
        assert!((stroke.average_strength - 255.0).abs() < 1e-6);
        assert_eq!(stroke.color, Rgb::new(255, 255, 255));
    }

    #[test]
    fn seed_below_low_threshold_is_rejected() {
        let image = step_image(8, 8, 4);
        let field = field_for(&image);
        let params = TraceParams::derive(dims(8, 8), 50.0, 0.0, &Tuning::default());
        let seed = Seed {
            x: 1,
            y: 4,
            strength: 0.0,
        };
        assert!(trace_from_seed(&image, &field, &seed, &params, &Tuning::default()).is_none());
    }

    #[test]
    fn short_paths_are_rejected() {
        // A 6x6 image only leaves room for 4 interior rows.
        let image = step_image(6, 6, 3);
        let field = field_for(&image);
        let params = TraceParams::derive(dims(6, 6), 50.0, 0.0, &Tuning::default());
        let seed = Seed {
            x: 3,
            y: 3,
            strength: 255.0,
        };
        assert!(trace_from_seed(&image, &field, &seed, &params, &Tuning::default()).is_none());
    }

    #[test]
    fn backward_walk_mirrors_forward_walk() {
        let image = step_image(8, 8, 4);
        let field = field_for(&image);
        let params = TraceParams::derive(dims(8, 8), 50.0, 0.0, &Tuning::default());
        let start = Point::new(4.0, 4.0);
        let fwd = follow_flow(&field, start, Direction::Forward, &params, &Tuning::default());
        let bwd = follow_flow(&field, start, Direction::Backward, &params, &Tuning::default());
        assert_eq!(fwd.len(), 3);
        assert_eq!(bwd.len(), 4);
        assert_eq!(fwd[0].position, start);
        assert_eq!(bwd[0].position, start);
        assert!(bwd[1].position.y < start.y);
    }

    #[test]
    fn occupancy_prevents_duplicates_along_one_edge() {
        let image = step_image(32, 32, 12);
        let field = field_for(&image);
        let tuning = Tuning::default();
        let params = TraceParams::derive(dims(32, 32), 50.0, 0.0, &tuning);
        let seeds = collect_seeds(&field.normalized, 50.0, params.seed_stride);
        let mut mask = OccupancyMask::new(32, 32);

        let outcome = trace_strokes(&image, &field, &seeds, &mut mask, &params, &tuning);
        assert_eq!(outcome.strokes.len(), 1);
        assert_eq!(outcome.stats.accepted, 1);
        assert_eq!(outcome.stats.seeds, 6);
        assert_eq!(outcome.stats.occupied_skips, 5);
        assert!(outcome.stats.densified);
        assert!(mask.occupied_count() > 0);
        for y in 1..=30 {
            assert!(mask.is_occupied(12, y), "row {y} unclaimed");
        }
    }

    #[test]
    fn accepted_strokes_meet_minimums() {
        let image = step_image(40, 40, 17);
        let field = field_for(&image);
        let tuning = Tuning::default();
        for load in [0.0, 0.5, 1.0] {
            let params = TraceParams::derive(dims(40, 40), 30.0, load, &tuning);
            let seeds = collect_seeds(&field.normalized, 30.0, params.seed_stride);
            let mut mask = OccupancyMask::new(40, 40);
            let outcome = trace_strokes(&image, &field, &seeds, &mut mask, &params, &tuning);
            for stroke in &outcome.strokes {
                assert!(stroke.len() >= params.min_points);
                assert!(
                    stroke.average_strength
                        >= MIN_AVERAGE_FACTOR * f64::from(params.low_threshold)
                );
            }
        }
    }

    #[test]
    fn max_strokes_caps_acceptance() {
        // Bright band between columns 12 and 19 gives two separate edges.
        let image = RgbaImage::from_fn(32, 32, |x, _| {
            if (12..20).contains(&x) {
                image::Rgba([200, 200, 200, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let field = field_for(&image);
        let tuning = Tuning::default();
        let seeds = SeedSet {
            seeds: vec![
                Seed {
                    x: 12,
                    y: 5,
                    strength: 255.0,
                },
                Seed {
                    x: 20,
                    y: 5,
                    strength: 255.0,
                },
            ],
            densified: false,
        };
        let mut params = TraceParams::derive(dims(32, 32), 50.0, 0.0, &tuning);

        let mut mask = OccupancyMask::new(32, 32);
        let both = trace_strokes(&image, &field, &seeds, &mut mask, &params, &tuning);
        assert_eq!(both.strokes.len(), 2);

        params.max_strokes = 1;
        let mut mask = OccupancyMask::new(32, 32);
        let capped = trace_strokes(&image, &field, &seeds, &mut mask, &params, &tuning);
        assert_eq!(capped.strokes.len(), 1);
    }

    #[test]
    fn color_samples_are_clamped_to_the_image() {
        let image = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let points = [
            StrokePoint {
                position: Point::new(-3.0, 1.0),
                strength: 1.0,
            },
            StrokePoint {
                position: Point::new(9.0, 9.0),
                strength: 1.0,
            },
        ];
        assert_eq!(sample_color(&image, &points), Rgb::new(10, 20, 30));
        assert_eq!(sample_color(&image, &[]), Rgb::new(0, 0, 0));
    }
}
