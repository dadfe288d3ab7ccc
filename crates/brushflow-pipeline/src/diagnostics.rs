//! Per-stage timing and counters for tuning runs.
//!
//! [`process_staged_with_diagnostics`] drives the typed stages itself so
//! it can time each one, and returns the usual [`StagedResult`] together
//! with a [`PipelineDiagnostics`] record.
//!
//! Duration measurements use [`std::time::Duration`]. Timestamps come
//! from a caller-supplied [`Clock`]; [`SystemClock`] uses the `web-time`
//! crate, which maps to `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! In JSON, every duration is a float number of seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::palette::Palette;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{PipelineConfig, PipelineError, RgbaImage, StagedResult, Stroke};

/// `Duration` <-> seconds as `f64`.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
///
/// Abstracted so tests can supply a deterministic clock and the WASM
/// build can use the browser's monotonic timer.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Capture the current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Everything measured during one run.
///
/// One entry per processing stage, in execution order. Painting covers
/// the base layer plus every stroke batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Per-stage timings and metrics.
    pub stages: Vec<StageDiagnostics>,
    /// Wall-clock time from validation to finished composite.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Run-wide totals.
    pub summary: PipelineSummary,
}

/// Timing and counters for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name, matching [`PipelineStage::NAME`].
    pub name: String,
    /// Wall-clock time spent in the stage.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Counters specific to the stage.
    pub metrics: StageMetrics,
}

/// Counters reported by each kind of stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Luminance extraction metrics.
    Luminance {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Mean luminance over all pixels (0-255).
        mean_luminance: f64,
    },
    /// Box blur metrics.
    Blur {
        /// Effective blur radius.
        radius: u32,
    },
    /// Gradient field metrics.
    Gradient {
        /// Largest raw Sobel magnitude.
        max_magnitude: f32,
        /// Pixels with a non-zero tangent.
        directed_pixel_count: usize,
        /// Total pixel count for computing density.
        total_pixel_count: u64,
    },
    /// Stroke tracing metrics.
    Trace {
        /// Seeds visited.
        seed_count: usize,
        /// Whether the relaxed seed pass was used.
        densified: bool,
        /// Seeds skipped because their pixel was already claimed.
        occupied_skips: usize,
        /// Traces discarded for being too short or too weak.
        rejected: usize,
        /// Strokes kept.
        accepted: usize,
        /// Magnitude below which tracing stops.
        low_threshold: f32,
        /// Seed grid stride.
        seed_stride: u32,
        /// Stroke cap for this image.
        max_strokes: usize,
        /// Pixels claimed in the occupancy mask.
        occupied_pixels: usize,
    },
    /// Ranking and ordering metrics.
    Rank {
        /// Which ordering strategy was used.
        order: String,
        /// Number of ranked strokes.
        stroke_count: usize,
        /// Goodness of the strongest stroke.
        best_goodness: f64,
        /// Points across all strokes.
        total_point_count: usize,
    },
    /// Painting metrics.
    Paint {
        /// Strokes to paint.
        stroke_count: usize,
        /// Strokes painted so far.
        painted: usize,
        /// Strokes per batch.
        batch_size: usize,
        /// Nominal paint budget.
        budget_ms: u64,
        /// Seed used for bristle jitter.
        brush_seed: u64,
    },
}

/// Totals for a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of painted strokes.
    pub stroke_count: usize,
    /// Points across all painted strokes.
    pub total_point_count: usize,
}

impl PipelineDiagnostics {
    /// Look up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Plain-text table, one row per stage.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Stroke Pipeline Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}", diag.name));
        }

        lines.push(String::new());
        lines.push(format!(
            "Strokes: {}  |  Stroke points: {}",
            self.summary.stroke_count, self.summary.total_point_count,
        ));

        lines.join("\n")
    }
}

/// Milliseconds with sub-millisecond precision.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// One-line summary of a stage's counters.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Luminance {
            width,
            height,
            mean_luminance,
        } => format!("{width}x{height} mean={mean_luminance:.1}"),
        StageMetrics::Blur { radius } => format!("radius={radius}"),
        StageMetrics::Gradient {
            max_magnitude,
            directed_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *directed_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("max={max_magnitude:.1} directed={directed_pixel_count} ({density:.1}%)")
        }
        StageMetrics::Trace {
            seed_count,
            densified,
            occupied_skips,
            rejected,
            accepted,
            seed_stride,
            max_strokes,
            ..
        } => {
            let pass = if *densified { " (densified)" } else { "" };
            format!(
                "{seed_count} seeds{pass} stride={seed_stride}, {accepted}/{max_strokes} kept, {rejected} rejected, {occupied_skips} claimed",
            )
        }
        StageMetrics::Rank {
            order,
            stroke_count,
            best_goodness,
            total_point_count,
        } => format!("{order} {stroke_count} strokes, {total_point_count} pts, best={best_goodness:.1}"),
        StageMetrics::Paint {
            stroke_count,
            painted,
            batch_size,
            budget_ms,
            brush_seed,
        } => format!(
            "{painted}/{stroke_count} strokes, batch={batch_size} budget={budget_ms}ms seed={brush_seed}",
        ),
    }
}

/// Time `f` on `clock`.
fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let value = f();
    (value, clock.elapsed(&start))
}

fn record<S: PipelineStage>(stages: &mut Vec<StageDiagnostics>, stage: &S, duration: Duration) {
    if let Some(metrics) = stage.metrics() {
        stages.push(StageDiagnostics {
            name: S::NAME.to_owned(),
            duration,
            metrics,
        });
    }
}

/// Run the whole pipeline, timing each stage on `clock`.
///
/// # Errors
///
/// Returns [`PipelineError`] under the same conditions as
/// [`crate::process_staged`].
pub fn process_staged_with_diagnostics(
    source: RgbaImage,
    palette: Palette,
    config: PipelineConfig,
    clock: &impl Clock,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();
    let mut stages = Vec::with_capacity(6);

    let pending = Pipeline::new(source, palette, config);

    let (luminance, d) = timed(clock, || pending.luminance());
    let luminance = luminance?;
    record(&mut stages, &luminance, d);

    let (blurred, d) = timed(clock, || luminance.blur());
    record(&mut stages, &blurred, d);

    let (gradient, d) = timed(clock, || blurred.build_gradient());
    record(&mut stages, &gradient, d);

    let (traced, d) = timed(clock, || gradient.trace());
    record(&mut stages, &traced, d);

    let (ranked, d) = timed(clock, || traced.rank());
    record(&mut stages, &ranked, d);

    let (painted, d) = timed(clock, || ranked.start_painting().map(|p| p.finish()));
    let painted = painted?;
    record(&mut stages, &painted, d);

    let dimensions = painted.dimensions();
    let summary = PipelineSummary {
        image_width: dimensions.width,
        image_height: dimensions.height,
        pixel_count: dimensions.area(),
        stroke_count: painted.strokes().len(),
        total_point_count: painted.strokes().iter().map(Stroke::len).sum(),
    };
    let diagnostics = PipelineDiagnostics {
        stages,
        total_duration: clock.elapsed(&total_start),
        summary,
    };
    Ok((painted.into_result(), diagnostics))
}
