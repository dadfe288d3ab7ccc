//! Stroke synthesis as a chain of typed states.
//!
//! [`crate::process_staged`] runs start to finish in one call. [`Pipeline`]
//! instead returns a value per stage, so a caller can show each preview
//! before asking for the next one:
//!
//! ```rust
//! # use brushflow_pipeline::{Palette, Pipeline, PipelineConfig, PipelineError, RgbaImage};
//! # fn run(image: RgbaImage) -> Result<(), PipelineError> {
//! let pipeline = Pipeline::new(image, Palette::FALLBACK, PipelineConfig::default())
//!     .luminance()?
//!     .blur()
//!     .build_gradient()
//!     .trace()
//!     .rank()
//!     .start_painting()?
//!     .finish();
//!
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! A stage method takes `self` by value and hands back the following
//! state, or a `Result` where the step can fail. Previews from earlier
//! stages ride along so the final [`StagedResult`] can return them all.
//!
//! Painting is the one stage that repeats: [`Painting::paint_batch`]
//! paints the next batch of strokes and returns the same stage, so a
//! driver can show the canvas filling in before calling
//! [`Painting::finish`].
//!
//! # Memory
//!
//! Every stage keeps an RGBA preview of each earlier stage at the source
//! resolution, because [`StagedResult`] hands all of them to the display
//! collaborator. Scalar fields are dropped as soon as the next stage no
//! longer needs them. Callers that only want the composite should prefer
//! [`crate::process`].

use std::cell::OnceCell;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::blur::box_blur;
use crate::brush::{BrushRenderer, base_layer, batch_size, paint_budget_ms};
use crate::diagnostics::StageMetrics;
use crate::field::ScalarField;
use crate::gradient::{GradientField, build_gradient_field};
use crate::occupancy::OccupancyMask;
use crate::palette::Palette;
use crate::preview::{heat_to_rgba, mono_to_rgba, ranked_to_rgba, strokes_to_rgba};
use crate::rank::rank_strokes;
use crate::seeds::collect_seeds;
use crate::trace::{TraceParams, TraceStats, trace_strokes};
use crate::types::{Dimensions, PipelineConfig, PipelineError, RgbaImage, StagedResult, Stroke};

/// Caller-supplied inputs carried through every stage.
struct Inputs {
    source: RgbaImage,
    palette: Palette,
    config: PipelineConfig,
}

impl Inputs {
    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.source.width(),
            height: self.source.height(),
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Inputs stored, nothing computed yet.
///
/// The source image, palette, and config are stored but not yet
/// validated. Call [`luminance`](Self::luminance) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .luminance() to continue"]
pub struct Pending {
    inputs: Inputs,
}

impl Pending {
    /// The source image.
    #[must_use]
    pub const fn source(&self) -> &RgbaImage {
        &self.inputs.source
    }

    /// Validate the inputs and extract luminance.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for an image with no pixels
    /// and [`PipelineError::InvalidConfig`] for non-finite parameters.
    /// Nothing is computed when validation fails.
    pub fn luminance(self) -> Result<Luminance, PipelineError> {
        self.inputs.config.validate()?;
        let dimensions = self.inputs.dimensions();
        if dimensions.width == 0 || dimensions.height == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let luma = crate::luminance::luminance(&self.inputs.source);
        let preview = mono_to_rgba(&luma);
        tracing::debug!(
            width = dimensions.width,
            height = dimensions.height,
            "extracted luminance"
        );
        Ok(Luminance {
            inputs: self.inputs,
            luma,
            preview,
        })
    }
}

// ──────────────────────── Stage 1: Luminance ─────────────────────────

/// Pipeline state after luminance extraction.
#[must_use = "pipeline stages are consumed by advancing; call .blur() to continue"]
pub struct Luminance {
    inputs: Inputs,
    luma: ScalarField,
    preview: RgbaImage,
}

impl Luminance {
    /// The luminance field (0-255).
    #[must_use]
    pub const fn luminance(&self) -> &ScalarField {
        &self.luma
    }

    /// Grayscale preview of the luminance field.
    #[must_use]
    pub const fn preview(&self) -> &RgbaImage {
        &self.preview
    }

    /// Box-blur the luminance field.
    pub fn blur(self) -> Blurred {
        let radius = self.inputs.config.effective_blur_radius();
        let blurred = box_blur(&self.luma, radius);
        let blurred_preview = mono_to_rgba(&blurred);
        tracing::debug!(radius, "blurred luminance");
        Blurred {
            inputs: self.inputs,
            luminance_preview: self.preview,
            blurred,
            blurred_preview,
            radius,
        }
    }
}

// ───────────────────────── Stage 2: Blurred ──────────────────────────

/// Pipeline state after the box blur.
#[must_use = "pipeline stages are consumed by advancing; call .build_gradient() to continue"]
pub struct Blurred {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred: ScalarField,
    blurred_preview: RgbaImage,
    radius: u32,
}

impl Blurred {
    /// The blurred luminance field.
    #[must_use]
    pub const fn blurred(&self) -> &ScalarField {
        &self.blurred
    }

    /// Grayscale preview of the blurred field.
    #[must_use]
    pub const fn preview(&self) -> &RgbaImage {
        &self.blurred_preview
    }

    /// Build the Sobel gradient and tangent fields.
    pub fn build_gradient(self) -> GradientBuilt {
        let field = build_gradient_field(&self.blurred, self.inputs.config.sensitivity);
        let gradient_preview = heat_to_rgba(&field.normalized);
        tracing::debug!(max_magnitude = field.max_magnitude, "built gradient field");
        GradientBuilt {
            inputs: self.inputs,
            luminance_preview: self.luminance_preview,
            blurred_preview: self.blurred_preview,
            field,
            gradient_preview,
        }
    }
}

// ─────────────────────── Stage 3: GradientBuilt ──────────────────────

/// Pipeline state after the gradient field has been built.
#[must_use = "pipeline stages are consumed by advancing; call .trace() to continue"]
pub struct GradientBuilt {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred_preview: RgbaImage,
    field: GradientField,
    gradient_preview: RgbaImage,
}

impl GradientBuilt {
    /// The gradient, magnitude, and tangent fields.
    #[must_use]
    pub const fn field(&self) -> &GradientField {
        &self.field
    }

    /// Heat-map preview of the normalized magnitude.
    #[must_use]
    pub const fn preview(&self) -> &RgbaImage {
        &self.gradient_preview
    }

    /// Collect seeds and trace strokes along the tangent field.
    pub fn trace(self) -> Traced {
        let config = &self.inputs.config;
        let dimensions = self.inputs.dimensions();
        let params = TraceParams::derive(
            dimensions,
            config.clamped_threshold(),
            config.clamped_brush_load(),
            &config.tuning,
        );
        let seeds = collect_seeds(
            &self.field.normalized,
            config.clamped_threshold(),
            params.seed_stride,
        );
        let mut mask = OccupancyMask::new(dimensions.width, dimensions.height);
        let outcome = trace_strokes(
            &self.inputs.source,
            &self.field,
            &seeds,
            &mut mask,
            &params,
            &config.tuning,
        );
        let traced_preview = strokes_to_rgba(&outcome.strokes, &mask);

        Traced {
            inputs: self.inputs,
            luminance_preview: self.luminance_preview,
            blurred_preview: self.blurred_preview,
            gradient_preview: self.gradient_preview,
            params,
            stats: outcome.stats,
            occupied_pixels: mask.occupied_count(),
            strokes: outcome.strokes,
            traced_preview,
        }
    }
}

// ───────────────────────── Stage 4: Traced ───────────────────────────

/// Pipeline state after stroke tracing.
///
/// Strokes are in seed order and not yet scored.
#[must_use = "pipeline stages are consumed by advancing; call .rank() to continue"]
pub struct Traced {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred_preview: RgbaImage,
    gradient_preview: RgbaImage,
    params: TraceParams,
    stats: TraceStats,
    occupied_pixels: usize,
    strokes: Vec<Stroke>,
    traced_preview: RgbaImage,
}

impl Traced {
    /// Accepted strokes in trace order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Parameters derived for this run.
    #[must_use]
    pub const fn params(&self) -> &TraceParams {
        &self.params
    }

    /// Seed and acceptance counters.
    #[must_use]
    pub const fn stats(&self) -> &TraceStats {
        &self.stats
    }

    /// Strokes drawn over the occupancy mask.
    #[must_use]
    pub const fn preview(&self) -> &RgbaImage {
        &self.traced_preview
    }

    /// Score, rank, and order the strokes for painting.
    pub fn rank(self) -> Ranked {
        let config = &self.inputs.config;
        let strokes = rank_strokes(self.strokes, config.order, &config.tuning);
        let ranked_preview = ranked_to_rgba(&strokes, self.inputs.dimensions());
        Ranked {
            inputs: self.inputs,
            luminance_preview: self.luminance_preview,
            blurred_preview: self.blurred_preview,
            gradient_preview: self.gradient_preview,
            traced_preview: self.traced_preview,
            strokes,
            ranked_preview,
        }
    }
}

// ───────────────────────── Stage 5: Ranked ───────────────────────────

/// Pipeline state after scoring and ordering.
#[must_use = "pipeline stages are consumed by advancing; call .start_painting() to continue"]
pub struct Ranked {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred_preview: RgbaImage,
    gradient_preview: RgbaImage,
    traced_preview: RgbaImage,
    strokes: Vec<Stroke>,
    ranked_preview: RgbaImage,
}

impl Ranked {
    /// Strokes in paint order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Strokes drawn with brightness by rank.
    #[must_use]
    pub const fn preview(&self) -> &RgbaImage {
        &self.ranked_preview
    }

    /// Lay down the base layer and prepare to paint.
    ///
    /// Bristle jitter draws from `config.brush_seed`, or from a fresh
    /// random seed when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the canvas cannot be
    /// allocated for the source dimensions.
    pub fn start_painting(self) -> Result<Painting, PipelineError> {
        let config = &self.inputs.config;
        let base = base_layer(&self.inputs.source, &self.inputs.palette);
        let renderer = BrushRenderer::new(&base, self.inputs.palette, config.clamped_brush_load())?;
        let brush_seed = config.brush_seed.unwrap_or_else(rand::random);
        let batch = batch_size(self.strokes.len());
        tracing::debug!(
            strokes = self.strokes.len(),
            batch,
            budget_ms = paint_budget_ms(self.strokes.len()),
            brush_seed,
            "painting"
        );

        Ok(Painting {
            inputs: self.inputs,
            luminance_preview: self.luminance_preview,
            blurred_preview: self.blurred_preview,
            gradient_preview: self.gradient_preview,
            traced_preview: self.traced_preview,
            ranked_preview: self.ranked_preview,
            strokes: self.strokes,
            renderer,
            rng: StdRng::seed_from_u64(brush_seed),
            brush_seed,
            painted: 0,
            batch,
            canvas: OnceCell::from(base),
        })
    }
}

// ──────────────────────── Stage 6: Painting ──────────────────────────

/// Pipeline state while strokes are being painted.
///
/// [`canvas`](Self::canvas) always shows every stroke painted so far. The
/// RGBA copy is taken from the pixmap on first request after each batch.
#[must_use = "pipeline stages are consumed by advancing; call .paint_batch() or .finish() to continue"]
pub struct Painting {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred_preview: RgbaImage,
    gradient_preview: RgbaImage,
    traced_preview: RgbaImage,
    ranked_preview: RgbaImage,
    strokes: Vec<Stroke>,
    renderer: BrushRenderer,
    rng: StdRng,
    brush_seed: u64,
    painted: usize,
    batch: usize,
    canvas: OnceCell<RgbaImage>,
}

impl Painting {
    /// The canvas as of the last painted batch.
    #[must_use]
    pub fn canvas(&self) -> &RgbaImage {
        self.canvas.get_or_init(|| self.renderer.to_image())
    }

    /// Number of strokes painted so far.
    #[must_use]
    pub const fn painted(&self) -> usize {
        self.painted
    }

    /// Total strokes to paint.
    #[must_use]
    pub fn total(&self) -> usize {
        self.strokes.len()
    }

    /// Strokes painted per batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch
    }

    /// Seed driving the bristle jitter of this run.
    #[must_use]
    pub const fn brush_seed(&self) -> u64 {
        self.brush_seed
    }

    /// Whether every stroke has been painted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.painted >= self.strokes.len()
    }

    /// Paint the next batch of strokes in order.
    pub fn paint_batch(mut self) -> Self {
        let end = (self.painted + self.batch).min(self.strokes.len());
        self.renderer
            .paint_batch(&self.strokes[self.painted..end], &mut self.rng);
        self.painted = end;
        self.canvas = OnceCell::new();
        self
    }

    /// Paint whatever remains and finish the run.
    pub fn finish(mut self) -> Painted {
        if !self.is_finished() {
            self.renderer
                .paint_batch(&self.strokes[self.painted..], &mut self.rng);
            self.painted = self.strokes.len();
        }
        let output = self.renderer.to_image();
        tracing::info!(
            strokes = self.strokes.len(),
            width = output.width(),
            height = output.height(),
            "painting complete"
        );
        Painted {
            inputs: self.inputs,
            luminance_preview: self.luminance_preview,
            blurred_preview: self.blurred_preview,
            gradient_preview: self.gradient_preview,
            traced_preview: self.traced_preview,
            ranked_preview: self.ranked_preview,
            strokes: self.strokes,
            brush_seed: self.brush_seed,
            batch: self.batch,
            output,
        }
    }
}

// ───────────────────────── Stage 7: Painted ──────────────────────────

/// Pipeline state after painting, the final stage.
///
/// [`into_result`](Self::into_result) unpacks the composite together
/// with every stage preview.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Painted {
    inputs: Inputs,
    luminance_preview: RgbaImage,
    blurred_preview: RgbaImage,
    gradient_preview: RgbaImage,
    traced_preview: RgbaImage,
    ranked_preview: RgbaImage,
    strokes: Vec<Stroke>,
    brush_seed: u64,
    batch: usize,
    output: RgbaImage,
}

impl Painted {
    /// The final composite.
    #[must_use]
    pub const fn composite(&self) -> &RgbaImage {
        &self.output
    }

    /// Strokes in paint order.
    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.inputs.dimensions()
    }

    /// Unpack the composite, strokes, and every preview.
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        let dimensions = self.inputs.dimensions();
        StagedResult {
            original: self.inputs.source,
            luminance: self.luminance_preview,
            blurred: self.blurred_preview,
            gradient: self.gradient_preview,
            traced: self.traced_preview,
            ranked: self.ranked_preview,
            strokes: self.strokes,
            palette: self.inputs.palette,
            output: self.output,
            dimensions,
        }
    }
}

// ─────────────────── Uniform access: trait and enum ───────────────────

/// Number of distinct stages, `Pending` through `Painted`.
pub const STAGE_COUNT: usize = 8;

/// What a stage has to show.
///
/// Every variant after [`Source`](Self::Source) carries an RGBA preview
/// at the source resolution, suitable for progressive display.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image (not yet processed).
    Source {
        /// The caller's image.
        image: &'a RgbaImage,
    },
    /// Luminance extraction result.
    Luminance {
        /// Grayscale preview.
        preview: &'a RgbaImage,
    },
    /// Box blur result.
    Blurred {
        /// Grayscale preview.
        preview: &'a RgbaImage,
    },
    /// Gradient field result.
    Gradient {
        /// Heat-map preview of the normalized magnitude.
        preview: &'a RgbaImage,
    },
    /// Stroke tracing result.
    Traced {
        /// Strokes over the occupancy mask.
        preview: &'a RgbaImage,
        /// The traced strokes.
        strokes: &'a [Stroke],
    },
    /// Ranking result.
    Ranked {
        /// Strokes shaded by rank.
        preview: &'a RgbaImage,
        /// Strokes in paint order.
        strokes: &'a [Stroke],
    },
    /// Painting in progress.
    Painting {
        /// The canvas so far.
        canvas: &'a RgbaImage,
        /// Strokes painted so far.
        painted: usize,
        /// Strokes to paint in total.
        total: usize,
    },
    /// Final composite.
    Painted {
        /// The finished canvas.
        output: &'a RgbaImage,
        /// Image dimensions.
        dimensions: Dimensions,
    },
}

impl StageOutput<'_> {
    /// The RGBA buffer this stage exposes for display.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        match *self {
            Self::Source { image } => image,
            Self::Luminance { preview }
            | Self::Blurred { preview }
            | Self::Gradient { preview }
            | Self::Traced { preview, .. }
            | Self::Ranked { preview, .. } => preview,
            Self::Painting { canvas, .. } => canvas,
            Self::Painted { output, .. } => output,
        }
    }
}

/// Common surface of the stage structs.
///
/// Lets generic code (diagnostics, the [`Stage`] enum) treat every
/// stage alike without knowing which one it holds.
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"trace"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `7` for
    /// Painted).
    const INDEX: usize;

    /// Preview or canvas for display.
    fn output(&self) -> StageOutput<'_>;

    /// Counters describing the work this stage did; `None` before any
    /// work has happened.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Move one step forward, or `Ok(None)` from the last stage. [`Painting`] advances to itself until every
    /// stroke has been painted.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::InvalidConfig`] when input validation fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Finish every remaining step without yielding.
    ///
    /// # Errors
    ///
    /// Same conditions as [`next`](Self::next).
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            image: &self.inputs.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Luminance(self.luminance()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.luminance()?.complete()
    }
}

impl PipelineStage for Luminance {
    const NAME: &str = "luminance";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Luminance {
            preview: &self.preview,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn metrics(&self) -> Option<StageMetrics> {
        let values = self.luma.as_raw();
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64
        };
        Some(StageMetrics::Luminance {
            width: self.luma.width(),
            height: self.luma.height(),
            mean_luminance: mean,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Blurred(self.blur())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.blur().complete()
    }
}

impl PipelineStage for Blurred {
    const NAME: &str = "blur";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Blurred {
            preview: &self.blurred_preview,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Blur {
            radius: self.radius,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::GradientBuilt(self.build_gradient())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.build_gradient().complete()
    }
}

impl PipelineStage for GradientBuilt {
    const NAME: &str = "gradient";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Gradient {
            preview: &self.gradient_preview,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Gradient {
            max_magnitude: self.field.max_magnitude,
            directed_pixel_count: self.field.directed_pixel_count(),
            total_pixel_count: self.inputs.dimensions().area(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Traced(self.trace())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.trace().complete()
    }
}

impl PipelineStage for Traced {
    const NAME: &str = "trace";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Traced {
            preview: &self.traced_preview,
            strokes: &self.strokes,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Trace {
            seed_count: self.stats.seeds,
            densified: self.stats.densified,
            occupied_skips: self.stats.occupied_skips,
            rejected: self.stats.rejected,
            accepted: self.stats.accepted,
            low_threshold: self.params.low_threshold,
            seed_stride: self.params.seed_stride,
            max_strokes: self.params.max_strokes,
            occupied_pixels: self.occupied_pixels,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Ranked(self.rank())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.rank().complete()
    }
}

impl PipelineStage for Ranked {
    const NAME: &str = "rank";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Ranked {
            preview: &self.ranked_preview,
            strokes: &self.strokes,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Rank {
            order: self.inputs.config.order.to_string(),
            stroke_count: self.strokes.len(),
            best_goodness: self
                .strokes
                .iter()
                .map(|s| s.goodness)
                .fold(0.0, f64::max),
            total_point_count: self.strokes.iter().map(Stroke::len).sum(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Painting(self.start_painting()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.start_painting()?.complete()
    }
}

impl PipelineStage for Painting {
    const NAME: &str = "painting";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Painting {
            canvas: self.canvas(),
            painted: self.painted,
            total: self.strokes.len(),
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Paint {
            stroke_count: self.strokes.len(),
            painted: self.painted,
            batch_size: self.batch,
            budget_ms: paint_budget_ms(self.strokes.len()),
            brush_seed: self.brush_seed,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        if self.is_finished() {
            return Ok(Some(Stage::Painted(self.finish())));
        }
        Ok(Some(Stage::Painting(self.paint_batch())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.finish().into_result())
    }
}

impl PipelineStage for Painted {
    const NAME: &str = "painted";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Painted {
            output: &self.output,
            dimensions: self.inputs.dimensions(),
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Paint {
            stroke_count: self.strokes.len(),
            painted: self.strokes.len(),
            batch_size: self.batch,
            budget_ms: paint_budget_ms(self.strokes.len()),
            brush_seed: self.brush_seed,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Any stage, for callers that step in a loop instead of chaining.
///
/// Every stage struct converts into it with [`From`]:
///
/// ```rust
/// # use brushflow_pipeline::{Palette, Pipeline, PipelineConfig, PipelineError, RgbaImage};
/// # use brushflow_pipeline::pipeline::{Advance, Stage};
/// # fn run(image: RgbaImage) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(image, Palette::FALLBACK, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Luminance`].
    Luminance(Luminance),
    /// See [`Blurred`].
    Blurred(Blurred),
    /// See [`GradientBuilt`].
    GradientBuilt(GradientBuilt),
    /// See [`Traced`].
    Traced(Traced),
    /// See [`Ranked`].
    Ranked(Ranked),
    /// See [`Painting`].
    Painting(Painting),
    /// See [`Painted`].
    Painted(Painted),
}

/// Fails to compile when a variant is added without updating
/// [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Luminance(_)
        | Stage::Blurred(_)
        | Stage::GradientBuilt(_)
        | Stage::Traced(_)
        | Stage::Ranked(_)
        | Stage::Painting(_)
        | Stage::Painted(_) => {}
    }
}

/// Outcome of [`Stage::advance`].
#[must_use]
pub enum Advance {
    /// A new stage, or another paint batch.
    Next(Stage),
    /// Already painted; the stage is handed back as is.
    Complete(Stage),
}

/// Forward a call to the wrapped stage struct.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Luminance(s) => s.$method($($arg),*),
            Self::Blurred(s) => s.$method($($arg),*),
            Self::GradientBuilt(s) => s.$method($($arg),*),
            Self::Traced(s) => s.$method($($arg),*),
            Self::Ranked(s) => s.$method($($arg),*),
            Self::Painting(s) => s.$method($($arg),*),
            Self::Painted(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Name of the wrapped stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Position of the wrapped stage, starting at 0.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// See [`PipelineStage::output`].
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// See [`PipelineStage::metrics`].
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// True once the composite is finished.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Painted(_))
    }

    /// See [`PipelineStage::next`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures from the first step.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Like [`next`](Self::next), but a finished stage comes back as
    /// [`Advance::Complete`] instead of being dropped.
    ///
    /// # Errors
    ///
    /// Propagates validation failures from the first step.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Only Painted returns None.
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// See [`PipelineStage::complete`].
    ///
    /// # Errors
    ///
    /// Propagates validation failures from the first step.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// The macro calls `.name()` and `.index()` on `&self`; associated
// constants are not reachable through `self.NAME`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Luminance> for Stage {
    fn from(s: Luminance) -> Self {
        Self::Luminance(s)
    }
}

impl From<Blurred> for Stage {
    fn from(s: Blurred) -> Self {
        Self::Blurred(s)
    }
}

impl From<GradientBuilt> for Stage {
    fn from(s: GradientBuilt) -> Self {
        Self::GradientBuilt(s)
    }
}

impl From<Traced> for Stage {
    fn from(s: Traced) -> Self {
        Self::Traced(s)
    }
}

impl From<Ranked> for Stage {
    fn from(s: Ranked) -> Self {
        Self::Ranked(s)
    }
}

impl From<Painting> for Stage {
    fn from(s: Painting) -> Self {
        Self::Painting(s)
    }
}

impl From<Painted> for Stage {
    fn from(s: Painted) -> Self {
        Self::Painted(s)
    }
}

// ────────────────────────── Entry point ──────────────────────────────

/// Incremental stroke-synthesis pipeline.
///
/// Created via [`Pipeline::new`], which stores the source image, palette,
/// and config without doing any processing. Each stage method consumes
/// the current state and returns the next, making it a compile-time
/// error to skip stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a source image, palette, and config.
    ///
    /// No processing or validation is performed yet. Call
    /// [`.luminance()`](Pending::luminance) (or convert to a [`Stage`]
    /// and loop) to begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(source: RgbaImage, palette: Palette, config: PipelineConfig) -> Pending {
        Pending {
            inputs: Inputs {
                source,
                palette,
                config,
            },
        }
    }
}
