//! brushflow-pipeline: gradient-flow stroke synthesis (sans-IO).
//!
//! Turns a raster image into an ordered set of brush strokes and paints
//! them over a toned base layer:
//! luminance -> box blur -> Sobel gradient/tangent field -> seed
//! collection -> bidirectional flow tracing -> scoring and ordering ->
//! bristled brush compositing.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! `RgbaImage` buffers and returns structured data. Decoding, display,
//! and file output live in callers such as `brushflow-bench`.
//!
//! Three ways to run it:
//!
//! - [`process`] / [`process_staged`] run everything in one call.
//! - [`Pipeline`] exposes each stage as a typestate for incremental,
//!   inspectable execution.
//! - [`Session`] wraps the incremental API with stale-run cancellation
//!   for callers that resume one step per frame.

pub mod blur;
pub mod brush;
pub mod diagnostics;
pub mod field;
pub mod gradient;
pub mod luminance;
pub mod occupancy;
pub mod palette;
pub mod pipeline;
pub mod preview;
pub mod rank;
pub mod seeds;
pub mod session;
pub mod trace;
pub mod types;

pub use diagnostics::{Clock, PipelineDiagnostics, SystemClock};
pub use palette::{Palette, extract_palette};
pub use pipeline::{Pipeline, STAGE_COUNT, Stage};
pub use rank::{StrokeOrderKind, StrokeOrderer};
pub use session::{Run, Session, Step};
pub use types::{
    Dimensions, PaintSummary, PipelineConfig, PipelineError, Point, ProcessResult, Rgb,
    RgbaImage, StagedResult, Stroke, StrokePoint, Tuning, source_image,
};

/// Run the full pipeline and keep every stage preview.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if the image has no pixels and
/// [`PipelineError::InvalidConfig`] if a parameter is not finite. An
/// image with no usable structure is not an error: the result has no
/// strokes and the output is the toned base layer.
pub fn process_staged(
    source: RgbaImage,
    palette: Palette,
    config: PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    let painted = Pipeline::new(source, palette, config)
        .luminance()?
        .blur()
        .build_gradient()
        .trace()
        .rank()
        .start_painting()?
        .finish();
    Ok(painted.into_result())
}

/// Run the full pipeline, returning only the composite and strokes.
///
/// # Errors
///
/// Same conditions as [`process_staged`].
pub fn process(
    source: RgbaImage,
    palette: Palette,
    config: PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let staged = process_staged(source, palette, config)?;
    Ok(ProcessResult {
        output: staged.output,
        strokes: staged.strokes,
        dimensions: staged.dimensions,
    })
}
