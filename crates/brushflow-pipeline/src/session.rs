//! Cooperative run management with stale-run cancellation.
//!
//! A [`Session`] hands out [`Run`]s. Each run is tagged with the
//! session's generation at the time it started; starting another run or
//! calling [`Session::reset`] bumps the generation, and every earlier run
//! observes the change on its next [`Run::step`] and stops without
//! touching any buffer.
//!
//! Runs are driven by the caller, one step per frame or timer tick:
//!
//! ```rust
//! # use brushflow_pipeline::{Palette, PipelineConfig, PipelineError, RgbaImage};
//! # use brushflow_pipeline::session::{Session, Step};
//! # fn run(image: RgbaImage) -> Result<(), PipelineError> {
//! let session = Session::new();
//! let mut run = session.start(image, Palette::FALLBACK, PipelineConfig::default());
//! while let Step::Advanced { .. } = run.step()? {
//!     // display run.stage() here
//! }
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::rc::Rc;

use crate::palette::Palette;
use crate::pipeline::{Advance, Pipeline, Stage};
use crate::types::{PipelineConfig, PipelineError, RgbaImage, StagedResult};

/// Owner of the generation counter identifying the live run.
#[derive(Debug, Default)]
pub struct Session {
    generation: Rc<Cell<u64>>,
}

impl Session {
    /// Create a session with no live run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Start a new run, invalidating any earlier one.
    pub fn start(&self, source: RgbaImage, palette: Palette, config: PipelineConfig) -> Run {
        let generation = self.bump();
        tracing::debug!(generation, "starting run");
        Run {
            generation,
            live: Rc::clone(&self.generation),
            stage: Some(Pipeline::new(source, palette, config).into()),
        }
    }

    /// Invalidate the live run without starting another.
    pub fn reset(&self) {
        let generation = self.bump();
        tracing::debug!(generation, "session reset");
    }

    fn bump(&self) -> u64 {
        let next = self.generation.get().wrapping_add(1);
        self.generation.set(next);
        next
    }
}

/// Outcome of a single [`Run::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The run moved to (or painted another batch of) the named stage.
    Advanced {
        /// Name of the current stage.
        name: &'static str,
        /// Index of the current stage.
        index: usize,
    },
    /// Every stage has completed.
    Finished,
    /// A newer run or a reset superseded this one.
    Cancelled,
}

/// One pipeline run, owned by the caller and advanced with [`step`](Self::step).
#[must_use = "a run does nothing until stepped"]
pub struct Run {
    generation: u64,
    live: Rc<Cell<u64>>,
    stage: Option<Stage>,
}

impl Run {
    /// Generation this run was started under.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer run or reset has happened since this run started.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.get() == self.generation
    }

    /// The current stage, if the run has not been cancelled.
    #[must_use]
    pub const fn stage(&self) -> Option<&Stage> {
        self.stage.as_ref()
    }

    /// Resume the run by one stage or one paint batch.
    ///
    /// A stale run drops its state and reports [`Step::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if input validation fails on the first
    /// step. The run holds no stage afterwards.
    pub fn step(&mut self) -> Result<Step, PipelineError> {
        if !self.is_live() {
            if self.stage.take().is_some() {
                tracing::warn!(
                    generation = self.generation,
                    current = self.live.get(),
                    "stale run cancelled"
                );
            }
            return Ok(Step::Cancelled);
        }
        let Some(stage) = self.stage.take() else {
            return Ok(Step::Finished);
        };
        match stage.advance()? {
            Advance::Next(next) => {
                let step = Step::Advanced {
                    name: next.name(),
                    index: next.index(),
                };
                self.stage = Some(next);
                Ok(step)
            }
            Advance::Complete(done) => {
                self.stage = Some(done);
                Ok(Step::Finished)
            }
        }
    }

    /// Drive the remaining stages without yielding.
    ///
    /// Returns `Ok(None)` if the run was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage fails.
    pub fn finish(mut self) -> Result<Option<StagedResult>, PipelineError> {
        if !self.is_live() {
            return Ok(None);
        }
        self.stage.take().map(Stage::complete).transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn edge_image() -> RgbaImage {
        RgbaImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            brush_seed: Some(5),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn run_steps_to_completion() {
        let session = Session::new();
        let mut run = session.start(edge_image(), Palette::FALLBACK, config());
        let mut names = Vec::new();
        loop {
            match run.step().unwrap() {
                Step::Advanced { name, .. } => names.push(name),
                Step::Finished => break,
                Step::Cancelled => unreachable!("run is live"),
            }
        }
        assert_eq!(names.first(), Some(&"luminance"));
        assert_eq!(names.last(), Some(&"painted"));
        assert!(run.stage().is_some_and(Stage::is_complete));
        // Stepping a finished run stays finished.
        assert_eq!(run.step().unwrap(), Step::Finished);
    }

    #[test]
    fn starting_a_new_run_cancels_the_old_one() {
        let session = Session::new();
        let mut first = session.start(edge_image(), Palette::FALLBACK, config());
        assert!(matches!(first.step().unwrap(), Step::Advanced { .. }));

        let mut second = session.start(edge_image(), Palette::FALLBACK, config());
        assert!(!first.is_live());
        assert_eq!(first.step().unwrap(), Step::Cancelled);
        assert!(first.stage().is_none());
        assert!(second.is_live());
        assert!(matches!(second.step().unwrap(), Step::Advanced { index: 1, .. }));
    }

    #[test]
    fn reset_cancels_without_replacement() {
        let session = Session::new();
        let run = session.start(edge_image(), Palette::FALLBACK, config());
        let started = run.generation();
        session.reset();
        assert_eq!(session.generation(), started + 1);
        assert!(run.finish().unwrap().is_none());
    }

    #[test]
    fn validation_error_surfaces_on_first_step() {
        let session = Session::new();
        let mut run = session.start(RgbaImage::new(0, 0), Palette::FALLBACK, config());
        assert!(matches!(run.step(), Err(PipelineError::EmptyInput)));
        assert!(run.stage().is_none());
    }

    #[test]
    fn finish_matches_stepping() {
        let session = Session::new();
        let finished = session
            .start(edge_image(), Palette::FALLBACK, config())
            .finish()
            .unwrap()
            .unwrap();

        let mut run = session.start(edge_image(), Palette::FALLBACK, config());
        while run.step().unwrap() != Step::Finished {}
        let stepped = run.finish().unwrap().unwrap();
        assert_eq!(finished.output, stepped.output);
        assert_eq!(finished.strokes, stepped.strokes);
    }
}
