//! brushflow-bench: CLI tool for stroke-pipeline experimentation and diagnostics.
//!
//! Runs the gradient-flow stroke pipeline on a given image file with
//! configurable parameters, printing detailed per-stage diagnostics.
//! Useful for:
//!
//! - Comparing stroke ordering strategies (`locality` vs `strength`)
//! - Tuning threshold, sensitivity, blur radius, and brush load
//! - Finding which stage dominates the run time
//! - Dumping every stage preview to disk for visual inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin brushflow-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use brushflow_pipeline::diagnostics::{PipelineDiagnostics, process_staged_with_diagnostics};
use brushflow_pipeline::{
    Palette, PipelineConfig, RgbaImage, Session, Step, StrokeOrderKind, SystemClock,
    extract_palette,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Stroke-pipeline experimentation and diagnostics for brushflow.
///
/// Runs the pipeline on a given image with configurable parameters and
/// prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "brushflow-bench", version)]
struct Cli {
    /// Image to paint (any format the `image` crate decodes: PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Multiplier on the normalized gradient magnitude.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SENSITIVITY)]
    sensitivity: f32,

    /// Seed threshold on the normalized magnitude (0-255).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Box blur radius in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_RADIUS, allow_negative_numbers = true)]
    blur_radius: i32,

    /// Brush load (0-1): stroke density, length, and thickness.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BRUSH_LOAD)]
    brush_load: f32,

    /// Stroke ordering strategy.
    #[arg(long, value_enum, default_value_t = Order::Locality)]
    order: Order,

    /// Fixed seed for bristle jitter (random when omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Write the final composite PNG to this path.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write one PNG per stage preview into this directory.
    #[arg(long)]
    stages_dir: Option<PathBuf>,

    /// Repeat the timed run this many times and average.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Print diagnostics as JSON.
    #[arg(long)]
    json: bool,

    /// Serialized `PipelineConfig`; overrides every parameter flag.
    #[arg(long)]
    config_json: Option<String>,

    /// Log pipeline progress (repeat for more detail).
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Stroke ordering strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Order {
    /// Greedy nearest-centroid walk over a lookahead window.
    Locality,
    /// Pure goodness order.
    Strength,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config-json` wins over the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        sensitivity: cli.sensitivity,
        threshold: cli.threshold,
        blur_radius: cli.blur_radius,
        brush_load: cli.brush_load,
        order: match cli.order {
            Order::Locality => StrokeOrderKind::LocalityWindow,
            Order::Strength => StrokeOrderKind::StrengthOnly,
        },
        brush_seed: cli.seed,
        ..PipelineConfig::default()
    })
}

/// Log filter from `RUST_LOG` and the `-v` count.
///
/// A valid `RUST_LOG` is used as given; otherwise the default is `warn`.
/// Each `-v` raises the global level on top of either.
fn log_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let filter = rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()));
    if verbose == 0 {
        filter
    } else {
        filter.add_directive(level.into())
    }
}

fn init_logging(verbose: u8) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = match image::open(&cli.image_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let palette = extract_palette(&source);

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        source.width(),
        source.height(),
    );
    eprintln!("Palette: {:?}", palette.0);
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match process_staged_with_diagnostics(source.clone(), palette, config.clone(), &SystemClock)
        {
            Ok((_, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Images come from a separate, stepped run so every stage can be saved.
    if (cli.output.is_some() || cli.stages_dir.is_some())
        && let Err(msg) = write_images(&cli, source, palette, config)
    {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Step a session run to completion, saving each stage as it finishes.
fn write_images(
    cli: &Cli,
    source: RgbaImage,
    palette: Palette,
    config: PipelineConfig,
) -> Result<(), String> {
    if let Some(ref dir) = cli.stages_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    }

    let session = Session::new();
    let mut run = session.start(source, palette, config);
    let mut saved_painting = false;
    loop {
        let step = run.step().map_err(|e| format!("Pipeline error: {e}"))?;
        let Step::Advanced { name, index } = step else {
            break;
        };
        let Some(ref dir) = cli.stages_dir else {
            continue;
        };
        // The first painting frame shows the base layer; later batches
        // only matter through the final composite.
        if name == "painting" {
            if saved_painting {
                continue;
            }
            saved_painting = true;
        }
        if let Some(stage) = run.stage() {
            save_png(stage.output().image(), &dir.join(format!("{index}-{name}.png")))?;
        }
    }

    let Some(result) = run.finish().map_err(|e| format!("Pipeline error: {e}"))? else {
        return Err("Run was cancelled before completion".to_owned());
    };
    let summary = result.summary();
    eprintln!(
        "Painted {} strokes{}",
        summary.stroke_count,
        if summary.has_strokes {
            ""
        } else {
            " (no structure found, base layer only)"
        },
    );
    if let Some(ref path) = cli.output {
        save_png(&result.output, path)?;
    }
    Ok(())
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<(), String> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Mean, min, and max of `values` in milliseconds.
#[allow(clippy::cast_precision_loss)]
fn spread(values: &[f64]) -> (f64, f64, f64) {
    let min = values.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = values.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };
    (mean, min, max)
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Per-stage averages across runs, keyed by the first run's stage order.
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    println!();
    println!("Summary ({} runs)\n{}", all_diagnostics.len(), "=".repeat(60));

    let totals: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| millis(d.total_duration))
        .collect();
    let (mean, min, max) = spread(&totals);
    println!("Total: mean={mean:.3}ms  min={min:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12} {:>12} {:>12}", "Stage", "Mean (ms)", "Min (ms)", "Max (ms)");
    println!("{}", "-".repeat(64));
    for stage in &first.stages {
        let times: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stage(&stage.name))
            .map(|s| millis(s.duration))
            .collect();
        let (mean, min, max) = spread(&times);
        println!("{:<24} {mean:>10.3}ms {min:>10.3}ms {max:>10.3}ms", stage.name);
    }

    let strokes: Vec<usize> = all_diagnostics.iter().map(|d| d.summary.stroke_count).collect();
    if strokes.windows(2).any(|w| w[0] != w[1]) {
        println!();
        println!("Warning: stroke counts differ between runs: {strokes:?}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_pipeline_defaults() {
        let cli = Cli::parse_from(["brushflow-bench", "in.png"]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "brushflow-bench",
            "in.png",
            "--threshold",
            "90",
            "--blur-radius",
            "-1",
            "--order",
            "strength",
            "--seed",
            "17",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.threshold - 90.0).abs() < f32::EPSILON);
        assert_eq!(config.blur_radius, -1);
        assert_eq!(config.order, StrokeOrderKind::StrengthOnly);
        assert_eq!(config.brush_seed, Some(17));
    }

    #[test]
    fn config_json_replaces_flags() {
        let json = serde_json::to_string(&PipelineConfig {
            brush_load: 0.9,
            ..PipelineConfig::default()
        })
        .unwrap();
        let cli = Cli::parse_from(["brushflow-bench", "in.png", "--threshold", "1", "--config-json", &json]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.brush_load - 0.9).abs() < f32::EPSILON);
        assert!((config.threshold - PipelineConfig::DEFAULT_THRESHOLD).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_config_json_is_reported() {
        let cli = Cli::parse_from(["brushflow-bench", "in.png", "--config-json", "{"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn spread_of_empty_and_single_values() {
        assert_eq!(spread(&[]), (0.0, 0.0, 0.0));
        assert_eq!(spread(&[2.0, 4.0]), (3.0, 2.0, 4.0));
    }

    fn enabled_under(filter: EnvFilter, level: tracing::Level) -> bool {
        use tracing_subscriber::layer::SubscriberExt;
        let subscriber = tracing_subscriber::registry().with(filter);
        tracing::subscriber::with_default(subscriber, || match level {
            tracing::Level::DEBUG => tracing::enabled!(tracing::Level::DEBUG),
            tracing::Level::INFO => tracing::enabled!(tracing::Level::INFO),
            _ => tracing::enabled!(tracing::Level::WARN),
        })
    }

    #[test]
    fn rust_log_is_honored_without_verbose_flag() {
        assert!(enabled_under(log_filter(0, Some("debug")), tracing::Level::DEBUG));
    }

    #[test]
    fn default_filter_is_warn() {
        assert!(enabled_under(log_filter(0, None), tracing::Level::WARN));
        assert!(!enabled_under(log_filter(0, None), tracing::Level::INFO));
    }

    #[test]
    fn verbose_flags_raise_the_level() {
        assert!(enabled_under(log_filter(1, None), tracing::Level::INFO));
        assert!(!enabled_under(log_filter(1, None), tracing::Level::DEBUG));
        assert!(enabled_under(log_filter(2, Some("warn")), tracing::Level::DEBUG));
    }

    #[test]
    fn zero_runs_are_rejected() {
        assert!(Cli::try_parse_from(["brushflow-bench", "in.png", "--runs", "0"]).is_err());
    }
}
