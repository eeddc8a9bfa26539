//! kintsugi: restore scanned photographs from the command line.
//!
//! Accepts up to five images per run, pushes them through the
//! restoration queue one at a time, prints live per-task progress, and
//! writes a `<name>-restored.<ext>` file next to each input (or into
//! `--out-dir`). Finishes with an aggregate "N succeeded, M failed"
//! summary.
//!
//! # Usage
//!
//! ```text
//! kintsugi [OPTIONS] <IMAGES>...
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kintsugi_pipeline::{
    ContrastSettings, DenoiseSettings, OutputFormat, OutputSettings, RestorationOptions,
    ScratchSettings, SharpenSettings, SuperResolutionSettings,
};
use kintsugi_queue::{
    CapabilityLoader, QueueLimits, TaskEvent, TaskEventKind, TaskId, TaskQueue, TaskStatus,
};

/// Restore scanned photographs: denoise, contrast recovery, sharpening,
/// and scratch repair.
#[derive(Parser)]
#[command(name = "kintsugi", version)]
struct Cli {
    /// Input image files (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Disable the denoise stage.
    #[arg(long)]
    no_denoise: bool,

    /// Denoise strength (0-100).
    #[arg(long, default_value_t = 50)]
    denoise_strength: u8,

    /// Disable the auto-contrast stage.
    #[arg(long)]
    no_contrast: bool,

    /// Auto-contrast strength (0-100).
    #[arg(long, default_value_t = 50)]
    contrast_strength: u8,

    /// Disable the sharpen stage.
    #[arg(long)]
    no_sharpen: bool,

    /// Sharpen strength (0-100).
    #[arg(long, default_value_t = 50)]
    sharpen_strength: u8,

    /// Disable the scratch-repair stage.
    #[arg(long)]
    no_scratch_repair: bool,

    /// Scratch-repair strength (0-100).
    #[arg(long, default_value_t = 50)]
    scratch_strength: u8,

    /// Request the experimental super-resolution stage. The current
    /// filter chain reports it unavailable rather than running it.
    #[arg(long)]
    super_resolution: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Png)]
    format: Format,

    /// Output quality (50-100; applies to JPEG).
    #[arg(long, default_value_t = 90)]
    quality: u8,

    /// Directory for restored images. Defaults to each input's own
    /// directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Engine load timeout in seconds.
    #[arg(long, default_value_t = 30)]
    load_timeout: u64,

    /// Full restoration options as a JSON string.
    ///
    /// When provided, all individual stage flags are ignored. The JSON
    /// must be a valid `RestorationOptions` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Output format selection.
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// JPEG (lossy; honors --quality).
    Jpg,
    /// PNG (lossless).
    Png,
    /// WebP (lossless).
    Webp,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jpg => Self::Jpg,
            Format::Png => Self::Png,
            Format::Webp => Self::Webp,
        }
    }
}

/// Build [`RestorationOptions`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual stage flags are ignored.
fn options_from_cli(cli: &Cli) -> Result<RestorationOptions, String> {
    if let Some(json) = &cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("error parsing --config-json: {e}"));
    }

    Ok(RestorationOptions {
        denoise: DenoiseSettings {
            enabled: !cli.no_denoise,
            strength: cli.denoise_strength,
        },
        auto_contrast: ContrastSettings {
            enabled: !cli.no_contrast,
            strength: cli.contrast_strength,
            ..ContrastSettings::default()
        },
        sharpen: SharpenSettings {
            enabled: !cli.no_sharpen,
            strength: cli.sharpen_strength,
            ..SharpenSettings::default()
        },
        scratch_repair: ScratchSettings {
            enabled: !cli.no_scratch_repair,
            strength: cli.scratch_strength,
        },
        super_resolution: SuperResolutionSettings {
            enabled: cli.super_resolution,
        },
        output: OutputSettings {
            format: cli.format.into(),
            quality: cli.quality,
        },
    })
}

/// Where the restored copy of `input` goes.
fn output_path(input: &Path, out_dir: Option<&Path>, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "restored".to_string(), |s| s.to_string_lossy().into_owned());
    let file_name = format!("{stem}-restored.{}", format.extension());
    out_dir
        .map_or_else(|| input.parent().unwrap_or(Path::new(".")).to_path_buf(), Path::to_path_buf)
        .join(file_name)
}

fn print_event(names: &HashMap<TaskId, String>, event: &TaskEvent) {
    let name = names
        .get(&event.task_id)
        .map_or("<unknown>", String::as_str);
    match &event.kind {
        TaskEventKind::Started => println!("{name}: started"),
        TaskEventKind::Progress { percent, message } => {
            println!("{name}: {percent:>3}% {message}");
        }
        TaskEventKind::Completed { elapsed } => {
            println!("{name}: completed in {:.2}s", elapsed.as_secs_f64());
        }
        TaskEventKind::Failed { error } => println!("{name}: failed: {error}"),
        TaskEventKind::Removed => println!("{name}: removed"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match options_from_cli(&cli) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(&cli, options))
}

async fn run(cli: &Cli, options: RestorationOptions) -> ExitCode {
    let loader = Arc::new(CapabilityLoader::bundled(Duration::from_secs(
        cli.load_timeout,
    )));
    let queue = TaskQueue::new(loader, options, QueueLimits::default());
    let mut events = queue.subscribe();

    // Accept inputs; rejected files never become tasks.
    let mut names: HashMap<TaskId, String> = HashMap::new();
    let mut inputs: HashMap<TaskId, PathBuf> = HashMap::new();
    let mut rejected = 0_usize;
    for path in &cli.images {
        let display_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) => {
                eprintln!("{display_name}: cannot read: {error}");
                rejected += 1;
                continue;
            }
        };
        match queue.enqueue(display_name.clone(), bytes) {
            Ok(id) => {
                names.insert(id, display_name);
                inputs.insert(id, path.clone());
            }
            Err(error) => {
                eprintln!("{display_name}: rejected: {error}");
                rejected += 1;
            }
        }
    }

    if names.is_empty() {
        eprintln!("no images accepted");
        return ExitCode::FAILURE;
    }
    debug!(accepted = names.len(), rejected, "inputs validated");

    // Run the batch, printing progress events as they arrive.
    let run = queue.run_all();
    tokio::pin!(run);
    let summary = loop {
        tokio::select! {
            summary = &mut run => break summary,
            event = events.recv() => {
                if let Some(event) = event {
                    print_event(&names, &event);
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&names, &event);
    }

    // Write out every completed result.
    let mut write_errors = 0_usize;
    for snapshot in queue.tasks() {
        if snapshot.status != TaskStatus::Completed {
            continue;
        }
        let Some(result) = &snapshot.result else {
            continue;
        };
        let Some(input) = inputs.get(&snapshot.id) else {
            continue;
        };
        let destination = output_path(input, cli.out_dir.as_deref(), result.format);
        match std::fs::write(&destination, &result.bytes) {
            Ok(()) => println!(
                "{}: wrote {} ({}x{})",
                snapshot.name,
                destination.display(),
                result.width,
                result.height,
            ),
            Err(error) => {
                eprintln!("{}: cannot write {}: {error}", snapshot.name, destination.display());
                write_errors += 1;
            }
        }
    }

    if rejected > 0 {
        println!("{summary} ({rejected} rejected before queueing)");
    } else {
        println!("{summary}");
    }

    if summary.failed == 0 && rejected == 0 && write_errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
