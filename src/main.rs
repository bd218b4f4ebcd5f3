//! wavprep command-line entry point
//!
//! Normalizes every audio file under INPUT_DIR into a mirrored tree of
//! fixed-format WAV files under OUTPUT_DIR.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wavprep::batch::{
    resolve_worker_count, scan, BatchOutcome, Outcome, Scheduler, TaskResult, WorkerPool,
};
use wavprep::config::{ChannelLayout, LogFormat, RunConfig};
use wavprep::config_file::{generate_default_config, ConfigFile};
use wavprep::error::{FfmpegError, PrepError, Result};
use wavprep::transcode::encoder::is_output_supported;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "wavprep";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory scanned recursively for audio files
    #[arg(required_unless_present = "write_default_config")]
    input_dir: Option<PathBuf>,

    /// Directory the normalized WAV files are written under
    #[arg(required_unless_present = "write_default_config")]
    output_dir: Option<PathBuf>,

    /// Output sample rate in Hz [default: 16000]
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Minimum output duration in seconds; shorter files are padded with silence [default: 3.0]
    #[arg(long)]
    min_duration: Option<f64>,

    /// Maximum output duration in seconds; longer files are truncated [default: 5.0]
    #[arg(long)]
    max_duration: Option<f64>,

    /// Output channel layout (mono, stereo) [default: stereo]
    #[arg(long)]
    channels: Option<ChannelLayout>,

    /// Concurrent workers; 0 uses all available cores
    #[arg(long, visible_alias = "workers")]
    threads: Option<i64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log output format (pretty, json)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Write a default configuration file to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

impl Args {
    /// Merge defaults, the optional config file and explicit options.
    fn into_run_config(self) -> Result<(RunConfig, Option<String>)> {
        let input_dir = self.input_dir.unwrap_or_default();
        let output_dir = self.output_dir.unwrap_or_default();
        let mut config = RunConfig::new(input_dir, output_dir);
        let mut log_level = None;

        if let Some(path) = &self.config {
            let file = ConfigFile::from_file(path)?;
            file.apply(&mut config)?;
            log_level = file.log_level().map(str::to_string);
        }

        if let Some(rate) = self.sample_rate {
            config.target.sample_rate_hz = rate;
        }
        if let Some(min) = self.min_duration {
            config.target.min_duration_secs = min;
        }
        if let Some(max) = self.max_duration {
            config.target.max_duration_secs = max;
        }
        if let Some(layout) = self.channels {
            config.target.channel_layout = layout;
        }
        if let Some(threads) = self.threads {
            config.workers = threads;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config.report_path = self.report;

        Ok((config, log_level))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        return match generate_default_config(path) {
            Ok(()) => {
                println!("Wrote default configuration to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let (config, log_level) = match args.into_run_config() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.log_format, log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RunConfig) -> Result<()> {
    config.validate()?;

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", wavprep::ffmpeg_version_info());

    // Initialize FFmpeg and quiet its per-packet noise before any worker starts
    wavprep::init()?;
    wavprep::install_log_filter();
    if !is_output_supported() {
        return Err(FfmpegError::EncoderNotFound(
            "pcm_f32le encoder not found in this FFmpeg build".into(),
        )
        .into());
    }

    let workers = resolve_worker_count(config.workers);
    tracing::info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        sample_rate = config.target.sample_rate_hz,
        channels = %config.target.channel_layout,
        min_samples = config.target.min_samples(),
        max_samples = config.target.max_samples(),
        workers,
        "configuration loaded"
    );

    let scheduler = Scheduler::new(config.target, WorkerPool::new(workers));

    let abort = scheduler.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing files in progress...");
            abort.store(true, Ordering::SeqCst);
        }
    });

    let (input_dir, output_dir) = (config.input_dir.clone(), config.output_dir.clone());
    let scanned = tokio::task::spawn_blocking(move || scan(&input_dir, &output_dir))
        .await
        .map_err(|e| PrepError::Worker(format!("scan task failed: {}", e)))?;

    if scanned.is_empty() {
        println!("No audio files found.");
        println!("{}", BatchOutcome::NoFilesFound.summary_line());
        return Ok(());
    }
    println!("Found {} audio files", scanned.discovered());

    let summary = scheduler.execute(scanned, print_result).await?;

    if summary.was_aborted() {
        println!("Aborted: {} files not processed", summary.skipped);
    }
    println!("{}", summary.summary_line());

    if let Some(path) = &config.report_path {
        summary.write_report(path)?;
        tracing::info!(path = %path.display(), "report written");
    }

    Ok(())
}

/// One progress line per finished file.
fn print_result(result: &TaskResult) {
    match &result.outcome {
        Outcome::Success { .. } => println!("Processed: {}", result.input.display()),
        Outcome::Failure { message, .. } => {
            eprintln!("Failed: {} - {}", result.input.display(), message)
        }
    }
}

/// Initialize logging with tracing
fn init_logging(format: LogFormat, level: Option<&str>) {
    let default_filter = match level {
        Some(level) => format!("wavprep={},ffmpeg=warn", level),
        None => "wavprep=info,ffmpeg=warn".to_string(),
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
