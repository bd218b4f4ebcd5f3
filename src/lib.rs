//! Audio dataset normalizer
//!
//! Converts a tree of heterogeneous audio files into uniform 32-bit float PCM
//! WAV files with a fixed sample rate, channel layout and bounded duration.

pub mod batch;
pub mod config;
pub mod config_file;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use batch::{BatchOutcome, BatchSummary, Scheduler, TaskResult, WorkerPool};
pub use config::{ChannelLayout, LogFormat, RunConfig, TargetConfig};
pub use error::{ErrorKind, FfmpegError, PrepError, Result};
pub use ffmpeg::version_info as ffmpeg_version_info;
pub use ffmpeg::{init, install_log_filter};
pub use frame::AudioFrame;
pub use transcode::{transcode_file, TranscodeReport};
