//! Run configuration
//!
//! `TargetConfig` is built once from user input and shared read-only by every
//! task. `RunConfig` adds the batch-level settings the scheduler needs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

/// Default output sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
/// Default lower duration bound in seconds
pub const DEFAULT_MIN_DURATION_SECS: f64 = 3.0;
/// Default upper duration bound in seconds
pub const DEFAULT_MAX_DURATION_SECS: f64 = 5.0;

/// Output channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Number of interleaved channels in an output frame.
    pub fn channels(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// The matching FFmpeg layout.
    pub fn to_ffmpeg(self) -> ffmpeg_next::util::channel_layout::ChannelLayout {
        match self {
            ChannelLayout::Mono => ffmpeg_next::util::channel_layout::ChannelLayout::MONO,
            ChannelLayout::Stereo => ffmpeg_next::util::channel_layout::ChannelLayout::STEREO,
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        ChannelLayout::Stereo
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Mono => f.write_str("mono"),
            ChannelLayout::Stereo => f.write_str("stereo"),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mono" | "1" => Ok(ChannelLayout::Mono),
            "stereo" | "2" => Ok(ChannelLayout::Stereo),
            other => Err(format!("unknown channel layout '{}' (mono|stereo)", other)),
        }
    }
}

/// Convert a duration to a sample count at the given rate.
///
/// Both duration bounds go through this so min and max round identically.
pub fn duration_to_samples(duration_secs: f64, sample_rate_hz: u32) -> u64 {
    (duration_secs * sample_rate_hz as f64).round() as u64
}

/// Normalized output format. Samples are always 32-bit float PCM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Output sample rate in Hz
    pub sample_rate_hz: u32,

    /// Output channel layout
    pub channel_layout: ChannelLayout,

    /// Outputs shorter than this are padded with silence
    pub min_duration_secs: f64,

    /// Outputs longer than this are truncated
    pub max_duration_secs: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE,
            channel_layout: ChannelLayout::default(),
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

impl TargetConfig {
    /// Check the invariants every task relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(PrepError::Config("sample rate must be positive".into()));
        }
        if self.sample_rate_hz > i32::MAX as u32 {
            return Err(PrepError::Config(format!(
                "sample rate {} is out of range",
                self.sample_rate_hz
            )));
        }
        if !self.min_duration_secs.is_finite() || self.min_duration_secs < 0.0 {
            return Err(PrepError::Config(format!(
                "minimum duration must be a non-negative number, got {}",
                self.min_duration_secs
            )));
        }
        if !self.max_duration_secs.is_finite() || self.max_duration_secs < self.min_duration_secs {
            return Err(PrepError::Config(format!(
                "maximum duration {} must be >= minimum duration {}",
                self.max_duration_secs, self.min_duration_secs
            )));
        }
        Ok(())
    }

    /// Lower bound on the output sample count (per channel).
    pub fn min_samples(&self) -> u64 {
        duration_to_samples(self.min_duration_secs, self.sample_rate_hz)
    }

    /// Upper bound on the output sample count (per channel).
    pub fn max_samples(&self) -> u64 {
        duration_to_samples(self.max_duration_secs, self.sample_rate_hz)
    }

    /// Number of output channels.
    pub fn channels(&self) -> u16 {
        self.channel_layout.channels()
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (pretty|json)", other)),
        }
    }
}

/// Batch run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory scanned for input audio
    pub input_dir: PathBuf,

    /// Root directory the normalized files are written under
    pub output_dir: PathBuf,

    /// Output format shared by every task
    pub target: TargetConfig,

    /// Requested worker count; zero or negative means available parallelism
    pub workers: i64,

    /// Optional JSON report destination
    pub report_path: Option<PathBuf>,

    /// Log output format
    pub log_format: LogFormat,
}

impl RunConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            target: TargetConfig::default(),
            workers: 0,
            report_path: None,
            log_format: LogFormat::default(),
        }
    }

    /// Validate the target, the input root, and that the output root is a
    /// different directory.
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        if !self.input_dir.is_dir() {
            return Err(PrepError::Config(format!(
                "input directory {:?} does not exist or is not a directory",
                self.input_dir
            )));
        }
        if let (Ok(input), Ok(output)) = (
            std::fs::canonicalize(&self.input_dir),
            std::fs::canonicalize(&self.output_dir),
        ) {
            if input == output {
                return Err(PrepError::Config(format!(
                    "output directory {:?} is the input directory",
                    self.output_dir
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let target = TargetConfig::default();
        assert_eq!(target.sample_rate_hz, 16000);
        assert_eq!(target.min_duration_secs, 3.0);
        assert_eq!(target.max_duration_secs, 5.0);
        assert_eq!(target.min_samples(), 48_000);
        assert_eq!(target.max_samples(), 80_000);
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_sample_count_rounds() {
        // 0.33333 * 16000 = 5333.28 -> 5333, 1.00003 * 16000 = 16000.48 -> 16000
        assert_eq!(duration_to_samples(0.33333, 16000), 5333);
        assert_eq!(duration_to_samples(1.00003, 16000), 16000);
        assert_eq!(duration_to_samples(0.1, 44100), 4410);
        assert_eq!(duration_to_samples(2.99997, 16000), 48000);
        assert_eq!(duration_to_samples(0.0, 16000), 0);
    }

    #[test]
    fn test_validate_rejects_bad_targets() {
        let bad_rate = TargetConfig {
            sample_rate_hz: 0,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        let inverted = TargetConfig {
            min_duration_secs: 5.0,
            max_duration_secs: 3.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let negative = TargetConfig {
            min_duration_secs: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let nan = TargetConfig {
            max_duration_secs: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_equal_bounds_are_valid() {
        let fixed = TargetConfig {
            min_duration_secs: 2.0,
            max_duration_secs: 2.0,
            ..Default::default()
        };
        assert!(fixed.validate().is_ok());
        assert_eq!(fixed.min_samples(), fixed.max_samples());
    }

    #[test]
    fn test_channel_layout_parse() {
        assert_eq!("mono".parse::<ChannelLayout>(), Ok(ChannelLayout::Mono));
        assert_eq!("Stereo".parse::<ChannelLayout>(), Ok(ChannelLayout::Stereo));
        assert!("5.1".parse::<ChannelLayout>().is_err());
        assert_eq!(ChannelLayout::Mono.channels(), 1);
        assert_eq!(ChannelLayout::Stereo.to_string(), "stereo");
    }

    #[test]
    fn test_run_config_rejects_missing_input() {
        let config = RunConfig::new("/definitely/not/here", "/tmp/out");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_config_rejects_output_equal_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("audio");
        std::fs::create_dir(&sub).unwrap();

        let same = RunConfig::new(sub.clone(), sub.join("."));
        let err = same.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);

        let hop = RunConfig::new(sub.clone(), sub.join("..").join("audio"));
        assert!(hop.validate().is_err());

        let separate = RunConfig::new(sub.clone(), dir.path().join("out"));
        assert!(separate.validate().is_ok());
    }
}
