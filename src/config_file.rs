//! Configuration file support
//!
//! Loads run settings from TOML files. Values from the file sit between the
//! built-in defaults and explicit command-line options.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{
    ChannelLayout, LogFormat, RunConfig, DEFAULT_MAX_DURATION_SECS, DEFAULT_MIN_DURATION_SECS,
    DEFAULT_SAMPLE_RATE,
};
use crate::error::{PrepError, Result};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Output format settings
    #[serde(default)]
    pub target: TargetSettings,
    /// Worker pool settings
    pub workers: Option<WorkerSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

/// Output format settings; absent keys keep the current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSettings {
    /// Output sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Output channel layout (mono, stereo)
    pub channels: Option<ChannelLayout>,
    /// Minimum output duration in seconds
    pub min_duration_secs: Option<f64>,
    /// Maximum output duration in seconds
    pub max_duration_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Concurrent workers; 0 uses all available cores
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PrepError::filesystem(path, e))?;
        toml::from_str(&content)
            .map_err(|e| PrepError::Config(format!("invalid config file {:?}: {}", path, e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| PrepError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| PrepError::filesystem(path, e))?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        Self {
            target: TargetSettings {
                sample_rate: Some(DEFAULT_SAMPLE_RATE),
                channels: Some(ChannelLayout::default()),
                min_duration_secs: Some(DEFAULT_MIN_DURATION_SECS),
                max_duration_secs: Some(DEFAULT_MAX_DURATION_SECS),
            },
            workers: Some(WorkerSettings { count: 0 }),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Overlay the file's settings onto `config`.
    pub fn apply(&self, config: &mut RunConfig) -> Result<()> {
        if let Some(rate) = self.target.sample_rate {
            config.target.sample_rate_hz = rate;
        }
        if let Some(min) = self.target.min_duration_secs {
            config.target.min_duration_secs = min;
        }
        if let Some(max) = self.target.max_duration_secs {
            config.target.max_duration_secs = max;
        }
        if let Some(layout) = self.target.channels {
            config.target.channel_layout = layout;
        }
        if let Some(workers) = &self.workers {
            config.workers = workers.count;
        }
        if let Some(format) = self.logging.as_ref().and_then(|l| l.format.as_deref()) {
            config.log_format = format.parse::<LogFormat>().map_err(PrepError::Config)?;
        }
        Ok(())
    }

    /// Log level from the `[logging]` section, if any.
    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().map(|l| l.level.as_str())
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default_config();
        assert_eq!(config.target.sample_rate, Some(16000));
        assert_eq!(config.target.min_duration_secs, Some(3.0));
        assert_eq!(config.target.max_duration_secs, Some(5.0));
        assert_eq!(config.log_level(), Some("info"));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = ConfigFile::default_config();

        let mut temp_file = NamedTempFile::new().unwrap();
        let content = toml::to_string_pretty(&config).unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.target.sample_rate, config.target.sample_rate);
        assert_eq!(loaded.target.channels, Some(ChannelLayout::Stereo));
    }

    #[test]
    fn test_partial_file_applies_over_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            r#"
[target]
sample_rate = 22050
channels = "mono"
min_duration_secs = 1.0
max_duration_secs = 2.5

[workers]
count = 3
"#
        )
        .unwrap();

        let file = ConfigFile::from_file(temp_file.path()).unwrap();
        let mut config = RunConfig::new("/in", "/out");
        file.apply(&mut config).unwrap();

        assert_eq!(config.target.sample_rate_hz, 22050);
        assert_eq!(config.target.channel_layout, ChannelLayout::Mono);
        assert_eq!(config.target.max_samples(), 55125);
        assert_eq!(config.workers, 3);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(file.log_level(), None);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[target]\nsample_rate = \"fast\"\n").unwrap();
        let err = ConfigFile::from_file(temp_file.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        assert!(path.exists());
        let loaded = ConfigFile::from_file(&path).unwrap();
        assert_eq!(loaded.target.sample_rate, Some(16000));
    }

    #[test]
    fn test_single_target_key_keeps_other_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[target]\nsample_rate = 22050\n").unwrap();

        let file = ConfigFile::from_file(temp_file.path()).unwrap();
        let mut config = RunConfig::new("/in", "/out");
        file.apply(&mut config).unwrap();

        assert_eq!(config.target.sample_rate_hz, 22050);
        assert_eq!(config.target.min_duration_secs, DEFAULT_MIN_DURATION_SECS);
        assert_eq!(config.target.max_duration_secs, DEFAULT_MAX_DURATION_SECS);
        assert_eq!(config.target.channel_layout, ChannelLayout::Stereo);
    }

    #[test]
    fn test_file_without_target_section() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[workers]\ncount = 2\n\n[logging]\nlevel = \"debug\"\n")
            .unwrap();

        let file = ConfigFile::from_file(temp_file.path()).unwrap();
        let mut config = RunConfig::new("/in", "/out");
        file.apply(&mut config).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.target.sample_rate_hz, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.target.max_duration_secs, DEFAULT_MAX_DURATION_SECS);
        assert_eq!(file.log_level(), Some("debug"));
    }
}
