use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the preprocessor
#[derive(Error, Debug)]
pub enum PrepError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// The input container parsed but holds no audio stream
    #[error("No audio stream found in {0}")]
    NoAudioStream(PathBuf),

    /// The decoder ran to end of stream without producing a single frame
    #[error("No decodable audio data in {0}")]
    NoDecodableAudio(PathBuf),

    /// A sample rate or channel layout conversion that cannot be performed
    #[error("Invalid conversion: {0}")]
    InvalidConversion(String),

    /// Creating an output directory or writing an output file failed
    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two inputs map onto the same output path
    #[error("Output path {output:?} already claimed by {claimed_by:?}")]
    OutputCollision { output: PathBuf, claimed_by: PathBuf },

    /// The output path names an existing input file
    #[error("Output path {0:?} would overwrite an input file")]
    OutputOverwritesInput(PathBuf),

    /// Invalid run or target configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker died without reporting a result
    #[error("Worker failure: {0}")]
    Worker(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening or probing an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The decoder for the selected stream could not be created
    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    /// Fatal decoder failure (individual bad packets are skipped, not raised)
    #[error("Failed to decode: {0}")]
    Decode(String),

    /// Failure creating an audio resampler
    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    /// Failure converting a frame through the resampler
    #[error("Resampling failed: {0}")]
    Resample(String),

    /// The requested encoder is not part of this FFmpeg build
    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    /// Failure instantiating or opening an encoder
    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    /// Failure encoding a single frame into a packet
    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    /// Failure creating an output format muxer
    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    /// Failure writing the container header
    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    /// Failure writing a media packet to the container
    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    /// Failure writing the container trailer
    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),
}

/// Closed classification of per-task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Open,
    Decode,
    Resample,
    Encode,
    Filesystem,
    Config,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Open => "OpenError",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::Resample => "ResampleError",
            ErrorKind::Encode => "EncodeError",
            ErrorKind::Filesystem => "FilesystemError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl FfmpegError {
    /// Which pipeline stage this failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FfmpegError::InitFailed(_) => ErrorKind::Internal,
            FfmpegError::OpenInput(_) => ErrorKind::Open,
            FfmpegError::DecoderCreate(_) | FfmpegError::Decode(_) => ErrorKind::Decode,
            FfmpegError::ResamplerCreate(_) | FfmpegError::Resample(_) => ErrorKind::Resample,
            FfmpegError::EncoderNotFound(_)
            | FfmpegError::EncoderCreate(_)
            | FfmpegError::EncodeFrame(_)
            | FfmpegError::MuxerCreate(_)
            | FfmpegError::WriteHeader(_)
            | FfmpegError::WritePacket(_)
            | FfmpegError::WriteTrailer(_) => ErrorKind::Encode,
        }
    }
}

impl PrepError {
    /// Classify this error for per-task reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrepError::Ffmpeg(e) => e.kind(),
            PrepError::NoAudioStream(_) => ErrorKind::Open,
            PrepError::NoDecodableAudio(_) => ErrorKind::Decode,
            PrepError::InvalidConversion(_) => ErrorKind::Resample,
            PrepError::Filesystem { .. }
            | PrepError::OutputCollision { .. }
            | PrepError::OutputOverwritesInput(_)
            | PrepError::Io(_) => ErrorKind::Filesystem,
            PrepError::Config(_) => ErrorKind::Config,
            PrepError::Worker(_) => ErrorKind::Internal,
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_error_kinds() {
        assert_eq!(FfmpegError::OpenInput("x".into()).kind(), ErrorKind::Open);
        assert_eq!(FfmpegError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(
            FfmpegError::ResamplerCreate("x".into()).kind(),
            ErrorKind::Resample
        );
        assert_eq!(FfmpegError::WriteTrailer("x".into()).kind(), ErrorKind::Encode);
    }

    #[test]
    fn test_prep_error_kinds() {
        let err = PrepError::NoAudioStream(PathBuf::from("a.mp3"));
        assert_eq!(err.kind(), ErrorKind::Open);

        let err = PrepError::NoDecodableAudio(PathBuf::from("a.mp3"));
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = PrepError::filesystem(
            "/out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(err.to_string().contains("denied"));

        let err = PrepError::OutputOverwritesInput(PathBuf::from("clip.wav"));
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Open.to_string(), "OpenError");
        assert_eq!(ErrorKind::Filesystem.to_string(), "FilesystemError");
    }
}
