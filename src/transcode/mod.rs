//! Audio transcoding module
//!
//! This module handles normalization of a single input file:
//! - Demuxing and decoding the first audio stream
//! - Resampling to the target rate and channel layout
//! - Enforcing the minimum and maximum output duration
//! - Encoding to 32-bit float PCM in a WAV container

pub mod decoder;
pub mod encoder;
pub mod enforcer;
pub mod pipeline;
pub mod resampler;

pub use encoder::OUTPUT_EXTENSION;
pub use enforcer::{DurationEnforcer, FrameSink, FrameSource, PipelineState, CHUNK_SAMPLES};
pub use pipeline::{transcode_file, TranscodeReport};
