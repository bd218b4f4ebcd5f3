//! Duration enforcement
//!
//! Sits between the resampler and the encoder. Frames are pulled from a
//! [`FrameSource`] until the source ends or the maximum sample budget is
//! reached, then the output is padded with silence up to the minimum.
//!
//! Trimming is from the end only: the retained audio is always an exact
//! prefix of the resampled input, and padding is always appended after it.

use crate::config::TargetConfig;
use crate::error::{PrepError, Result};
use crate::frame::AudioFrame;

/// Samples per channel handed to the sink in one call (also the silence chunk size).
pub const CHUNK_SAMPLES: usize = 1024;

/// A finite, non-restartable sequence of frames at the target rate and layout.
pub trait FrameSource {
    /// Pull the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;
}

/// Consumer of normalized frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: AudioFrame) -> Result<()>;
}

/// How the source side stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEnd {
    /// The source ran out of frames
    EndOfStream,
    /// The maximum budget was reached and the source was abandoned
    ReachedMax,
}

/// Per-task counters, owned by the worker running the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    /// Samples per channel written to the sink so far (audio + padding)
    pub samples_emitted: u64,
    /// Whether the max budget stopped the source side
    pub reached_max: bool,
    /// Samples per channel that came from the source
    pub source_samples: u64,
    /// Samples per channel of appended silence
    pub padded_samples: u64,
    /// Samples per channel dropped from the last source frame
    pub trimmed_samples: u64,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            samples_emitted: 0,
            reached_max: false,
            source_samples: 0,
            padded_samples: 0,
            trimmed_samples: 0,
        }
    }

    pub fn source_end(&self) -> SourceEnd {
        if self.reached_max {
            SourceEnd::ReachedMax
        } else {
            SourceEnd::EndOfStream
        }
    }
}

/// Enforces `min_samples <= total <= max_samples` on one output stream.
#[derive(Debug)]
pub struct DurationEnforcer {
    min_samples: u64,
    max_samples: u64,
    channels: u16,
    sample_rate: u32,
    chunk: usize,
    state: PipelineState,
}

impl DurationEnforcer {
    pub fn new(target: &TargetConfig) -> Self {
        Self::with_bounds(
            target.min_samples(),
            target.max_samples(),
            target.channels(),
            target.sample_rate_hz,
        )
    }

    pub fn with_bounds(min_samples: u64, max_samples: u64, channels: u16, sample_rate: u32) -> Self {
        let mut state = PipelineState::new();
        state.reached_max = max_samples == 0;
        Self {
            min_samples,
            max_samples: max_samples.max(min_samples),
            channels,
            sample_rate,
            chunk: CHUNK_SAMPLES,
            state,
        }
    }

    /// Drive `source` into `sink`, then pad. Returns the final counters.
    pub fn run<S, K>(mut self, source: &mut S, sink: &mut K) -> Result<PipelineState>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        while !self.state.reached_max {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            self.push(frame, sink)?;
        }

        tracing::trace!(
            emitted = self.state.samples_emitted,
            end = ?self.state.source_end(),
            "source side finished"
        );

        self.pad(sink)?;
        Ok(self.state)
    }

    /// Accept one source frame, trimming it to the remaining budget.
    fn push<K: FrameSink + ?Sized>(&mut self, mut frame: AudioFrame, sink: &mut K) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        if frame.channels() != self.channels || frame.sample_rate() != self.sample_rate {
            return Err(PrepError::InvalidConversion(format!(
                "frame is {} Hz / {} ch, expected {} Hz / {} ch",
                frame.sample_rate(),
                frame.channels(),
                self.sample_rate,
                self.channels
            )));
        }

        let remaining = self.max_samples - self.state.samples_emitted;
        let len = frame.len() as u64;
        if len > remaining {
            frame.truncate(remaining as usize);
            self.state.trimmed_samples = len - remaining;
        }

        let kept = frame.len() as u64;
        self.emit(frame, sink)?;
        self.state.source_samples += kept;
        if self.state.samples_emitted >= self.max_samples {
            self.state.reached_max = true;
        }
        Ok(())
    }

    /// Append silence until the minimum is met exactly.
    fn pad<K: FrameSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        while self.state.samples_emitted < self.min_samples {
            let deficit = self.min_samples - self.state.samples_emitted;
            let n = (deficit as usize).min(self.chunk);
            sink.write_frame(AudioFrame::silence(n, self.channels, self.sample_rate))?;
            self.state.samples_emitted += n as u64;
            self.state.padded_samples += n as u64;
        }
        Ok(())
    }

    fn emit<K: FrameSink + ?Sized>(&mut self, frame: AudioFrame, sink: &mut K) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        for chunk in frame.into_chunks(self.chunk) {
            let n = chunk.len() as u64;
            sink.write_frame(chunk)?;
            self.state.samples_emitted += n;
        }
        Ok(())
    }
}
