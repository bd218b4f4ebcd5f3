//! Single-file transcoding pipeline
//!
//! Combines `AudioInput` → `AudioResampler` → `DurationEnforcer` → `WavWriter`
//! to turn one input file of any supported format into one normalized WAV.
//!
//! Every FFmpeg resource is owned by a stage value and released when that value
//! is dropped, on success and on every early-return path alike.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::TargetConfig;
use crate::error::{PrepError, Result};
use crate::frame::AudioFrame;

use super::decoder::AudioInput;
use super::encoder::{ensure_ffmpeg_path, WavWriter};
use super::enforcer::{DurationEnforcer, FrameSource, PipelineState};
use super::resampler::AudioResampler;

/// What one successful transcode produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeReport {
    /// Samples per channel in the output file
    pub output_samples: u64,
    /// Samples per channel taken from the source after resampling
    pub source_samples: u64,
    /// Samples per channel of appended silence
    pub padded_samples: u64,
    /// Whether the source was cut at the maximum duration
    pub truncated: bool,
    /// Packets the decoder rejected and skipped
    pub skipped_packets: u64,
    pub elapsed: Duration,
}

/// Decoded, resampled frames of one input, pulled on demand.
///
/// Resampled output can arrive in bursts (several frames for one decoded
/// frame); surplus frames wait in a small queue bounded by one decoded frame.
pub struct DecodedSource {
    input: AudioInput,
    resampler: AudioResampler,
    pending: std::collections::VecDeque<AudioFrame>,
    flushed: bool,
}

impl DecodedSource {
    pub fn new(input: AudioInput, target: &TargetConfig) -> Self {
        Self {
            input,
            resampler: AudioResampler::new(target),
            pending: std::collections::VecDeque::new(),
            flushed: false,
        }
    }

    pub fn skipped_packets(&self) -> u64 {
        self.input.skipped_packets()
    }
}

impl FrameSource for DecodedSource {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.flushed {
                return Ok(None);
            }

            match self.input.next_frame()? {
                Some(decoded) => self.pending.extend(self.resampler.convert(decoded)?),
                None => {
                    if self.input.frames_decoded() == 0 {
                        return Err(PrepError::NoDecodableAudio(self.input.path().to_path_buf()));
                    }
                    self.pending.extend(self.resampler.flush()?);
                    self.flushed = true;
                }
            }
        }
    }
}

/// Removes the output file on drop unless the transcode was committed.
struct OutputGuard {
    path: PathBuf,
    committed: bool,
}

impl OutputGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove partial output"
            ),
        }
    }
}

/// Normalize one input file into `output`.
///
/// On any failure after the output was created, the partial file is deleted so
/// only fully finalized outputs remain on disk.
pub fn transcode_file(input: &Path, output: &Path, target: &TargetConfig) -> Result<TranscodeReport> {
    let started = Instant::now();
    ensure_ffmpeg_path(input)?;
    ensure_ffmpeg_path(output)?;

    // ── 1. Open ────────────────────────────────────────────────────────────
    let audio = AudioInput::open(input)?;
    let mut source = DecodedSource::new(audio, target);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PrepError::filesystem(parent, e))?;
    }

    // ── 2. Decode → resample → enforce → encode ────────────────────────────
    let guard = OutputGuard::new(output);
    let mut writer = WavWriter::create(output, target)?;
    let state: PipelineState = DurationEnforcer::new(target).run(&mut source, &mut writer)?;

    // ── 3. Close ───────────────────────────────────────────────────────────
    let written = writer.finish()?;
    guard.commit();

    let report = TranscodeReport {
        output_samples: written,
        source_samples: state.source_samples,
        padded_samples: state.padded_samples,
        truncated: state.reached_max && state.trimmed_samples > 0,
        skipped_packets: source.skipped_packets(),
        elapsed: started.elapsed(),
    };

    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        samples = report.output_samples,
        padded = report.padded_samples,
        truncated = report.truncated,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "transcode complete"
    );

    Ok(report)
}

/// Read back the sample rate, channel count and per-channel sample count of a
/// file, decoding it fully.
pub fn probe_samples(path: &Path) -> Result<(u32, u16, u64)> {
    let mut input = AudioInput::open(path)?;
    let mut rate = 0;
    let mut channels = 0;
    let mut samples = 0u64;
    while let Some(frame) = input.next_frame()? {
        rate = frame.rate();
        channels = frame.channels();
        samples += frame.samples() as u64;
    }
    Ok((rate, channels, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_guard_removes_uncommitted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        drop(OutputGuard::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_keeps_committed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        OutputGuard::new(&path).commit();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_input_leaves_no_output() {
        crate::ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.mp3");
        std::fs::write(&input, vec![0u8; 4096]).unwrap();
        let output = dir.path().join("out").join("broken.wav");

        let err = transcode_file(&input, &output, &TargetConfig::default()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Open | ErrorKind::Decode));
        assert!(!output.exists());
    }
}
