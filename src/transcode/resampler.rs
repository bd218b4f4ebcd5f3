//! Audio resampler for the transcoding pipeline
//!
//! Converts decoded PCM frames of any format to packed `FLT` at the target
//! rate and channel count, producing backend-independent [`AudioFrame`]s.

use crate::config::TargetConfig;
use crate::error::{FfmpegError, PrepError, Result};
use crate::ffmpeg::helpers;
use crate::frame::AudioFrame;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

/// Sample format handed to the PCM encoder
pub const OUTPUT_SAMPLE_FORMAT: Sample = Sample::F32(Type::Packed);
/// Length of the windowed-sinc interpolation filter
pub const FILTER_SIZE: i64 = 64;
/// Filter cutoff as a fraction of the lower Nyquist frequency
pub const FILTER_CUTOFF: f64 = 0.97;

/// Input parameters a resampler was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct InputFormat {
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
}

impl InputFormat {
    fn of(frame: &ffmpeg::util::frame::Audio) -> Self {
        Self {
            format: frame.format(),
            layout: frame.channel_layout(),
            rate: frame.rate(),
        }
    }
}

/// Pick a layout for frames whose channel order is unspecified.
fn fallback_layout(channels: u16) -> Result<ChannelLayout> {
    match channels {
        1 => Ok(ChannelLayout::MONO),
        2 => Ok(ChannelLayout::STEREO),
        3 => Ok(ChannelLayout::SURROUND),
        4 => Ok(ChannelLayout::QUAD),
        5 => Ok(ChannelLayout::_5POINT0),
        6 => Ok(ChannelLayout::_5POINT1),
        7 => Ok(ChannelLayout::_6POINT1),
        8 => Ok(ChannelLayout::_7POINT1),
        n => Err(PrepError::InvalidConversion(format!(
            "{} channels without a channel layout",
            n
        ))),
    }
}

/// Audio resampler wrapping FFmpeg's `SwrContext`
///
/// Built lazily from the first decoded frame. If a later frame arrives with a
/// different format, rate or layout, the buffered tail is flushed and the
/// context is rebuilt for the new parameters.
pub struct AudioResampler {
    context: Option<(resampling::Context, InputFormat)>,
    target_rate: u32,
    target_channels: u16,
    target_layout: ChannelLayout,
    /// Channels the `SwrContext` itself produces (before mono upmixing)
    swr_channels: u16,
}

impl AudioResampler {
    pub fn new(target: &TargetConfig) -> Self {
        let target_layout = target.channel_layout.to_ffmpeg();
        Self {
            context: None,
            target_rate: target.sample_rate_hz,
            target_channels: target.channels(),
            target_layout,
            swr_channels: target.channels(),
        }
    }

    /// Convert one decoded frame into zero or more target-format frames.
    ///
    /// Returns an empty `Vec` when the filter needs more input before it can
    /// produce output.
    pub fn convert(&mut self, mut frame: ffmpeg::util::frame::Audio) -> Result<Vec<AudioFrame>> {
        if frame.samples() == 0 {
            return Ok(vec![]);
        }
        if frame.channel_layout().bits() == 0 {
            // No channel layout set; fall back based on channel count
            frame.set_channel_layout(fallback_layout(frame.channels())?);
        }

        let input = InputFormat::of(&frame);
        let previous = self.context.as_ref().map(|(_, current)| *current);
        let mut out = Vec::new();
        match previous {
            Some(current) if current == input => {}
            Some(current) => {
                tracing::debug!(
                    from_rate = current.rate,
                    to_rate = input.rate,
                    from_format = ?current.format,
                    to_format = ?input.format,
                    "input format changed mid-stream, rebuilding resampler"
                );
                out = self.flush()?;
                self.build(input, frame.channels())?;
            }
            None => self.build(input, frame.channels())?,
        }

        let swr_layout = self.swr_layout();
        let target_rate = self.target_rate;
        let Some((context, _)) = self.context.as_mut() else {
            return Err(PrepError::Worker("resampler not initialized".into()));
        };

        let capacity = helpers::resampler_max_output(context, frame.samples()).max(1);
        let mut resampled = alloc_output(capacity, swr_layout, target_rate);
        context.run(&frame, &mut resampled).map_err(|e| {
            FfmpegError::Resample(format!("Resampling error: {}", e))
        })?;

        if let Some(f) = self.to_audio_frame(&resampled)? {
            out.push(f);
        }
        Ok(out)
    }

    /// Drain the samples still held in the filter history.
    ///
    /// A passthrough context has nothing buffered and may report an error on
    /// flush; that is treated as an empty tail.
    pub fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        let mut out = Vec::new();
        let swr_layout = self.swr_layout();
        let target_rate = self.target_rate;
        let Some((context, _)) = self.context.as_mut() else {
            return Ok(out);
        };

        let mut tail = Vec::new();
        loop {
            let capacity = helpers::resampler_max_output(context, 0);
            if capacity == 0 {
                break;
            }
            let mut resampled = alloc_output(capacity, swr_layout, target_rate);
            if let Err(e) = context.flush(&mut resampled) {
                tracing::debug!("Resampler flush returned non-fatal error: {}", e);
                break;
            }
            if resampled.samples() == 0 {
                break;
            }
            tail.push(resampled);
        }

        for resampled in &tail {
            if let Some(f) = self.to_audio_frame(resampled)? {
                out.push(f);
            }
        }
        Ok(out)
    }

    fn build(&mut self, input: InputFormat, channels: u16) -> Result<()> {
        // Mono sources are resampled as mono and duplicated afterwards; every
        // other layout goes through swr's own rematrixing.
        let (out_layout, out_channels) = if channels == 1 {
            (ChannelLayout::MONO, 1)
        } else {
            (self.target_layout, self.target_channels)
        };

        let mut context = resampling::Context::get(
            input.format,
            input.layout,
            input.rate,
            OUTPUT_SAMPLE_FORMAT,
            out_layout,
            self.target_rate,
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!(
                "Failed to create resampling context for {} Hz {:?}: {}",
                input.rate, input.format, e
            ))
        })?;

        helpers::resampler_set_filter(&mut context, FILTER_SIZE, FILTER_CUTOFF).map_err(|e| {
            FfmpegError::ResamplerCreate(format!("Failed to configure resampling filter: {}", e))
        })?;

        tracing::trace!(
            src_rate = input.rate,
            src_channels = channels,
            dst_rate = self.target_rate,
            dst_channels = out_channels,
            "resampler created"
        );

        self.context = Some((context, input));
        self.swr_channels = out_channels;
        Ok(())
    }

    fn swr_layout(&self) -> ChannelLayout {
        if self.swr_channels == 1 {
            ChannelLayout::MONO
        } else {
            self.target_layout
        }
    }

    fn to_audio_frame(&self, resampled: &ffmpeg::util::frame::Audio) -> Result<Option<AudioFrame>> {
        if resampled.samples() == 0 {
            return Ok(None);
        }
        let samples = helpers::packed_f32_samples(resampled).ok_or_else(|| {
            FfmpegError::Resample("resampled frame buffer is misaligned or short".into())
        })?;
        let frame = AudioFrame::new(samples.to_vec(), self.swr_channels, self.target_rate)
            .upmix_mono(self.target_channels);
        Ok(Some(frame))
    }

    /// The output sample rate.
    pub fn output_rate(&self) -> u32 {
        self.target_rate
    }
}

/// Allocate an output frame able to hold `capacity` samples per channel.
///
/// Handing swr a pre-sized frame caps each call's output; anything beyond
/// stays in the context's FIFO until the next call or flush.
fn alloc_output(capacity: usize, layout: ChannelLayout, rate: u32) -> ffmpeg::util::frame::Audio {
    let mut frame = ffmpeg::util::frame::Audio::new(OUTPUT_SAMPLE_FORMAT, capacity, layout);
    frame.set_rate(rate);
    frame
}
