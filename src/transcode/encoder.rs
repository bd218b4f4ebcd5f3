//! PCM encoder and WAV muxer for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode packed f32 frames to
//! `pcm_f32le` packets, and a `wav` output context that writes them to disk.

use std::path::Path;

use crate::config::TargetConfig;
use crate::error::{FfmpegError, PrepError, Result};
use crate::ffmpeg::helpers;
use crate::frame::AudioFrame;
use crate::transcode::enforcer::FrameSink;
use crate::transcode::resampler::OUTPUT_SAMPLE_FORMAT;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

/// Container format written for every output
pub const OUTPUT_FORMAT: &str = "wav";
/// File extension of every output
pub const OUTPUT_EXTENSION: &str = "wav";

/// 32-bit float PCM encoder backed by a real FFmpeg codec context
pub struct PcmEncoder {
    encoder: ffmpeg::encoder::Audio,
    channel_layout: ffmpeg::util::channel_layout::ChannelLayout,
    sample_rate: u32,
    time_base: ffmpeg::Rational,
    pts: i64,
}

impl PcmEncoder {
    /// Open a `pcm_f32le` encoder at the given parameters.
    pub fn open(target: &TargetConfig) -> Result<Self> {
        let codec = codec::encoder::find(codec::Id::PCM_F32LE).ok_or_else(|| {
            FfmpegError::EncoderNotFound("pcm_f32le encoder not found in this FFmpeg build".into())
        })?;

        let sample_rate = target.sample_rate_hz as i32;
        let channel_layout = target.channel_layout.to_ffmpeg();
        let time_base = ffmpeg::Rational::new(1, sample_rate);

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(sample_rate);
        audio_enc.set_format(OUTPUT_SAMPLE_FORMAT);
        audio_enc.set_channel_layout(channel_layout);

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderCreate(format!("Failed to open pcm_f32le encoder: {}", e))
        })?;

        Ok(Self {
            encoder,
            channel_layout,
            sample_rate: target.sample_rate_hz,
            time_base,
            pts: 0,
        })
    }

    /// Copy an [`AudioFrame`] into an FFmpeg frame and send it to the encoder.
    pub fn send_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        let mut av_frame = ffmpeg::util::frame::Audio::new(
            OUTPUT_SAMPLE_FORMAT,
            frame.len(),
            self.channel_layout,
        );
        av_frame.set_rate(self.sample_rate);
        av_frame.set_pts(Some(self.pts));
        if !helpers::write_packed_f32(&mut av_frame, frame.samples()) {
            return Err(FfmpegError::EncodeFrame(format!(
                "frame buffer too small for {} samples",
                frame.len()
            ))
            .into());
        }

        self.encoder.send_frame(&av_frame).map_err(|e| {
            FfmpegError::EncodeFrame(format!("pcm encoder send_frame error: {}", e))
        })?;
        self.pts += frame.len() as i64;
        Ok(())
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<()> {
        self.encoder.send_eof().map_err(|e| {
            FfmpegError::EncodeFrame(format!("pcm encoder send_eof error: {}", e))
        })?;
        Ok(())
    }

    /// Receive one encoded packet, or `None` if the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!(
                "pcm encoder receive_packet error: {}",
                e
            ))
            .into()),
        }
    }

    /// The encoder timebase (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        helpers::encoder_codec_parameters(&self.encoder)
    }
}

/// Writes normalized frames to a WAV file.
///
/// The header is written on creation; [`finish`](Self::finish) drains the
/// encoder and writes the trailer, which patches the RIFF sizes. A writer
/// dropped without `finish` leaves an unfinalized file behind, so callers pair
/// it with an output guard.
pub struct WavWriter {
    output: ffmpeg::format::context::Output,
    encoder: PcmEncoder,
    stream_time_base: ffmpeg::Rational,
    samples_written: u64,
    packets_written: u64,
}

impl WavWriter {
    /// Create `path` and write the WAV header.
    pub fn create(path: &Path, target: &TargetConfig) -> Result<Self> {
        let encoder = PcmEncoder::open(target)?;

        let mut output = ffmpeg::format::output_as(&path, OUTPUT_FORMAT).map_err(|e| {
            FfmpegError::MuxerCreate(format!("failed to create {:?}: {}", path, e))
        })?;
        helpers::output_set_bitexact(&mut output);

        {
            let mut out_stream = output
                .add_stream(ffmpeg::encoder::find(codec::Id::None))
                .map_err(|e| FfmpegError::MuxerCreate(format!("add_stream: {}", e)))?;
            out_stream.set_parameters(encoder.codec_parameters());
            out_stream.set_time_base(encoder.time_base());
        }

        output
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(format!("write_header: {}", e)))?;

        // The muxer may adjust the stream timebase while writing the header
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or_else(|| encoder.time_base());

        Ok(Self {
            output,
            encoder,
            stream_time_base,
            samples_written: 0,
            packets_written: 0,
        })
    }

    /// Encode one frame and write out whatever packets it produced.
    pub fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        self.encoder.send_frame(frame)?;
        self.samples_written += frame.len() as u64;
        self.drain()
    }

    /// Flush the encoder, then write the container trailer.
    pub fn finish(mut self) -> Result<u64> {
        self.encoder.send_eof()?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(format!("write_trailer: {}", e)))?;

        tracing::trace!(
            samples = self.samples_written,
            packets = self.packets_written,
            "wav trailer written"
        );
        Ok(self.samples_written)
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(mut packet) = self.encoder.receive_packet()? {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder.time_base(), self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| FfmpegError::WritePacket(format!("write_packet: {}", e)))?;
            self.packets_written += 1;
        }
        Ok(())
    }

    /// Samples per channel handed to the encoder so far.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl FrameSink for WavWriter {
    fn write_frame(&mut self, frame: AudioFrame) -> Result<()> {
        self.write(&frame)
    }
}

/// Check whether the FFmpeg build can write our output format.
pub fn is_output_supported() -> bool {
    codec::encoder::find(codec::Id::PCM_F32LE).is_some()
}

/// Reject output paths FFmpeg cannot represent.
pub(crate) fn ensure_ffmpeg_path(path: &Path) -> Result<()> {
    if path.to_str().is_none() {
        return Err(PrepError::filesystem(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is not valid UTF-8"),
        ));
    }
    Ok(())
}
