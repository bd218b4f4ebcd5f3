//! Audio decoder for the transcoding pipeline
//!
//! Opens an input container, selects its first audio stream and decodes
//! compressed packets (MP3, AAC, FLAC, Vorbis, Opus, WMA, PCM, …) into raw
//! `AVFrame`s, one frame per pull.

use std::path::{Path, PathBuf};

use crate::error::{FfmpegError, PrepError, Result};
use ffmpeg_next as ffmpeg;

/// Consecutive demuxer read errors tolerated before the stream is treated as ended.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 32;

/// Damaged frames dropped in a row before a receive gives up for this packet.
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 32;

/// Audio decoder backed by a FFmpeg codec context
pub struct AudioDecoder {
    /// The FFmpeg decoder context
    decoder: ffmpeg::decoder::Audio,
    /// Stream index in the source file
    stream_index: usize,
    /// Packets or frames dropped because the decoder rejected them
    skipped: u64,
}

/// What a decoder error means for the packet loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStep {
    /// The decoder wants more input, or has nothing left
    NeedMore,
    /// The current packet or frame is damaged; drop it and carry on
    Skip,
}

fn classify(err: &ffmpeg::Error) -> DecodeStep {
    match err {
        ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN => DecodeStep::NeedMore,
        ffmpeg::Error::Eof => DecodeStep::NeedMore,
        _ => DecodeStep::Skip,
    }
}

impl AudioDecoder {
    /// Open a decoder for the given stream.
    ///
    /// Uses the stream's own codec parameters to initialise the context so no
    /// external configuration is needed.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "Failed to create codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;
        Self::from_context(context, stream_index)
    }

    fn from_context(context: ffmpeg::codec::Context, stream_index: usize) -> Result<Self> {
        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        Ok(Self {
            decoder,
            stream_index,
            skipped: 0,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// Returns `false` when the decoder rejected the packet. Whatever the
    /// reason, the packet is dropped and decoding continues with the next one.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> bool {
        match self.decoder.send_packet(packet) {
            Ok(()) => true,
            Err(ffmpeg::Error::Eof) => false,
            // Output is always drained before sending, so EAGAIN also means
            // the packet was not taken
            Err(e) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    error = %e,
                    "send_packet: skipping damaged packet"
                );
                self.skipped += 1;
                false
            }
        }
    }

    /// Send EOF to flush the decoder's internal buffers.
    pub fn send_eof(&mut self) {
        match self.decoder.send_eof() {
            Ok(()) => {}
            Err(e) if classify(&e) == DecodeStep::NeedMore => {}
            Err(e) => tracing::debug!(
                stream_index = self.stream_index,
                error = %e,
                "send_eof failed, draining what is buffered"
            ),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input or is fully drained.
    ///
    /// Damaged frames are dropped and counted; the next one is tried instead.
    pub fn receive_frame(&mut self) -> Option<ffmpeg::util::frame::Audio> {
        for _ in 0..MAX_CONSECUTIVE_DECODE_ERRORS {
            let mut frame = ffmpeg::util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Some(frame),
                Err(e) if classify(&e) == DecodeStep::NeedMore => return None,
                Err(e) => {
                    tracing::debug!(
                        stream_index = self.stream_index,
                        error = %e,
                        "receive_frame: dropping damaged frame"
                    );
                    self.skipped += 1;
                }
            }
        }
        None
    }

    /// Packets and frames dropped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// The source stream index.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }
}

/// Where the demuxer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Packets are still being read from the container
    Reading,
    /// The container is exhausted; the decoder still holds buffered frames
    Draining,
    /// Decoder fully drained
    Finished,
}

/// The first audio stream of one input file, decoded on demand.
///
/// Frames are produced lazily: each call to [`next_frame`](Self::next_frame)
/// reads only as many packets as the decoder needs to emit one more frame.
pub struct AudioInput {
    input: ffmpeg::format::context::Input,
    decoder: AudioDecoder,
    path: PathBuf,
    state: ReadState,
    frames_decoded: u64,
}

impl AudioInput {
    /// Open `path` and set up a decoder for its first audio stream.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(&path).map_err(|e| {
            FfmpegError::OpenInput(format!("failed to open {:?}: {}", path, e))
        })?;

        let stream = input
            .streams()
            .find(|s| s.parameters().medium() == ffmpeg::media::Type::Audio)
            .ok_or_else(|| PrepError::NoAudioStream(path.to_path_buf()))?;

        let decoder = AudioDecoder::open(&stream)?;

        tracing::debug!(
            path = %path.display(),
            stream_index = decoder.stream_index(),
            codec = ?stream.parameters().id(),
            "audio stream selected"
        );

        Ok(Self {
            input,
            decoder,
            path: path.to_path_buf(),
            state: ReadState::Reading,
            frames_decoded: 0,
        })
    }

    /// Pull the next decoded frame, or `None` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut read_errors = 0u32;
        loop {
            if let Some(frame) = self.decoder.receive_frame() {
                self.frames_decoded += 1;
                return Ok(Some(frame));
            }

            match self.state {
                ReadState::Finished => return Ok(None),
                ReadState::Draining => {
                    // One more receive pass after this drains the decoder
                    self.state = ReadState::Finished;
                    continue;
                }
                ReadState::Reading => {}
            }

            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() != self.decoder.stream_index() {
                        continue;
                    }
                    self.decoder.send_packet(&packet);
                }
                Err(ffmpeg::Error::Eof) => self.begin_drain(),
                Err(e) => {
                    read_errors += 1;
                    if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e,
                            "demuxer keeps failing, treating as end of stream"
                        );
                        self.begin_drain();
                    }
                }
            }
        }
    }

    fn begin_drain(&mut self) {
        self.decoder.send_eof();
        self.state = ReadState::Draining;
    }

    /// Number of frames produced so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Number of damaged packets and frames the decoder dropped.
    pub fn skipped_packets(&self) -> u64 {
        self.decoder.skipped()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
