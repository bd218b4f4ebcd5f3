//! Owned PCM frames passed between pipeline stages
//!
//! An `AudioFrame` is moved from one stage to the next, never shared. Samples
//! are interleaved 32-bit floats, the same layout the `pcm_f32le` encoder
//! consumes.

/// A finite block of interleaved f32 samples at one rate and channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wrap interleaved samples. `samples.len()` must be a multiple of `channels`;
    /// a trailing partial sample is dropped.
    pub fn new(mut samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// A frame of `len` all-zero samples per channel.
    pub fn silence(len: usize, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; len * channels as usize],
            channels,
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Keep only the first `len` samples per channel.
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len * self.channels as usize);
    }

    /// Duplicate a mono frame across `channels` output channels.
    ///
    /// Frames that are not mono, or already have the requested count, are
    /// returned unchanged.
    pub fn upmix_mono(self, channels: u16) -> Self {
        if self.channels != 1 || channels <= 1 {
            return self;
        }
        let n = channels as usize;
        let mut samples = Vec::with_capacity(self.samples.len() * n);
        for &s in &self.samples {
            samples.extend(std::iter::repeat(s).take(n));
        }
        Self {
            samples,
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Split into consecutive frames of at most `chunk` samples per channel.
    pub fn into_chunks(self, chunk: usize) -> Vec<AudioFrame> {
        let chunk = chunk.max(1);
        if self.len() <= chunk {
            return vec![self];
        }
        let stride = chunk * self.channels as usize;
        self.samples
            .chunks(stride)
            .map(|c| AudioFrame {
                samples: c.to_vec(),
                channels: self.channels,
                sample_rate: self.sample_rate,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_counts_per_channel() {
        let frame = AudioFrame::new(vec![0.1, 0.2, 0.3, 0.4], 2, 16000);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.channels(), 2);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_partial_sample_dropped() {
        let frame = AudioFrame::new(vec![0.1, 0.2, 0.3], 2, 16000);
        assert_eq!(frame.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn test_truncate() {
        let mut frame = AudioFrame::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 8000);
        frame.truncate(2);
        assert_eq!(frame.samples(), &[1.0, 2.0, 3.0, 4.0]);
        frame.truncate(10);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_silence() {
        let frame = AudioFrame::silence(1024, 2, 16000);
        assert_eq!(frame.len(), 1024);
        assert!(frame.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_upmix_mono_duplicates() {
        let frame = AudioFrame::new(vec![0.5, -0.25], 1, 16000).upmix_mono(2);
        assert_eq!(frame.channels(), 2);
        assert_eq!(frame.samples(), &[0.5, 0.5, -0.25, -0.25]);

        let stereo = AudioFrame::new(vec![0.1, 0.2], 2, 16000);
        assert_eq!(stereo.clone().upmix_mono(2), stereo);
    }

    #[test]
    fn test_into_chunks() {
        let frame = AudioFrame::new((0..10).map(|i| i as f32).collect(), 2, 16000);
        let chunks = frame.into_chunks(2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(chunks[2].samples(), &[8.0, 9.0]);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 5);
    }
}
