//! Common types for Chorus
//!
//! This module contains the fundamental audio types used throughout the
//! karaoke engine: the shared PCM format descriptor and the interleaved
//! sample buffer that every stage of the pipeline exchanges.

/// Default sample rate used throughout Chorus (48kHz - standard professional audio rate)
/// This is the default; the actual rate is negotiated with the audio device at startup.
pub const SAMPLE_RATE: u32 = 48000;

/// Default channel count for the karaoke pipeline.
///
/// The microphone path is mono; the backing track is downmixed to the
/// engine spec at load time so the sample-accurate mix stage never has to
/// reconcile channel layouts.
pub const CHANNELS: u16 = 1;

/// Audio sample type (32-bit float for processing, stored as 16-bit in files)
pub type Sample = f32;

/// Format descriptor for a raw interleaved PCM stream.
///
/// One `PcmSpec` is shared by the whole pipeline: the microphone capture,
/// the decoded backing track, every captured segment and the final mix all
/// carry the same rate and channel count. Two streams with different specs
/// never meet sample-by-sample — that is a reported error, not an implicit
/// conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PcmSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample of the on-disk representation (16 or 32)
    pub bits_per_sample: u16,
}

impl Default for PcmSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bits_per_sample: 16,
        }
    }
}

impl PcmSpec {
    /// Create a spec with the given rate and channel count (16-bit storage)
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Interleaved samples per second (rate × channels)
    #[inline]
    pub fn samples_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64
    }

    /// Convert a time in seconds to an interleaved sample count,
    /// rounded down to a whole frame so channel alignment is preserved.
    #[inline]
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        let frames = (seconds * self.sample_rate as f64).round() as u64;
        frames * self.channels as u64
    }

    /// Convert an interleaved sample count to seconds.
    #[inline]
    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (samples / self.channels as u64) as f64 / self.sample_rate as f64
    }
}

/// Convert a decibel value to a linear gain factor
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels
#[inline]
pub fn linear_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-9).log10()
}

/// A buffer of interleaved PCM samples.
///
/// Processing always happens in `f32`; the i16 conversions live here so the
/// DSP code never deals with integer formats. The real-time thread only
/// ever uses the non-allocating accessors — construction and growth happen
/// on the control thread.
#[derive(Debug, Clone, Default)]
pub struct PcmBuffer {
    samples: Vec<Sample>,
}

impl PcmBuffer {
    /// Create an empty buffer with the specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Create a buffer from an existing sample vector
    pub fn from_vec(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Create a buffer from 16-bit PCM samples
    pub fn from_i16(samples: &[i16]) -> Self {
        let samples = samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect();
        Self { samples }
    }

    /// Number of interleaved samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds under the given spec
    pub fn duration_seconds(&self, spec: &PcmSpec) -> f64 {
        spec.samples_to_seconds(self.samples.len() as u64)
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Append a slice of samples (control thread only — allocates)
    pub fn extend_from_slice(&mut self, samples: &[Sample]) {
        self.samples.extend_from_slice(samples);
    }

    /// Truncate to `len` samples without deallocating
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }

    /// Clear the buffer, keeping its allocation
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for s in &mut self.samples {
            *s *= factor;
        }
    }

    /// Peak absolute amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().fold(0.0, |p, s| p.max(s.abs()))
    }

    /// Root-mean-square level of the buffer
    pub fn rms(&self) -> Sample {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }

    /// Convert to 16-bit PCM, hard-clamping out-of-range samples.
    ///
    /// Saturation clamps — it must never wrap around.
    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }

    /// Consume the buffer, returning the raw sample vector
    pub fn into_vec(self) -> Vec<Sample> {
        self.samples
    }
}

/// Frame RMS over a raw sample slice (used by the real-time level meter)
#[inline]
pub fn slice_rms(samples: &[Sample]) -> Sample {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Peak absolute amplitude over a raw sample slice
#[inline]
pub fn slice_peak(samples: &[Sample]) -> Sample {
    samples.iter().fold(0.0, |p, s| p.max(s.abs()))
}
