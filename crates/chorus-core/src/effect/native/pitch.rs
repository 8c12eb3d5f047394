//! Pitch shifting and automatic pitch correction
//!
//! The shifter resamples each block at a ratio of `2^(semitones/12)` with
//! linear interpolation between adjacent samples of the unshifted block.
//! The output sample count always equals the input sample count so segment
//! timing never drifts — a deliberate latency/quality trade-off inherited
//! from the engine's design (a variable-length phase vocoder would break
//! segment time alignment).

use crate::effect::MusicalScale;

/// Semitones below which the shifter is treated as a bit-exact bypass
const BYPASS_EPSILON: f32 = 1e-3;

/// Fixed-block pitch shifter.
///
/// Block-local: each call resamples within the given block only. For
/// upward shifts the read position clamps at the block end; for downward
/// shifts the tail of the block goes unread. No state survives between
/// blocks, which is what keeps input and output counts identical.
pub struct PitchShifter {
    channels: usize,
    semitones: f32,
    ratio: f32,
    scratch: Vec<f32>,
}

impl PitchShifter {
    pub fn new(channels: u16, max_block: usize) -> Self {
        Self {
            channels: channels.max(1) as usize,
            semitones: 0.0,
            ratio: 1.0,
            scratch: vec![0.0; max_block],
        }
    }

    /// Set the shift in semitones (-12 to +12). Zero is a bit-exact bypass.
    pub fn set_semitones(&mut self, semitones: f32) {
        self.semitones = semitones.clamp(-12.0, 12.0);
        self.ratio = 2.0_f32.powf(self.semitones / 12.0);
    }

    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    /// Whether processing would change the signal
    pub fn is_active(&self) -> bool {
        self.semitones.abs() > BYPASS_EPSILON
    }

    /// Resample the block in place. `buffer.len()` must fit the scratch
    /// capacity (the chain validates this before any stage runs).
    pub fn process(&mut self, buffer: &mut [f32]) {
        if !self.is_active() || buffer.is_empty() {
            return;
        }

        let frames = buffer.len() / self.channels;
        if frames < 2 {
            return;
        }

        let scratch = &mut self.scratch[..buffer.len()];
        scratch.copy_from_slice(buffer);

        for ch in 0..self.channels {
            for i in 0..frames {
                let src = (i as f32 * self.ratio).min((frames - 1) as f32);
                let i0 = src as usize;
                let i1 = (i0 + 1).min(frames - 1);
                let frac = src - i0 as f32;

                let a = scratch[i0 * self.channels + ch];
                let b = scratch[i1 * self.channels + ch];
                buffer[i * self.channels + ch] = a + (b - a) * frac;
            }
        }
    }

    pub fn reset(&mut self) {
        // No state survives between blocks
    }
}

/// Automatic pitch correction toward the nearest note of a key/scale.
///
/// Estimates the block's fundamental with normalized autocorrelation,
/// computes the correction to the closest scale note, smooths it across
/// blocks, and applies it through the fixed-block shifter above.
pub struct AutoTuner {
    sample_rate: f32,
    channels: usize,
    key: u8,
    scale: MusicalScale,
    shifter: PitchShifter,
    /// Smoothed correction in semitones
    correction: f32,
    /// Pre-allocated mono fold of the block for detection
    mono: Vec<f32>,
}

/// Voiced pitch search range (Hz)
const PITCH_MIN_HZ: f32 = 70.0;
const PITCH_MAX_HZ: f32 = 800.0;

/// Correction smoothing weight per block (higher = snappier)
const CORRECTION_SMOOTHING: f32 = 0.25;

/// Minimum normalized autocorrelation to accept a pitch estimate
const VOICING_THRESHOLD: f32 = 0.4;

impl AutoTuner {
    pub fn new(sample_rate: u32, channels: u16, max_block: usize) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            sample_rate: sample_rate as f32,
            channels,
            key: 0,
            scale: MusicalScale::Major,
            shifter: PitchShifter::new(channels as u16, max_block),
            correction: 0.0,
            mono: vec![0.0; max_block],
        }
    }

    pub fn set_key_scale(&mut self, key: u8, scale: MusicalScale) {
        self.key = key % 12;
        self.scale = scale;
    }

    /// Detect the fundamental of a mono block, or `None` if unvoiced.
    fn detect_pitch(&self, mono: &[f32]) -> Option<f32> {
        let n = mono.len();
        let min_lag = (self.sample_rate / PITCH_MAX_HZ) as usize;
        let max_lag = ((self.sample_rate / PITCH_MIN_HZ) as usize).min(n / 2);
        if min_lag >= max_lag {
            return None;
        }

        let energy: f32 = mono.iter().map(|s| s * s).sum();
        if energy < 1e-6 {
            return None;
        }

        let mut best_lag = 0;
        let mut best_corr = 0.0f32;
        for lag in min_lag..max_lag {
            let mut corr = 0.0f32;
            for i in 0..(n - lag) {
                corr += mono[i] * mono[i + lag];
            }
            let norm = corr / energy;
            if norm > best_corr {
                best_corr = norm;
                best_lag = lag;
            }
        }

        if best_corr < VOICING_THRESHOLD || best_lag == 0 {
            return None;
        }
        Some(self.sample_rate / best_lag as f32)
    }

    /// Semitone distance from `freq` to the nearest note of the scale
    fn correction_for(&self, freq: f32) -> f32 {
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        let intervals = self.scale.intervals();

        // Search scale notes in the octaves around the detected pitch
        let mut best = 0.0f32;
        let mut best_dist = f32::MAX;
        let base_octave = (midi / 12.0).floor() as i32 - 1;
        for octave in base_octave..=base_octave + 2 {
            for &step in intervals {
                let note = (octave * 12 + self.key as i32 + step) as f32;
                let dist = (note - midi).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = note - midi;
                }
            }
        }
        // Never chase more than a whole tone; large jumps are detection noise
        best.clamp(-2.0, 2.0)
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        let frames = buffer.len() / self.channels;
        if frames < 32 {
            return;
        }

        let mono = &mut self.mono[..frames];
        for (i, m) in mono.iter_mut().enumerate() {
            let frame = &buffer[i * self.channels..(i + 1) * self.channels];
            *m = frame.iter().sum::<f32>() / self.channels as f32;
        }

        let target = match self.detect_pitch(&self.mono[..frames]) {
            Some(freq) => self.correction_for(freq),
            // Unvoiced: relax toward no correction
            None => 0.0,
        };

        self.correction += CORRECTION_SMOOTHING * (target - self.correction);
        self.shifter.set_semitones(self.correction);
        self.shifter.process(buffer);
    }

    pub fn reset(&mut self) {
        self.correction = 0.0;
        self.shifter.reset();
    }
}
