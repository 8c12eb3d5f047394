//! Noise suppression with voice activity estimation
//!
//! Energy-domain spectral subtraction over whole blocks: a slow-adapting
//! noise floor estimate (exponential update, ~1% weight per frame while
//! the frame looks noise-like) feeds a Wiener-style gain
//! `max(0, 1 - noise/signal)` raised to a tunable exponent. Attenuation is
//! bounded by the configured suppression floor so pauses don't collapse to
//! digital silence. The same energy statistics produce a per-frame voice
//! activity probability.

use crate::types::db_to_linear;

/// Noise floor update weight while a frame is classified as noise
const FLOOR_UPDATE: f32 = 0.01;

/// A frame whose power is within this factor of the floor is "noise-like"
const NOISE_MARGIN: f32 = 2.5;

/// Wiener gain exponent (higher = more aggressive suppression knee)
const GAIN_EXPONENT: f32 = 1.5;

pub struct NoiseSuppressor {
    /// Running noise power estimate (`None` until the first frame seeds it)
    noise_power: Option<f32>,
    /// Minimum gain, from the suppression level in dB
    gain_floor: f32,
    /// Last computed voice activity probability
    vad_probability: f32,
}

impl NoiseSuppressor {
    pub fn new() -> Self {
        Self {
            noise_power: None,
            gain_floor: db_to_linear(-15.0),
            vad_probability: 0.0,
        }
    }

    /// Set the maximum attenuation in dB (negative, -30 to 0)
    pub fn set_suppress_db(&mut self, db: f32) {
        self.gain_floor = db_to_linear(db.clamp(-30.0, 0.0));
    }

    /// Last voice activity probability (0.0 - 1.0)
    pub fn vad_probability(&self) -> f32 {
        self.vad_probability
    }

    /// Process one block in place, returning the voice activity probability.
    pub fn process(&mut self, buffer: &mut [f32]) -> f32 {
        if buffer.is_empty() {
            return self.vad_probability;
        }

        let signal_power =
            buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32;

        let noise_power = match self.noise_power {
            Some(n) => n,
            None => {
                // Seed the floor from the first frame; assume the user
                // isn't singing in the very first block after arming.
                let seed = signal_power.max(1e-10);
                self.noise_power = Some(seed);
                seed
            }
        };

        // Slow-adapting floor: only track frames that look like noise
        if signal_power < noise_power * NOISE_MARGIN {
            let updated = noise_power + FLOOR_UPDATE * (signal_power - noise_power);
            self.noise_power = Some(updated.max(1e-10));
        }

        let noise_power = self.noise_power.unwrap_or(1e-10);
        let raw_gain = (1.0 - noise_power / signal_power.max(1e-10)).max(0.0);
        let gain = raw_gain.powf(GAIN_EXPONENT).max(self.gain_floor);

        for s in buffer.iter_mut() {
            *s *= gain;
        }

        // VAD from the frame's energy headroom over the floor: 0 at the
        // floor, saturating to 1 at ~20 dB above it.
        let ratio_db = 10.0 * (signal_power.max(1e-10) / noise_power).log10();
        self.vad_probability = (ratio_db / 20.0).clamp(0.0, 1.0);
        self.vad_probability
    }

    pub fn reset(&mut self) {
        self.noise_power = None;
        self.vad_probability = 0.0;
    }
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_frame(level: f32, len: usize, seed: u32) -> Vec<f32> {
        // Cheap deterministic pseudo-noise (xorshift)
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32 - 0.5) * 2.0 * level
            })
            .collect()
    }

    #[test]
    fn test_steady_noise_is_suppressed() {
        let mut ns = NoiseSuppressor::new();

        let mut out_rms = 1.0;
        for i in 0..200 {
            let mut frame = noise_frame(0.05, 480, i + 1);
            let in_rms = crate::types::slice_rms(&frame);
            ns.process(&mut frame);
            out_rms = crate::types::slice_rms(&frame) / in_rms.max(1e-9);
        }

        // After the floor converges, a noise-only frame should be pushed
        // down toward the suppression floor.
        assert!(out_rms < 0.5, "noise should be attenuated, ratio {}", out_rms);
    }

    #[test]
    fn test_voice_over_noise_raises_vad() {
        let mut ns = NoiseSuppressor::new();

        // Train the floor on quiet noise
        for i in 0..100 {
            let mut frame = noise_frame(0.01, 480, i + 1);
            ns.process(&mut frame);
        }
        let quiet_vad = ns.vad_probability();

        // A loud tonal frame should read as voice
        let mut voiced: Vec<f32> = (0..480)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 48000.0).sin())
            .collect();
        let vad = ns.process(&mut voiced);

        assert!(vad > 0.8, "voiced frame VAD {}", vad);
        assert!(vad > quiet_vad);
    }

    #[test]
    fn test_attenuation_is_floored() {
        let mut ns = NoiseSuppressor::new();
        ns.set_suppress_db(-6.0);

        for i in 0..300 {
            let mut frame = noise_frame(0.05, 480, i + 1);
            let in_rms = crate::types::slice_rms(&frame);
            ns.process(&mut frame);
            let ratio = crate::types::slice_rms(&frame) / in_rms.max(1e-9);
            // Gain may approach but never undershoot the -6 dB floor
            assert!(ratio >= db_to_linear(-6.0) - 0.02, "ratio {} below floor", ratio);
        }
    }

    #[test]
    fn test_reset_clears_floor() {
        let mut ns = NoiseSuppressor::new();
        let mut frame = noise_frame(0.3, 480, 7);
        ns.process(&mut frame);
        assert!(ns.noise_power.is_some());

        ns.reset();
        assert!(ns.noise_power.is_none());
        assert_eq!(ns.vad_probability(), 0.0);
    }
}
