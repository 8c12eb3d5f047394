//! Automatic gain control
//!
//! Target-level AGC: each block's RMS is compared against the configured
//! target and the running gain walks toward it at the configured attack
//! (`increment`, dB per update) and release (`decrement`, dB per update)
//! rates, bounded by a maximum gain. The strength knob scales both rates
//! so "gentle" settings converge slowly and ride transients less.

use crate::types::{db_to_linear, linear_to_db, slice_rms};

/// Below this RMS the block is treated as silence and the gain holds —
/// adapting on silence would just pump the noise floor up.
const SILENCE_RMS: f32 = 1e-4;

pub struct AutoGainControl {
    /// Target RMS level (0.0 - 1.0 of full scale)
    target_level: f32,
    /// Maximum gain in dB
    max_gain_db: f32,
    /// Gain increase rate (dB per update)
    increment_db: f32,
    /// Gain decrease rate (dB per update, negative)
    decrement_db: f32,
    /// Rate scaling (0.0 - 1.0)
    strength: f32,
    /// Running gain in dB
    gain_db: f32,
}

impl AutoGainControl {
    pub fn new() -> Self {
        Self {
            target_level: 0.25,
            max_gain_db: 20.0,
            increment_db: 12.0,
            decrement_db: -40.0,
            strength: 0.5,
            gain_db: 0.0,
        }
    }

    pub fn set_target_level(&mut self, level: f32) {
        self.target_level = level.clamp(0.01, 1.0);
    }

    pub fn set_max_gain_db(&mut self, db: f32) {
        self.max_gain_db = db.clamp(0.0, 40.0);
    }

    pub fn set_rates(&mut self, increment_db: f32, decrement_db: f32) {
        self.increment_db = increment_db.max(0.0);
        self.decrement_db = decrement_db.min(0.0);
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 1.0);
    }

    /// Current applied gain as a linear multiplier (for UI display)
    pub fn current_gain(&self) -> f32 {
        db_to_linear(self.gain_db)
    }

    /// Process one block in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        let rms = slice_rms(buffer);
        if rms > SILENCE_RMS {
            let desired_db = linear_to_db(self.target_level / rms);

            if desired_db > self.gain_db {
                let step = self.increment_db * self.strength.max(0.05);
                self.gain_db = (self.gain_db + step).min(desired_db);
            } else {
                let step = self.decrement_db * self.strength.max(0.05);
                self.gain_db = (self.gain_db + step).max(desired_db);
            }
            self.gain_db = self.gain_db.clamp(-self.max_gain_db, self.max_gain_db);
        }

        let gain = db_to_linear(self.gain_db);
        for s in buffer.iter_mut() {
            *s *= gain;
        }
    }

    pub fn reset(&mut self) {
        self.gain_db = 0.0;
    }
}

impl Default for AutoGainControl {
    fn default() -> Self {
        Self::new()
    }
}
