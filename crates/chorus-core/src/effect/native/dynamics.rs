//! Vocal compressor
//!
//! A feed-forward compressor with a fixed threshold and the ratio exposed
//! as the single user parameter (1.0 = off, 10.0 = near-limiting). The
//! envelope follower uses short attack / longer release time constants so
//! sung phrases are levelled without audible pumping.

use crate::types::{db_to_linear, linear_to_db};

/// Compression threshold in dBFS
const THRESHOLD_DB: f32 = -18.0;

/// Attack time constant in seconds
const ATTACK_SECS: f32 = 0.005;

/// Release time constant in seconds
const RELEASE_SECS: f32 = 0.08;

pub struct Compressor {
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Envelope of the input level (linear)
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            ratio: 1.0,
            attack_coeff: (-1.0 / (ATTACK_SECS * sr)).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * sr)).exp(),
            envelope: 0.0,
        }
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(1.0, 10.0);
    }

    pub fn is_active(&self) -> bool {
        self.ratio > 1.01
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        if !self.is_active() {
            return;
        }

        let threshold = db_to_linear(THRESHOLD_DB);

        for s in buffer.iter_mut() {
            let level = s.abs();

            // Envelope follower: fast up, slow down
            if level > self.envelope {
                self.envelope = self.attack_coeff * (self.envelope - level) + level;
            } else {
                self.envelope = self.release_coeff * (self.envelope - level) + level;
            }

            let gain = if self.envelope > threshold {
                let over_db = linear_to_db(self.envelope) - THRESHOLD_DB;
                let reduced_db = over_db * (1.0 / self.ratio - 1.0);
                db_to_linear(reduced_db)
            } else {
                1.0
            };

            *s *= gain;
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
