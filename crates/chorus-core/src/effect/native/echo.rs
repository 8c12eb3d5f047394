//! Echo cancellation against the backing-track reference
//!
//! An NLMS adaptive FIR: the reference (the backing track frame aligned to
//! the same time window the microphone frame was captured in) drives a
//! filter that models the speaker→microphone path; its prediction is
//! subtracted from the mic signal before the rest of the chain runs.

/// Hard cap on the adaptive filter length. Long room responses would want
/// a frequency-domain canceller; the time-domain NLMS stays affordable up
/// to roughly this many taps.
const MAX_TAPS: usize = 4096;

/// NLMS adaptation step size
const STEP_SIZE: f32 = 0.5;

/// Regularization added to the reference energy
const REGULARIZATION: f32 = 1e-6;

pub struct EchoCanceller {
    /// Adaptive filter weights
    taps: Vec<f32>,
    /// Reference sample history ring
    history: Vec<f32>,
    /// Write position into the history ring
    pos: usize,
    /// Running energy of the history window
    energy: f32,
}

impl EchoCanceller {
    /// Create a canceller with the given filter length in milliseconds.
    pub fn new(sample_rate: u32, channels: u16, filter_ms: u32) -> Self {
        let samples =
            (sample_rate as usize * channels.max(1) as usize * filter_ms as usize) / 1000;
        let taps = samples.clamp(32, MAX_TAPS);
        Self {
            taps: vec![0.0; taps],
            history: vec![0.0; taps],
            pos: 0,
            energy: 0.0,
        }
    }

    /// Cancel the reference's contribution from `mic` in place.
    ///
    /// `mic` and `reference` must be the same length (validated by the
    /// chain before this stage runs).
    pub fn process(&mut self, mic: &mut [f32], reference: &[f32]) {
        let n = self.taps.len();

        for (m, &r) in mic.iter_mut().zip(reference.iter()) {
            // Slide the reference into the history ring
            let oldest = self.history[self.pos];
            self.energy += r * r - oldest * oldest;
            self.history[self.pos] = r;
            self.pos = (self.pos + 1) % n;

            // Predict the echo from the current filter state
            let mut estimate = 0.0f32;
            for (k, tap) in self.taps.iter().enumerate() {
                let idx = (self.pos + n - 1 - k) % n;
                estimate += tap * self.history[idx];
            }

            let err = *m - estimate;

            // NLMS weight update, normalized by the window energy
            let norm = STEP_SIZE / (self.energy.max(0.0) + REGULARIZATION);
            for (k, tap) in self.taps.iter_mut().enumerate() {
                let idx = (self.pos + n - 1 - k) % n;
                *tap += norm * err * self.history[idx];
            }

            *m = err;
        }
    }

    pub fn reset(&mut self) {
        self.taps.fill(0.0);
        self.history.fill(0.0);
        self.pos = 0;
        self.energy = 0.0;
    }
}
