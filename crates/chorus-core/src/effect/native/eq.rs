//! Bass/treble shelving EQ
//!
//! Two biquad shelves (low shelf at 250 Hz, high shelf at 4 kHz) tuned for
//! voice. Coefficients are cached and only recomputed when a gain changes.

/// Low shelf corner frequency (Hz)
const BASS_FREQ: f32 = 250.0;

/// High shelf corner frequency (Hz)
const TREBLE_FREQ: f32 = 4000.0;

/// Biquad filter coefficients
#[derive(Debug, Clone)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

/// Per-channel biquad state (direct form I)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f32, c: &BiquadCoeffs) -> f32 {
        let out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }
}

pub struct ShelfEq {
    sample_rate: f32,
    bass_gain_db: f32,
    treble_gain_db: f32,
    bass_coeffs: BiquadCoeffs,
    treble_coeffs: BiquadCoeffs,
    bass_states: Vec<BiquadState>,
    treble_states: Vec<BiquadState>,
    dirty: bool,
}

impl ShelfEq {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            sample_rate: sample_rate as f32,
            bass_gain_db: 0.0,
            treble_gain_db: 0.0,
            bass_coeffs: BiquadCoeffs::passthrough(),
            treble_coeffs: BiquadCoeffs::passthrough(),
            bass_states: vec![BiquadState::default(); channels],
            treble_states: vec![BiquadState::default(); channels],
            dirty: false,
        }
    }

    pub fn set_gains(&mut self, bass_db: f32, treble_db: f32) {
        let bass_db = bass_db.clamp(-12.0, 12.0);
        let treble_db = treble_db.clamp(-12.0, 12.0);
        if bass_db != self.bass_gain_db || treble_db != self.treble_gain_db {
            self.bass_gain_db = bass_db;
            self.treble_gain_db = treble_db;
            self.dirty = true;
        }
    }

    pub fn is_active(&self) -> bool {
        self.bass_gain_db.abs() > 0.1 || self.treble_gain_db.abs() > 0.1
    }

    fn update_coeffs(&mut self) {
        if !self.dirty {
            return;
        }
        self.bass_coeffs = if self.bass_gain_db.abs() > 0.1 {
            BiquadCoeffs::low_shelf(BASS_FREQ, self.bass_gain_db, self.sample_rate)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.treble_coeffs = if self.treble_gain_db.abs() > 0.1 {
            BiquadCoeffs::high_shelf(TREBLE_FREQ, self.treble_gain_db, self.sample_rate)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.dirty = false;
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        self.update_coeffs();

        let n_channels = self.bass_states.len();
        for frame in buffer.chunks_exact_mut(n_channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let mut s = self.bass_states[ch].process(*sample, &self.bass_coeffs);
                s = self.treble_states[ch].process(s, &self.treble_coeffs);
                *sample = s;
            }
        }
    }

    pub fn reset(&mut self) {
        for s in &mut self.bass_states {
            *s = BiquadState::default();
        }
        for s in &mut self.treble_states {
            *s = BiquadState::default();
        }
    }
}
