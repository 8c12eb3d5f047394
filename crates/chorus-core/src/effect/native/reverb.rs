//! Voice reverb
//!
//! Freeverb topology per channel: parallel comb filters with damped
//! feedback for the tail, series allpass filters for diffusion. The wet
//! mix doubles as the intensity control — presets scale room size and
//! damping off the same knob so "super reverb" decays longer as well as
//! louder.

/// Comb filter delay lengths (samples at 44.1kHz, scaled at construction)
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Channel offset so multi-channel tails decorrelate
const CHANNEL_SPREAD: usize = 23;

/// Allpass feedback coefficient
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Gain compensation for the comb sum
const COMB_GAIN: f32 = 0.15;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass in the feedback path damps the highs first
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;

        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

struct ChannelState {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

pub struct Reverb {
    channels: Vec<ChannelState>,
    /// Wet mix (0.0 - 1.0)
    mix: f32,
    /// Comb feedback derived from the mix
    feedback: f32,
    /// High-frequency damping derived from the mix
    damp: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, channel_count: u16) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let channels = (0..channel_count.max(1) as usize)
            .map(|ch| ChannelState {
                combs: COMB_LENGTHS
                    .iter()
                    .map(|&len| {
                        CombFilter::new(((len + ch * CHANNEL_SPREAD) as f32 * scale) as usize)
                    })
                    .collect(),
                allpasses: ALLPASS_LENGTHS
                    .iter()
                    .map(|&len| {
                        AllpassFilter::new(((len + ch * CHANNEL_SPREAD) as f32 * scale) as usize)
                    })
                    .collect(),
            })
            .collect();

        let mut reverb = Self {
            channels,
            mix: 0.0,
            feedback: 0.7,
            damp: 0.5,
        };
        reverb.set_mix(0.0);
        reverb
    }

    /// Set the wet mix. Room size and damping scale with it: light mixes
    /// get short bright tails, heavy mixes long dark ones.
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
        self.feedback = 0.7 + 0.25 * self.mix;
        self.damp = 0.6 - 0.3 * self.mix;
    }

    pub fn is_active(&self) -> bool {
        self.mix > 0.0
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.mix <= 0.0 {
            return;
        }

        let n_channels = self.channels.len();
        let wet = self.mix;
        let dry = 1.0 - wet;

        for frame in buffer.chunks_exact_mut(n_channels) {
            for (ch, state) in self.channels.iter_mut().enumerate() {
                let input = frame[ch];

                let mut out = 0.0f32;
                for comb in &mut state.combs {
                    out += comb.process(input, self.feedback, self.damp);
                }
                out *= COMB_GAIN;

                for ap in &mut state.allpasses {
                    out = ap.process(out);
                }

                frame[ch] = input * dry + out * wet;
            }
        }
    }

    pub fn reset(&mut self) {
        for state in &mut self.channels {
            for comb in &mut state.combs {
                comb.reset();
            }
            for ap in &mut state.allpasses {
                ap.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mix_is_passthrough() {
        let mut reverb = Reverb::new(48000, 1);
        reverb.set_mix(0.0);

        let original: Vec<f32> = (0..256).map(|i| (i as f32 / 256.0) - 0.5).collect();
        let mut buffer = original.clone();
        reverb.process(&mut buffer);

        assert_eq!(buffer, original);
    }

    #[test]
    fn test_impulse_grows_a_tail() {
        let mut reverb = Reverb::new(48000, 1);
        reverb.set_mix(0.8);

        let mut buffer = vec![0.0f32; 8192];
        buffer[0] = 1.0;
        reverb.process(&mut buffer);

        // Energy should appear after the shortest comb delay (~1200 samples)
        let tail_energy: f32 = buffer[1500..].iter().map(|s| s.abs()).sum();
        assert!(tail_energy > 0.01, "expected reverb tail, energy {}", tail_energy);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut reverb = Reverb::new(48000, 1);
        reverb.set_mix(0.8);

        let mut buffer = vec![0.5f32; 4096];
        reverb.process(&mut buffer);

        reverb.reset();

        let mut silence = vec![0.0f32; 256];
        reverb.process(&mut silence);
        let energy: f32 = silence.iter().map(|s| s.abs()).sum();
        assert!(energy < 1e-6, "tail should be cleared after reset");
    }

    #[test]
    fn test_stereo_channels_decorrelate() {
        let mut reverb = Reverb::new(48000, 2);
        reverb.set_mix(1.0);

        let mut buffer = vec![0.0f32; 8192];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        reverb.process(&mut buffer);

        let diff = buffer[3000..5000]
            .chunks_exact(2)
            .filter(|f| (f[0] - f[1]).abs() > 1e-6)
            .count();
        assert!(diff > 0, "channel spread should decorrelate the tails");
    }
}
