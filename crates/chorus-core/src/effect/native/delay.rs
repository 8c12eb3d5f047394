//! Feedback delay for the voice chain
//!
//! A plain slap-back/echo delay per channel with a feedback path and a
//! wet/dry mix. Presets only touch the mix; the delay time defaults to a
//! vocal-friendly 280ms.

/// Default delay time in seconds
const DEFAULT_DELAY_SECONDS: f32 = 0.28;

/// Maximum delay time in seconds (buffer allocation bound)
const MAX_DELAY_SECONDS: f32 = 1.0;

/// Feedback amount (fixed; runaway feedback is not a vocal effect)
const FEEDBACK: f32 = 0.35;

struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(1)],
            write_pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay_samples: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.min(len - 1);
        let read_pos = (self.write_pos + len - delay) % len;
        let delayed = self.buffer[read_pos];

        self.buffer[self.write_pos] = input + delayed * FEEDBACK;
        self.write_pos = (self.write_pos + 1) % len;

        delayed
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

pub struct Delay {
    lines: Vec<DelayLine>,
    delay_samples: usize,
    mix: f32,
}

impl Delay {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let max_samples = (sample_rate as f32 * MAX_DELAY_SECONDS) as usize;
        Self {
            lines: (0..channels.max(1) as usize)
                .map(|_| DelayLine::new(max_samples))
                .collect(),
            delay_samples: (sample_rate as f32 * DEFAULT_DELAY_SECONDS) as usize,
            mix: 0.0,
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    /// Set the delay time in seconds (clamped to the allocated buffer)
    pub fn set_delay_seconds(&mut self, seconds: f32, sample_rate: u32) {
        let samples = (seconds.clamp(0.01, MAX_DELAY_SECONDS) * sample_rate as f32) as usize;
        self.delay_samples = samples;
    }

    pub fn is_active(&self) -> bool {
        self.mix > 0.0
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.mix <= 0.0 {
            return;
        }

        let n_channels = self.lines.len();
        let wet = self.mix;
        let dry = 1.0 - wet * 0.5; // keep the dry voice present under the echo

        for frame in buffer.chunks_exact_mut(n_channels) {
            for (ch, line) in self.lines.iter_mut().enumerate() {
                let delayed = line.process(frame[ch], self.delay_samples);
                frame[ch] = frame[ch] * dry + delayed * wet;
            }
        }
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mix_is_passthrough() {
        let mut delay = Delay::new(48000, 1);
        let original = vec![0.7f32; 128];
        let mut buffer = original.clone();
        delay.process(&mut buffer);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_impulse_echoes_at_delay_time() {
        let mut delay = Delay::new(48000, 1);
        delay.set_mix(1.0);
        delay.set_delay_seconds(0.01, 48000); // 480 samples

        let mut buffer = vec![0.0f32; 2048];
        buffer[0] = 1.0;
        delay.process(&mut buffer);

        assert!(buffer[480].abs() > 0.5, "echo expected at 480, got {}", buffer[480]);
        // Second repeat from feedback, attenuated
        assert!(buffer[960].abs() > 0.1 && buffer[960].abs() < buffer[480].abs());
    }

    #[test]
    fn test_reset_clears_echoes() {
        let mut delay = Delay::new(48000, 1);
        delay.set_mix(1.0);

        let mut buffer = vec![1.0f32; 4096];
        delay.process(&mut buffer);
        delay.reset();

        let mut silence = vec![0.0f32; 1024];
        delay.process(&mut silence);
        assert!(silence.iter().all(|s| s.abs() < 1e-9));
    }
}
