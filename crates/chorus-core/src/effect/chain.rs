//! The voice effect chain
//!
//! One chain instance lives on the real-time thread and processes every
//! captured microphone block in place; a second instance is built on
//! demand for preview sweetening. All sub-modules allocate at
//! construction only — `process` never allocates, so it is safe inside
//! the audio callback.
//!
//! Stage order: echo cancel → noise suppression → AGC → pitch shift /
//! auto-tune → compressor → EQ → reverb → delay → volume gain.

use crate::effect::native::{
    AutoGainControl, AutoTuner, Compressor, Delay, EchoCanceller, NoiseSuppressor, PitchShifter,
    Reverb, ShelfEq,
};
use crate::effect::{EffectError, EffectParams};
use crate::types::PcmSpec;

/// Maximum samples per `process` call. Anything larger is a malformed
/// buffer and fails the call — real-time blocks are a few hundred frames.
pub const MAX_BLOCK_SAMPLES: usize = 16384;

pub struct VoiceEffectChain {
    spec: PcmSpec,
    params: EffectParams,

    echo: EchoCanceller,
    denoise: NoiseSuppressor,
    agc: AutoGainControl,
    pitch: PitchShifter,
    autotune: AutoTuner,
    compressor: Compressor,
    eq: ShelfEq,
    reverb: Reverb,
    delay: Delay,

    /// Latched VAD decision when the advanced VAD toggle is on
    vad_active: bool,
    /// Scratch for the i16 entry points
    scratch: Vec<f32>,
}

impl VoiceEffectChain {
    pub fn new(spec: PcmSpec) -> Self {
        let rate = spec.sample_rate;
        let channels = spec.channels;
        let mut chain = Self {
            spec,
            params: EffectParams::default(),
            echo: EchoCanceller::new(rate, channels, 200),
            denoise: NoiseSuppressor::new(),
            agc: AutoGainControl::new(),
            pitch: PitchShifter::new(channels, MAX_BLOCK_SAMPLES),
            autotune: AutoTuner::new(rate, channels, MAX_BLOCK_SAMPLES),
            compressor: Compressor::new(rate),
            eq: ShelfEq::new(rate, channels),
            reverb: Reverb::new(rate, channels),
            delay: Delay::new(rate, channels),
            vad_active: false,
            scratch: vec![0.0; MAX_BLOCK_SAMPLES],
        };
        chain.configure(&EffectParams::default());
        chain
    }

    /// Apply a parameter set. Called from the audio thread when a
    /// `SetEffectParams` command lands — cheap, no allocation.
    pub fn configure(&mut self, params: &EffectParams) {
        let mut params = params.clone();
        params.clamp();

        self.pitch.set_semitones(params.pitch_semitones);
        self.autotune.set_key_scale(params.musical_key, params.musical_scale);
        self.compressor.set_ratio(params.compression_ratio);
        self.eq.set_gains(params.bass_gain_db, params.treble_gain_db);
        self.reverb.set_mix(params.reverb_mix);
        self.delay.set_mix(params.delay_mix);

        self.denoise.set_suppress_db(params.advanced.noise_suppress_db);

        if params.advanced.agc {
            // Professional AGC: explicit target/rate parameters
            self.agc.set_target_level(params.advanced.agc_target_level);
            self.agc.set_max_gain_db(params.advanced.agc_max_gain_db);
            self.agc
                .set_rates(params.advanced.agc_increment_db, params.advanced.agc_decrement_db);
            self.agc.set_strength(1.0);
        } else {
            // Simple AGC: a single strength knob scales the default rates
            self.agc.set_strength(params.agc_strength);
        }

        self.params = params;
    }

    /// The parameters currently driving the chain
    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    /// Current AGC gain multiplier (for UI display)
    pub fn current_agc_gain(&self) -> f32 {
        self.agc.current_gain()
    }

    /// Latest VAD decision (meaningful when the advanced VAD toggle is on)
    pub fn vad_active(&self) -> bool {
        self.vad_active
    }

    fn validate(&self, len: usize) -> Result<(), EffectError> {
        let channels = self.spec.channels.max(1) as usize;
        if len == 0 || len > MAX_BLOCK_SAMPLES || len % channels != 0 {
            return Err(EffectError::BadBufferSize {
                len,
                channels: self.spec.channels,
            });
        }
        Ok(())
    }

    /// Process one block in place, returning the voice activity
    /// probability for the block.
    pub fn process(&mut self, buffer: &mut [f32]) -> Result<f32, EffectError> {
        self.validate(buffer.len())?;
        Ok(self.run_stages(buffer))
    }

    /// Process one block with an aligned backing-track reference frame for
    /// echo cancellation. The reference must match the input length.
    pub fn process_with_reference(
        &mut self,
        buffer: &mut [f32],
        reference: &[f32],
    ) -> Result<f32, EffectError> {
        self.validate(buffer.len())?;
        if reference.len() != buffer.len() {
            return Err(EffectError::ReferenceMismatch {
                input: buffer.len(),
                reference: reference.len(),
            });
        }

        if self.params.advanced.echo_cancel {
            self.echo.process(buffer, reference);
        }
        Ok(self.run_stages(buffer))
    }

    /// 16-bit entry point: converts through the pre-allocated scratch.
    pub fn process_i16(&mut self, buffer: &mut [i16]) -> Result<f32, EffectError> {
        self.validate(buffer.len())?;

        // Swap the scratch out so the stages can borrow `self` (swap of a
        // Vec, no allocation)
        let mut scratch = std::mem::take(&mut self.scratch);
        let view = &mut scratch[..buffer.len()];
        for (f, &s) in view.iter_mut().zip(buffer.iter()) {
            *f = s as f32 / i16::MAX as f32;
        }

        let vad = self.run_stages(view);

        for (s, &f) in buffer.iter_mut().zip(view.iter()) {
            *s = (f.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        }
        self.scratch = scratch;
        Ok(vad)
    }

    fn run_stages(&mut self, buffer: &mut [f32]) -> f32 {
        let mut vad_probability = 1.0;

        if self.params.denoise_active() {
            vad_probability = self.denoise.process(buffer);
        }

        if self.params.agc_active() {
            self.agc.process(buffer);
        }

        if self.params.auto_tune {
            self.autotune.process(buffer);
        } else if self.pitch.is_active() {
            self.pitch.process(buffer);
        }

        if self.compressor.is_active() {
            self.compressor.process(buffer);
        }
        if self.eq.is_active() {
            self.eq.process(buffer);
        }
        if self.reverb.is_active() {
            self.reverb.process(buffer);
        }
        if self.delay.is_active() {
            self.delay.process(buffer);
        }

        let gain = self.params.volume_gain;
        if (gain - 1.0).abs() > 1e-6 {
            for s in buffer.iter_mut() {
                *s *= gain;
            }
        }

        if self.params.advanced.vad {
            self.vad_active = vad_probability >= self.params.advanced.vad_threshold;
        }

        vad_probability
    }

    /// Flush all internal history. Called whenever recording or playback
    /// stops so a replay from a skipped point starts clean.
    pub fn reset(&mut self) {
        self.echo.reset();
        self.denoise.reset();
        self.agc.reset();
        self.pitch.reset();
        self.autotune.reset();
        self.compressor.reset();
        self.eq.reset();
        self.reverb.reset();
        self.delay.reset();
        self.vad_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectPreset;

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn test_default_params_are_identity() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());

        let original = sine(960);
        let mut buffer = original.clone();
        let vad = chain.process(&mut buffer).unwrap();

        assert_eq!(buffer, original, "default chain must be a passthrough");
        assert_eq!(vad, 1.0);
    }

    #[test]
    fn test_zero_pitch_shift_is_identity() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        let mut params = EffectParams::default();
        params.pitch_semitones = 0.0;
        chain.configure(&params);

        let original = sine(960);
        let mut buffer = original.clone();
        chain.process(&mut buffer).unwrap();
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_volume_gain_scales_output() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        let mut params = EffectParams::default();
        params.volume_gain = 2.0;
        chain.configure(&params);

        let mut buffer = vec![0.25f32; 480];
        chain.process(&mut buffer).unwrap();
        for s in &buffer {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_malformed_buffer_fails() {
        let mut chain = VoiceEffectChain::new(PcmSpec::new(48000, 2));

        // Odd sample count on a stereo chain: not a whole frame
        let mut odd = vec![0.0f32; 481];
        assert!(matches!(
            chain.process(&mut odd),
            Err(EffectError::BadBufferSize { .. })
        ));

        // Oversized block
        let mut huge = vec![0.0f32; MAX_BLOCK_SAMPLES + 2];
        assert!(chain.process(&mut huge).is_err());

        // Empty block
        let mut empty: Vec<f32> = Vec::new();
        assert!(chain.process(&mut empty).is_err());
    }

    #[test]
    fn test_reference_length_mismatch_fails() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        let mut params = EffectParams::default();
        params.advanced.echo_cancel = true;
        chain.configure(&params);

        let mut mic = vec![0.0f32; 480];
        let reference = vec![0.0f32; 256];
        assert!(matches!(
            chain.process_with_reference(&mut mic, &reference),
            Err(EffectError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn test_preset_changes_output() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        chain.configure(&EffectParams::from_preset(EffectPreset::SuperReverb));

        let original = sine(4096);
        let mut buffer = original.clone();
        chain.process(&mut buffer).unwrap();

        assert_ne!(buffer, original, "super reverb must color the signal");
    }

    #[test]
    fn test_i16_entry_point() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        let mut params = EffectParams::default();
        params.volume_gain = 0.5;
        chain.configure(&params);

        let mut buffer = vec![10000i16; 480];
        chain.process_i16(&mut buffer).unwrap();
        for s in &buffer {
            assert!((s - 5000).abs() <= 1, "expected ~5000, got {}", s);
        }
    }

    #[test]
    fn test_reset_clears_reverb_tail() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        chain.configure(&EffectParams::from_preset(EffectPreset::SuperReverb));

        let mut buffer = sine(8192);
        chain.process(&mut buffer).unwrap();

        chain.reset();

        let mut silence = vec![0.0f32; 960];
        chain.process(&mut silence).unwrap();
        assert!(
            silence.iter().all(|s| s.abs() < 1e-6),
            "no tail may survive a reset"
        );
    }

    #[test]
    fn test_vad_latches_with_advanced_toggle() {
        let mut chain = VoiceEffectChain::new(PcmSpec::default());
        let mut params = EffectParams::default();
        params.noise_reduction = true;
        params.advanced.vad = true;
        params.advanced.vad_threshold = 0.5;
        chain.configure(&params);

        // Train the noise floor on near-silence
        for _ in 0..50 {
            let mut quiet = vec![0.001f32; 480];
            chain.process(&mut quiet).unwrap();
        }
        assert!(!chain.vad_active());

        let mut voiced = sine(480);
        let vad = chain.process(&mut voiced).unwrap();
        assert!(vad > 0.5);
        assert!(chain.vad_active());
    }
}
