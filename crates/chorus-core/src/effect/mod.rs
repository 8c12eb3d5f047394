//! Voice effect system - presets, parameters, and the processing chain
//!
//! A preset is only a *tag*: selecting one expands into the full continuous
//! parameter set (`EffectParams`), and the chain itself processes parameters
//! without ever branching on preset names. The UI can start from a preset
//! and then override individual parameters freely.

pub mod chain;
pub mod native;

pub use chain::{VoiceEffectChain, MAX_BLOCK_SAMPLES};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the effect chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    /// Buffer length is not a whole number of frames or exceeds the
    /// pre-allocated processing capacity
    #[error("Malformed buffer size: {len} samples ({channels} channels)")]
    BadBufferSize { len: usize, channels: u16 },

    /// Echo-cancellation reference frame doesn't match the mic frame
    #[error("Reference length {reference} doesn't match input length {input}")]
    ReferenceMismatch { input: usize, reference: usize },
}

/// Named voice effect presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EffectPreset {
    /// Dry voice, no processing
    #[default]
    None,
    /// Light reverb + compression
    Studio,
    /// Medium hall reverb
    ConcertHall,
    /// Heavy reverb
    SuperReverb,
    /// Vocal presence boost + light reverb
    Singer,
    /// Full enhancement: reverb, compression, EQ, gain
    GodOfSong,
    /// Long reverb + delay
    Ethereal,
    /// Low-frequency warmth
    Magnetic,
    /// High-frequency sparkle
    Bright,
    /// Automatic pitch correction
    AutoTune,
    /// Voice up two semitones
    PitchUp,
    /// Voice down two semitones
    PitchDown,
}

impl EffectPreset {
    /// All presets in UI order
    pub const ALL: [EffectPreset; 12] = [
        EffectPreset::None,
        EffectPreset::Studio,
        EffectPreset::ConcertHall,
        EffectPreset::SuperReverb,
        EffectPreset::Singer,
        EffectPreset::GodOfSong,
        EffectPreset::Ethereal,
        EffectPreset::Magnetic,
        EffectPreset::Bright,
        EffectPreset::AutoTune,
        EffectPreset::PitchUp,
        EffectPreset::PitchDown,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            EffectPreset::None => "Original",
            EffectPreset::Studio => "Studio",
            EffectPreset::ConcertHall => "Concert Hall",
            EffectPreset::SuperReverb => "Super Reverb",
            EffectPreset::Singer => "Singer",
            EffectPreset::GodOfSong => "God of Song",
            EffectPreset::Ethereal => "Ethereal",
            EffectPreset::Magnetic => "Magnetic",
            EffectPreset::Bright => "Bright",
            EffectPreset::AutoTune => "Auto-Tune",
            EffectPreset::PitchUp => "Pitch Up",
            EffectPreset::PitchDown => "Pitch Down",
        }
    }
}

/// Musical scale for auto-tune
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MusicalScale {
    #[default]
    Major,
    Minor,
}

impl MusicalScale {
    /// Scale degrees as semitone offsets from the key root
    pub fn intervals(&self) -> &'static [i32; 7] {
        match self {
            MusicalScale::Major => &[0, 2, 4, 5, 7, 9, 11],
            MusicalScale::Minor => &[0, 2, 3, 5, 7, 8, 10],
        }
    }
}

/// Advanced DSP block: independent toggles with their own sub-parameters.
///
/// These sit alongside the simple `noise_reduction` / `agc_enabled` switches
/// and take precedence over them when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DspOptions {
    /// Professional AGC (overrides the simple AGC switch)
    pub agc: bool,
    /// Additional spectral denoise stage
    pub denoise: bool,
    /// Voice activity detection
    pub vad: bool,
    /// Echo cancellation against the backing-track reference
    pub echo_cancel: bool,

    /// AGC target RMS level (0.0 - 1.0 of full scale)
    pub agc_target_level: f32,
    /// AGC maximum gain in dB
    pub agc_max_gain_db: f32,
    /// AGC gain increase rate (dB per update)
    pub agc_increment_db: f32,
    /// AGC gain decrease rate (dB per update, negative)
    pub agc_decrement_db: f32,
    /// Maximum noise attenuation in dB (negative)
    pub noise_suppress_db: f32,
    /// VAD decision threshold (0.0 - 1.0)
    pub vad_threshold: f32,
    /// Echo canceller filter length in milliseconds
    pub echo_filter_ms: u32,
}

impl Default for DspOptions {
    fn default() -> Self {
        Self {
            agc: false,
            denoise: false,
            vad: false,
            echo_cancel: false,
            agc_target_level: 0.25,
            agc_max_gain_db: 20.0,
            agc_increment_db: 12.0,
            agc_decrement_db: -40.0,
            noise_suppress_db: -15.0,
            vad_threshold: 0.5,
            echo_filter_ms: 200,
        }
    }
}

/// The full continuous parameter set of the voice chain.
///
/// Created per engine instance, mutated live by the UI layer, and stamped
/// immutably onto each captured segment so re-synthesis can reproduce the
/// capture sound even after the live settings change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    /// The preset these parameters were expanded from (display only)
    pub preset: EffectPreset,

    /// Reverb wet mix (0.0 - 1.0)
    pub reverb_mix: f32,
    /// Delay wet mix (0.0 - 1.0)
    pub delay_mix: f32,
    /// Compression ratio (1.0 = off, up to 10.0)
    pub compression_ratio: f32,
    /// Bass shelf gain (-12 to +12 dB)
    pub bass_gain_db: f32,
    /// Treble shelf gain (-12 to +12 dB)
    pub treble_gain_db: f32,
    /// Overall output gain (0.0 - 3.0)
    pub volume_gain: f32,

    /// Simple noise reduction switch
    pub noise_reduction: bool,
    /// Pitch shift in semitones (-12 to +12)
    pub pitch_semitones: f32,
    /// Automatic pitch correction
    pub auto_tune: bool,
    /// Key for auto-tune (0-11: C, C#, D, ... B)
    pub musical_key: u8,
    /// Scale for auto-tune
    pub musical_scale: MusicalScale,

    /// Simple AGC switch
    pub agc_enabled: bool,
    /// Simple AGC strength (0.0 = gentle, 1.0 = aggressive)
    pub agc_strength: f32,

    /// Advanced DSP block
    pub advanced: DspOptions,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            preset: EffectPreset::None,
            reverb_mix: 0.0,
            delay_mix: 0.0,
            compression_ratio: 1.0,
            bass_gain_db: 0.0,
            treble_gain_db: 0.0,
            volume_gain: 1.0,
            noise_reduction: false,
            pitch_semitones: 0.0,
            auto_tune: false,
            musical_key: 0,
            musical_scale: MusicalScale::Major,
            agc_enabled: false,
            agc_strength: 0.5,
            advanced: DspOptions::default(),
        }
    }
}

impl EffectParams {
    /// Expand a preset tag into its parameter set.
    pub fn from_preset(preset: EffectPreset) -> Self {
        let base = Self {
            preset,
            ..Self::default()
        };
        match preset {
            EffectPreset::None => base,
            EffectPreset::Studio => Self {
                reverb_mix: 0.15,
                compression_ratio: 2.0,
                volume_gain: 1.1,
                ..base
            },
            EffectPreset::ConcertHall => Self {
                reverb_mix: 0.4,
                delay_mix: 0.1,
                volume_gain: 1.1,
                ..base
            },
            EffectPreset::SuperReverb => Self {
                reverb_mix: 0.7,
                delay_mix: 0.2,
                ..base
            },
            EffectPreset::Singer => Self {
                reverb_mix: 0.2,
                compression_ratio: 3.0,
                treble_gain_db: 2.0,
                volume_gain: 1.3,
                ..base
            },
            EffectPreset::GodOfSong => Self {
                reverb_mix: 0.35,
                delay_mix: 0.15,
                compression_ratio: 4.0,
                bass_gain_db: 3.0,
                treble_gain_db: 3.0,
                volume_gain: 1.4,
                ..base
            },
            EffectPreset::Ethereal => Self {
                reverb_mix: 0.6,
                delay_mix: 0.45,
                ..base
            },
            EffectPreset::Magnetic => Self {
                bass_gain_db: 6.0,
                treble_gain_db: -2.0,
                volume_gain: 1.2,
                ..base
            },
            EffectPreset::Bright => Self {
                treble_gain_db: 6.0,
                volume_gain: 1.1,
                ..base
            },
            EffectPreset::AutoTune => Self {
                auto_tune: true,
                reverb_mix: 0.15,
                ..base
            },
            EffectPreset::PitchUp => Self {
                pitch_semitones: 2.0,
                ..base
            },
            EffectPreset::PitchDown => Self {
                pitch_semitones: -2.0,
                ..base
            },
        }
    }

    /// Clamp every parameter into its documented range.
    pub fn clamp(&mut self) {
        self.reverb_mix = self.reverb_mix.clamp(0.0, 1.0);
        self.delay_mix = self.delay_mix.clamp(0.0, 1.0);
        self.compression_ratio = self.compression_ratio.clamp(1.0, 10.0);
        self.bass_gain_db = self.bass_gain_db.clamp(-12.0, 12.0);
        self.treble_gain_db = self.treble_gain_db.clamp(-12.0, 12.0);
        self.volume_gain = self.volume_gain.clamp(0.0, 3.0);
        self.pitch_semitones = self.pitch_semitones.clamp(-12.0, 12.0);
        self.musical_key %= 12;
        self.agc_strength = self.agc_strength.clamp(0.0, 1.0);
        self.advanced.agc_target_level = self.advanced.agc_target_level.clamp(0.01, 1.0);
        self.advanced.agc_max_gain_db = self.advanced.agc_max_gain_db.clamp(0.0, 40.0);
        self.advanced.noise_suppress_db = self.advanced.noise_suppress_db.clamp(-30.0, 0.0);
        self.advanced.vad_threshold = self.advanced.vad_threshold.clamp(0.0, 1.0);
    }

    /// Whether any noise suppression stage is active
    pub fn denoise_active(&self) -> bool {
        self.noise_reduction || self.advanced.denoise
    }

    /// Whether any AGC stage is active
    pub fn agc_active(&self) -> bool {
        self.agc_enabled || self.advanced.agc
    }

    /// The audition subset of these parameters: tonal stages only.
    ///
    /// Captured vocals are stored effect-processed, so preview layers the
    /// requested pitch/EQ/reverb/delay/gain over them. Capture-only
    /// stages (denoise, AGC, auto-tune, echo cancellation, compression)
    /// need live microphone dynamics and are never re-applied.
    pub fn sweetening(&self) -> Self {
        Self {
            noise_reduction: false,
            auto_tune: false,
            agc_enabled: false,
            compression_ratio: 1.0,
            advanced: DspOptions::default(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_expansion_is_pure_data() {
        // Every preset expands into parameters; nothing downstream
        // branches on the tag itself.
        for preset in EffectPreset::ALL {
            let params = EffectParams::from_preset(preset);
            assert_eq!(params.preset, preset);
        }

        let god = EffectParams::from_preset(EffectPreset::GodOfSong);
        assert!(god.reverb_mix > 0.0);
        assert!(god.compression_ratio > 1.0);
        assert!(god.volume_gain > 1.0);

        let none = EffectParams::from_preset(EffectPreset::None);
        assert_eq!(none.reverb_mix, 0.0);
        assert_eq!(none.volume_gain, 1.0);
    }

    #[test]
    fn test_param_clamping() {
        let mut params = EffectParams::default();
        params.pitch_semitones = 24.0;
        params.compression_ratio = 99.0;
        params.volume_gain = -1.0;
        params.musical_key = 14;
        params.clamp();

        assert_eq!(params.pitch_semitones, 12.0);
        assert_eq!(params.compression_ratio, 10.0);
        assert_eq!(params.volume_gain, 0.0);
        assert_eq!(params.musical_key, 2);
    }

    #[test]
    fn test_scale_intervals() {
        assert_eq!(MusicalScale::Major.intervals()[2], 4);
        assert_eq!(MusicalScale::Minor.intervals()[2], 3);
    }

    #[test]
    fn test_preset_names_are_unique() {
        let mut names: Vec<_> = EffectPreset::ALL.iter().map(|p| p.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EffectPreset::ALL.len());
    }
}
