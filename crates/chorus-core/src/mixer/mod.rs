//! Mixer - sample-accurate combination of vocal and backing track
//!
//! Two surfaces:
//! - `mix_buffers` / `mix_files`: the plain two-stream mix
//!   (`out[i] = vocal_gain * vocal[i] + bgm_gain * bgm[i]`).
//! - `render_timeline`: the synthesis stage that reassembles an edited
//!   segment timeline over the backing track, each recorded take at its
//!   original offset. Both the final export and the in-memory preview go
//!   through this one function.
//!
//! Clipping policy: saturation hard-clamps to [-1, 1]. Wraparound is never
//! acceptable.

mod service;

pub use service::{MixProgress, MixRequest, MixService};

use std::path::Path;

use thiserror::Error;

use crate::audio_file::{self, AudioFileError};
use crate::effect::chain::MAX_BLOCK_SAMPLES;
use crate::effect::VoiceEffectChain;
use crate::engine::timeline::SegmentTimeline;
use crate::types::{PcmBuffer, PcmSpec};

/// Mixing errors
#[derive(Error, Debug)]
pub enum MixError {
    /// An input file is missing or unreadable
    #[error("Input error: {0}")]
    Input(#[from] AudioFileError),

    /// The two streams don't share a sample rate / channel layout
    #[error("Spec mismatch: vocal {vocal_rate}Hz/{vocal_channels}ch vs backing {bgm_rate}Hz/{bgm_channels}ch")]
    SpecMismatch {
        vocal_rate: u32,
        vocal_channels: u16,
        bgm_rate: u32,
        bgm_channels: u16,
    },

    /// The output file couldn't be written
    #[error("Output error: {0}")]
    Output(String),
}

impl MixError {
    /// Whether retrying the same mix can succeed. Writing failures are
    /// environmental (full disk, permissions); format errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MixError::Output(_))
    }
}

/// Mix two PCM streams at independent gains.
///
/// Output length is `max(len(vocal), len(bgm))`; the shorter stream's tail
/// is implicitly zero. Saturated samples are hard-clamped.
pub fn mix_buffers(
    vocal: &PcmBuffer,
    bgm: &PcmBuffer,
    vocal_gain: f32,
    bgm_gain: f32,
) -> PcmBuffer {
    let len = vocal.len().max(bgm.len());
    let v = vocal.as_slice();
    let b = bgm.as_slice();

    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let vs = v.get(i).copied().unwrap_or(0.0);
        let bs = b.get(i).copied().unwrap_or(0.0);
        out.push((vocal_gain * vs + bgm_gain * bs).clamp(-1.0, 1.0));
    }
    PcmBuffer::from_vec(out)
}

/// Mix a raw vocal PCM file with a backing-track file into a WAV.
///
/// The vocal file is raw interleaved PCM at `spec`; the backing track is
/// any supported container, decoded at its *native* format. A native
/// format that doesn't match `spec` is a `SpecMismatch` error — format
/// conversion is the loader's job, not the mixer's.
pub fn mix_files(
    vocal_path: &Path,
    bgm_path: &Path,
    output_path: &Path,
    vocal_gain: f32,
    bgm_gain: f32,
    spec: PcmSpec,
) -> Result<(), MixError> {
    let vocal = audio_file::read_pcm_file(vocal_path, &spec)?;
    let (bgm, bgm_spec) = audio_file::load_native(bgm_path)?;

    if bgm_spec.sample_rate != spec.sample_rate || bgm_spec.channels != spec.channels {
        return Err(MixError::SpecMismatch {
            vocal_rate: spec.sample_rate,
            vocal_channels: spec.channels,
            bgm_rate: bgm_spec.sample_rate,
            bgm_channels: bgm_spec.channels,
        });
    }

    let mixed = mix_buffers(&vocal, &bgm, vocal_gain, bgm_gain);
    audio_file::write_wav_i16(output_path, &mixed, &spec)
        .map_err(|e| MixError::Output(e.to_string()))?;

    log::info!(
        "Mixed {:?} + {:?} -> {:?} ({} samples)",
        vocal_path.file_name().unwrap_or_default(),
        bgm_path.file_name().unwrap_or_default(),
        output_path,
        mixed.len()
    );
    Ok(())
}

/// Reassemble an edited segment timeline over its backing track.
///
/// The output is exactly the backing track's length: the timeline
/// partitions a prefix of it, recorded segments overlay their vocals at
/// their original offsets, unrecorded spans carry the backing track alone.
///
/// `sweeten` optionally post-processes each segment's vocal (the preview
/// path uses this to audition parameter changes); it is reset between
/// segments so no tail bleeds across.
pub fn render_timeline(
    bgm: &PcmBuffer,
    timeline: &SegmentTimeline,
    vocal_gain: f32,
    bgm_gain: f32,
    mut sweeten: Option<&mut VoiceEffectChain>,
) -> PcmBuffer {
    let mut out: Vec<f32> = bgm.as_slice().iter().map(|s| s * bgm_gain).collect();

    let mut scratch: Vec<f32> = Vec::new();
    for segment in timeline.segments() {
        let Some(vocal) = &segment.vocal else { continue };

        let samples: &[f32] = if let Some(chain) = sweeten.as_deref_mut() {
            scratch.clear();
            scratch.extend_from_slice(vocal.as_slice());
            chain.reset();
            for block in scratch.chunks_mut(MAX_BLOCK_SAMPLES) {
                if let Err(e) = chain.process(block) {
                    log::error!("preview sweetening failed: {}", e);
                }
            }
            &scratch
        } else {
            vocal.as_slice()
        };

        let start = segment.start_samples as usize;
        for (i, &v) in samples.iter().enumerate() {
            let Some(slot) = out.get_mut(start + i) else { break };
            *slot += vocal_gain * v;
        }
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    PcmBuffer::from_vec(out)
}
