//! PCM transport - backing track playback
//!
//! `PcmPlayer` decouples format concerns from the recording and mixing
//! logic: it hands out raw interleaved PCM at the engine spec and knows
//! nothing about karaoke. The real-time engine pulls frames out of it
//! (`fill`), so playback pacing is owned by the audio callback — the
//! backing-track read position is the authoritative clock for segment
//! boundaries.

use std::path::Path;
use std::sync::Arc;

use crate::audio_file::{self, AudioFileError, LoadedTrack};
use crate::types::PcmSpec;

/// Playback state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

pub struct PcmPlayer {
    track: Option<Arc<LoadedTrack>>,
    spec: PcmSpec,
    /// Read position in interleaved samples
    position: usize,
    state: PlayState,
    /// Latched when playback runs off the end of the track
    finished: bool,
}

impl PcmPlayer {
    pub fn new(spec: PcmSpec) -> Self {
        Self {
            track: None,
            spec,
            position: 0,
            state: PlayState::Stopped,
            finished: false,
        }
    }

    /// Load an already-decoded track (shared with the control thread).
    pub fn load_track(&mut self, track: Arc<LoadedTrack>) {
        self.track = Some(track);
        self.position = 0;
        self.state = PlayState::Stopped;
        self.finished = false;
    }

    /// Load a raw interleaved PCM file at an explicit format.
    pub fn load_pcm_file(&mut self, path: &Path, spec: PcmSpec) -> Result<(), AudioFileError> {
        let samples = audio_file::read_pcm_file(path, &spec)?;
        self.spec = spec;
        self.load_track(LoadedTrack::from_samples(samples, spec));
        Ok(())
    }

    /// Drop the loaded track
    pub fn unload(&mut self) {
        self.track = None;
        self.position = 0;
        self.state = PlayState::Stopped;
        self.finished = false;
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    pub fn track(&self) -> Option<&Arc<LoadedTrack>> {
        self.track.as_ref()
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn play(&mut self) {
        if self.track.is_some() {
            self.state = PlayState::Playing;
            self.finished = false;
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
        }
    }

    /// Stop playback and rewind to the start
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.position = 0;
    }

    /// Seek to a time in seconds (clamped to the track length, frame aligned)
    pub fn seek(&mut self, seconds: f64) {
        let Some(track) = &self.track else { return };
        let target = self.spec.seconds_to_samples(seconds.max(0.0)) as usize;
        self.position = target.min(track.len());
        self.finished = false;
    }

    /// Current read position in interleaved samples
    pub fn position_samples(&self) -> u64 {
        self.position as u64
    }

    /// Current read position in seconds
    pub fn position_seconds(&self) -> f64 {
        self.spec.samples_to_seconds(self.position as u64)
    }

    /// Track duration in seconds (0.0 when nothing is loaded)
    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map(|t| t.duration_seconds()).unwrap_or(0.0)
    }

    /// Playback progress (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        match &self.track {
            Some(t) if !t.is_empty() => self.position as f32 / t.len() as f32,
            _ => 0.0,
        }
    }

    /// Whether the last `fill` ran off the end of the track. Reading
    /// clears the latch.
    pub fn take_finished(&mut self) -> bool {
        std::mem::take(&mut self.finished)
    }

    /// Pull the next block of samples into `out`, advancing the read
    /// position. Returns the number of samples written; the remainder of
    /// `out` is zeroed. Real-time safe: no allocation, no locking.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        if self.state != PlayState::Playing {
            out.fill(0.0);
            return 0;
        }

        let Some(track) = &self.track else {
            out.fill(0.0);
            return 0;
        };

        let samples = track.samples.as_slice();
        let available = samples.len().saturating_sub(self.position);
        let n = available.min(out.len());

        out[..n].copy_from_slice(&samples[self.position..self.position + n]);
        out[n..].fill(0.0);
        self.position += n;

        if n < out.len() {
            // Ran off the end: playback is complete
            self.state = PlayState::Stopped;
            self.finished = true;
        }

        n
    }
}
