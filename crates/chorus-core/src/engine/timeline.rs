//! Segment timeline - the ordered model of what was recorded
//!
//! Segments partition the covered prefix of the backing-track timeline:
//! time-ascending, non-overlapping, and gap-free. Spans the user skipped
//! or deleted appear as *unrecorded* segments, never as holes, because the
//! backing track's playback position is the timing reference and every
//! recorded take must land back at its original offset during synthesis.
//!
//! Positions are interleaved sample counts taken from the real-time
//! thread's own counters — the float `seconds` views are derived, so the
//! partition invariant can be checked exactly.

use thiserror::Error;

use crate::effect::EffectParams;
use crate::types::{PcmBuffer, PcmSpec};

/// Timeline consistency errors.
///
/// These are programming-contract failures (the engine feeding the
/// timeline out-of-order data), not user-facing conditions. Callers log
/// them and drop the offending mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Segment starting at sample {start} overlaps timeline end {end}")]
    Overlap { start: u64, end: u64 },

    #[error("Segment index {index} out of range ({len} segments)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A contiguous span of the global timeline.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Span start, in interleaved samples of the backing-track timeline
    pub start_samples: u64,
    /// Span end (exclusive)
    pub end_samples: u64,
    /// Whether vocal audio exists for this span
    pub is_recorded: bool,
    /// Captured samples (effect-processed, pre-mix); `Some` iff recorded
    pub vocal: Option<PcmBuffer>,
    /// Cached vocal+backing mix for this span (whole-track export reuse)
    pub mixed: Option<PcmBuffer>,
    /// Effect configuration active during capture — re-synthesis must
    /// reproduce the capture sound even if live settings changed since
    pub applied_params: EffectParams,
    /// Microphone gain active during capture
    pub applied_mic_gain: f32,
}

impl Segment {
    /// Build a recorded segment from a captured buffer
    pub fn recorded(
        vocal: PcmBuffer,
        start_samples: u64,
        applied_params: EffectParams,
        applied_mic_gain: f32,
    ) -> Self {
        let end_samples = start_samples + vocal.len() as u64;
        Self {
            start_samples,
            end_samples,
            is_recorded: true,
            vocal: Some(vocal),
            mixed: None,
            applied_params,
            applied_mic_gain,
        }
    }

    /// Build an unrecorded filler segment
    pub fn unrecorded(start_samples: u64, end_samples: u64) -> Self {
        Self {
            start_samples,
            end_samples,
            is_recorded: false,
            vocal: None,
            mixed: None,
            applied_params: EffectParams::default(),
            applied_mic_gain: 1.0,
        }
    }

    /// Span length in interleaved samples
    pub fn duration_samples(&self) -> u64 {
        self.end_samples - self.start_samples
    }

    /// Span start in seconds
    pub fn start_seconds(&self, spec: &PcmSpec) -> f64 {
        spec.samples_to_seconds(self.start_samples)
    }

    /// Span duration in seconds
    pub fn duration_seconds(&self, spec: &PcmSpec) -> f64 {
        spec.samples_to_seconds(self.duration_samples())
    }
}

/// The ordered, gapless sequence of segments.
#[derive(Debug, Clone)]
pub struct SegmentTimeline {
    spec: PcmSpec,
    segments: Vec<Segment>,
}

impl SegmentTimeline {
    pub fn new(spec: PcmSpec) -> Self {
        Self {
            spec,
            segments: Vec::new(),
        }
    }

    pub fn spec(&self) -> &PcmSpec {
        &self.spec
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End of the covered prefix, in samples
    pub fn end_samples(&self) -> u64 {
        self.segments.last().map(|s| s.end_samples).unwrap_or(0)
    }

    /// End of the covered prefix, in seconds
    pub fn end_seconds(&self) -> f64 {
        self.spec.samples_to_seconds(self.end_samples())
    }

    /// Number of recorded (non-filler) segments
    pub fn recorded_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_recorded).count()
    }

    /// Append a recorded segment.
    ///
    /// A start beyond the current end gets an unrecorded filler inserted
    /// first (UI-driven "skip ahead" tolerance). A start *before* the
    /// current end is an internal-consistency error.
    pub fn append_recorded(
        &mut self,
        vocal: PcmBuffer,
        start_samples: u64,
        applied_params: EffectParams,
        applied_mic_gain: f32,
    ) -> Result<(), TimelineError> {
        if vocal.is_empty() {
            return Ok(());
        }

        let end = self.end_samples();
        if start_samples < end {
            return Err(TimelineError::Overlap {
                start: start_samples,
                end,
            });
        }
        if start_samples > end {
            self.segments.push(Segment::unrecorded(end, start_samples));
        }

        self.segments.push(Segment::recorded(
            vocal,
            start_samples,
            applied_params,
            applied_mic_gain,
        ));
        self.normalize();
        Ok(())
    }

    /// Advance the recording cursor to `target_samples`, covering the
    /// skipped span with a single unrecorded filler.
    pub fn jump_to(&mut self, target_samples: u64) {
        let end = self.end_samples();
        if target_samples <= end {
            if target_samples < end {
                log::warn!(
                    "jump_to({}) is behind timeline end {}; use rewind_to",
                    target_samples,
                    end
                );
            }
            return;
        }
        self.segments.push(Segment::unrecorded(end, target_samples));
        self.normalize();
    }

    /// Discard everything at or after `target_samples`; a segment
    /// straddling the target is truncated to end exactly there. Used to
    /// throw away a bad take and re-record from an earlier point.
    pub fn rewind_to(&mut self, target_samples: u64) {
        self.segments.retain(|s| s.start_samples < target_samples);

        if let Some(last) = self.segments.last_mut() {
            if last.end_samples > target_samples {
                last.end_samples = target_samples;
                let keep = (target_samples - last.start_samples) as usize;
                if let Some(vocal) = &mut last.vocal {
                    vocal.truncate(keep);
                }
                last.mixed = None;
            }
        }
        self.normalize();
    }

    /// Remove one segment's audio. The span reverts to unrecorded;
    /// subsequent segments are NOT shifted — their start times stay
    /// anchored to the backing-track timeline.
    pub fn delete_segment(&mut self, index: usize) -> Result<(), TimelineError> {
        let len = self.segments.len();
        let segment = self
            .segments
            .get_mut(index)
            .ok_or(TimelineError::IndexOutOfRange { index, len })?;

        segment.is_recorded = false;
        segment.vocal = None;
        segment.mixed = None;
        self.normalize();
        Ok(())
    }

    /// Return to the empty timeline
    pub fn clear_all(&mut self) {
        self.segments.clear();
    }

    /// Merge adjacent unrecorded spans, drop empty spans, and verify the
    /// partition invariant.
    fn normalize(&mut self) {
        self.segments.retain(|s| s.end_samples > s.start_samples);

        let mut i = 1;
        while i < self.segments.len() {
            if !self.segments[i].is_recorded && !self.segments[i - 1].is_recorded {
                let end = self.segments[i].end_samples;
                self.segments[i - 1].end_samples = end;
                self.segments.remove(i);
            } else {
                i += 1;
            }
        }

        debug_assert!(self.check_invariants());
        if cfg!(not(debug_assertions)) {
            self.check_invariants();
        }
    }

    /// Verify ascending, non-overlapping, gap-free ordering. A violation
    /// is a bug in the engine, not a user error: it is logged, never
    /// surfaced.
    pub fn check_invariants(&self) -> bool {
        let mut ok = true;
        for pair in self.segments.windows(2) {
            if pair[0].end_samples != pair[1].start_samples {
                log::error!(
                    "timeline invariant violated: segment ending at {} followed by one starting at {}",
                    pair[0].end_samples,
                    pair[1].start_samples
                );
                ok = false;
            }
        }
        for s in &self.segments {
            if s.is_recorded {
                let vocal_len = s.vocal.as_ref().map(|v| v.len() as u64).unwrap_or(0);
                if vocal_len != s.duration_samples() {
                    log::error!(
                        "timeline invariant violated: recorded span {} samples but vocal buffer {}",
                        s.duration_samples(),
                        vocal_len
                    );
                    ok = false;
                }
            }
        }
        ok
    }
}
