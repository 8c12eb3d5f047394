//! Engine events and lock-free monitoring state
//!
//! Two event layers:
//! - `RtEvent`: small `Copy` values the real-time thread pushes into an
//!   rtrb ring. Segment boundaries carry the audio thread's own sample
//!   counters — these, not the advisory atomics, are what segment
//!   correctness is derived from.
//! - `EngineEvent`: the public notification surface the control side
//!   assembles from `RtEvent`s and its own operations, delivered from
//!   `poll()` and fanned out to subscribers.
//!
//! `EngineMonitor` is the UI's lock-free window into the audio thread:
//! Relaxed atomics, torn/stale reads tolerated, advisory only.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Engine state machine.
///
/// Owned exclusively by the real-time engine; every transition lands on a
/// callback boundary. The paused-playback / loaded-but-stopped sub-states
/// both read as `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle = 0,
    Playing = 1,
    Recording = 2,
    RecordingPaused = 3,
    Finishing = 4,
}

impl EngineState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Playing,
            2 => EngineState::Recording,
            3 => EngineState::RecordingPaused,
            4 => EngineState::Finishing,
            _ => EngineState::Idle,
        }
    }
}

/// Why the real-time engine closed the open capture segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentCloseCause {
    /// User paused recording; backing track keeps playing
    Paused,
    /// User stopped recording or playback
    Stopped,
    /// Recording jumped ahead; the skipped span becomes a filler
    Jump { target_samples: u64 },
    /// Recording rewound to re-record from an earlier point
    Rewind { target_samples: u64 },
    /// `finish_recording` flow began
    Finish,
    /// Playback ran off the end of the backing track
    PlaybackEnded,
    /// The bounded recording window ended
    OutOfBounds,
    /// The audio device faulted; recording parks until the user acts
    DeviceFault,
}

/// Events pushed by the real-time thread (small, `Copy`, allocation-free)
#[derive(Debug, Clone, Copy)]
pub enum RtEvent {
    /// A capture segment opened at this backing-track position
    SegmentOpened { start_samples: u64 },
    /// The open segment closed. `pushed_samples` is how many processed
    /// samples actually entered the capture ring (normally equal to
    /// `end_samples - start_samples`; less only after a ring overflow).
    SegmentClosed {
        start_samples: u64,
        end_samples: u64,
        pushed_samples: u64,
        cause: SegmentCloseCause,
    },
    /// Backing track playback completed
    PlaybackFinished,
    /// Countdown toward a bounded recording window
    CountdownTick { seconds_remaining: u32 },
    /// Decimated microphone level update (post effect chain)
    LevelUpdate { rms: f32, peak: f32 },
}

/// Public engine notifications
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Microphone level update (RMS + peak of the processed signal)
    MicrophoneLevel { rms: f32, peak: f32 },
    /// Backing track playback completed
    PlaybackFinished,
    /// Countdown tick before a bounded recording window
    CountdownTick { seconds_remaining: u32 },
    /// The segment timeline changed (recorded, deleted, rewound, ...)
    SegmentListChanged,
    /// Recording paused. `automatic` means the engine parked itself
    /// (device fault) rather than the user asking.
    RecordingPaused { automatic: bool },
    /// The finish flow completed. `error` is `None` on success; on
    /// failure `retryable` says whether the same call may be retried
    /// (the timeline is never modified by a failed synthesis).
    RecordingFinished {
        output_path: PathBuf,
        error: Option<String>,
        retryable: bool,
    },
    /// A non-fatal engine error worth surfacing
    Error { message: String },
}

/// Lock-free monitoring state shared with the UI thread.
///
/// All operations use `Ordering::Relaxed`: we need visibility, not
/// synchronization. Playback position read from here is advisory (UI
/// progress bars); segment boundaries never come from these fields.
pub struct EngineMonitor {
    /// Current backing-track read position in interleaved samples
    pub position: AtomicU64,
    /// Engine state as `EngineState as u8`
    pub state: AtomicU8,
    /// Processed microphone RMS level (f32 bits)
    pub mic_rms: AtomicU32,
    /// Processed microphone peak level (f32 bits)
    pub mic_peak: AtomicU32,
    /// Set by the backend's stream error callback; the real-time loop
    /// notices it at the next block boundary
    pub device_fault: AtomicBool,
}

impl EngineMonitor {
    pub fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            state: AtomicU8::new(EngineState::Idle as u8),
            mic_rms: AtomicU32::new(0),
            mic_peak: AtomicU32::new(0),
            device_fault: AtomicBool::new(false),
        }
    }

    /// Current playback position in interleaved samples (lock-free)
    #[inline]
    pub fn position_samples(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Current engine state (lock-free)
    #[inline]
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Processed microphone RMS (lock-free)
    #[inline]
    pub fn mic_rms(&self) -> f32 {
        f32::from_bits(self.mic_rms.load(Ordering::Relaxed))
    }

    /// Processed microphone peak (lock-free)
    #[inline]
    pub fn mic_peak(&self) -> f32 {
        f32::from_bits(self.mic_peak.load(Ordering::Relaxed))
    }

    /// Flag a device fault (called from stream error callbacks)
    pub fn set_device_fault(&self) {
        self.device_fault.store(true, Ordering::Relaxed);
    }

    pub(crate) fn store_levels(&self, rms: f32, peak: f32) {
        self.mic_rms.store(rms.to_bits(), Ordering::Relaxed);
        self.mic_peak.store(peak.to_bits(), Ordering::Relaxed);
    }
}

impl Default for EngineMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            EngineState::Idle,
            EngineState::Playing,
            EngineState::Recording,
            EngineState::RecordingPaused,
            EngineState::Finishing,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
        assert_eq!(EngineState::from_u8(99), EngineState::Idle);
    }

    #[test]
    fn test_monitor_levels() {
        let monitor = EngineMonitor::new();
        monitor.store_levels(0.25, 0.9);
        assert_eq!(monitor.mic_rms(), 0.25);
        assert_eq!(monitor.mic_peak(), 0.9);
    }

    #[test]
    fn test_rt_event_is_small() {
        // RtEvents travel through a fixed-size lock-free ring; keep them
        // within a few words.
        assert!(std::mem::size_of::<RtEvent>() <= 40);
    }
}
