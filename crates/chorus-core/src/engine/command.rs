//! Lock-free command queue for real-time engine control
//!
//! The control thread sends commands via a lock-free SPSC ring; the audio
//! thread drains them at the start of each block, so a transition takes
//! effect exactly on a callback boundary and never interrupts a frame
//! mid-processing.
//!
//! Commands stay pointer-small: large payloads travel as `Arc` (the loaded
//! track, shared with the control side) or `Box` (the effect parameter
//! set). The rtrb ring is fixed-size and wait-free on both ends — a push
//! is ~50ns and never blocks the UI, a pop is ~50ns and never blocks
//! audio.

use std::sync::Arc;

use crate::audio_file::LoadedTrack;
use crate::config::RecordingConfig;
use crate::effect::EffectParams;

/// Commands sent from the control thread to the audio thread
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Track Management
    // ─────────────────────────────────────────────────────────────
    /// Load a decoded backing track.
    ///
    /// `Arc` because the control side keeps its own clone for preview and
    /// synthesis — which also guarantees the audio thread never holds the
    /// last reference, so buffer frees never happen in the callback.
    LoadTrack { track: Arc<LoadedTrack> },
    /// Drop the loaded track
    UnloadTrack,

    // ─────────────────────────────────────────────────────────────
    // Playback Control
    // ─────────────────────────────────────────────────────────────
    Play,
    Pause,
    Stop,
    /// Seek the backing track to a time in seconds
    Seek { seconds: f64 },

    // ─────────────────────────────────────────────────────────────
    // Recording Control
    // ─────────────────────────────────────────────────────────────
    /// Arm recording (starts playback if stopped)
    StartRecording,
    /// Discard mic frames but keep the backing track playing
    PauseRecording,
    /// Re-arm capture at the current playback time
    ResumeRecording,
    /// Stop capturing; playback continues
    StopRecording,
    /// While recording: close the take, skip ahead, keep recording.
    /// The skipped span becomes an unrecorded filler segment.
    JumpTo { seconds: f64 },
    /// While recording: discard takes at/after the target and re-record
    /// from there
    RewindTo { seconds: f64 },
    /// Enter the finishing flow: capture and playback stop, the control
    /// side synthesizes the output file
    BeginFinish,
    /// Synthesis completed (or failed); return to Idle
    FinishComplete,

    // ─────────────────────────────────────────────────────────────
    // Live Configuration
    // ─────────────────────────────────────────────────────────────
    /// Swap the live effect parameter set (boxed: ~30 floats)
    SetEffectParams { params: Box<EffectParams> },
    /// Microphone input gain
    SetMicGain { gain: f32 },
    /// Ear return on/off (monitor path only, never recorded)
    SetEarReturn { enabled: bool },
    /// Ear return volume
    SetEarReturnVolume { volume: f32 },
    /// Full-track vs bounded-segment recording mode
    SetRecordingConfig { config: RecordingConfig },
}

/// Capacity of the command queue.
///
/// Commands are a few per user gesture; 256 gives generous headroom for
/// slider drags that emit a parameter update per frame.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair).
///
/// The producer side belongs to the control thread, the consumer side to
/// the audio thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::Play).unwrap();
        tx.push(EngineCommand::Seek { seconds: 12.5 }).unwrap();

        assert!(matches!(rx.pop().unwrap(), EngineCommand::Play));
        match rx.pop().unwrap() {
            EngineCommand::Seek { seconds } => assert_eq!(seconds, 12.5),
            _ => panic!("wrong command order"),
        }
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Keep EngineCommand within a cache line for the lock-free ring.
        // The largest variant is SetRecordingConfig (mode + flags).
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 40, "EngineCommand is {} bytes, expected <= 40", size);
    }
}
