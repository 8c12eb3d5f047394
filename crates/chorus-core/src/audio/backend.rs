//! Audio backend facade
//!
//! `start_audio_system` wires the engine pair to the platform's duplex
//! audio streams and hands the control half back to the caller:
//! - the control thread talks to `KaraokeEngine`
//! - the audio thread owns the `RtEngine` inside the output callback
//! - the UI reads position/levels through `EngineMonitor` atomics
//!
//! Dropping the returned `AudioHandle` stops both streams.

use std::sync::Arc;

use crate::engine::{EngineMonitor, KaraokeEngine};

use super::config::AudioConfig;
use super::error::AudioResult;

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Keeps the streams alive; drop to stop audio
    pub handle: AudioHandle,
    /// The control-thread engine facade
    pub engine: KaraokeEngine,
    /// Lock-free monitoring handle (same one `engine.monitor()` returns)
    pub monitor: Arc<EngineMonitor>,
    /// Negotiated sample rate
    pub sample_rate: u32,
    /// Negotiated buffer size in frames
    pub buffer_size: u32,
    /// One-way output latency in milliseconds
    pub latency_ms: f32,
}

/// Handle to the running audio streams
pub struct AudioHandle {
    pub(crate) _input_stream: cpal::Stream,
    pub(crate) _output_stream: cpal::Stream,
    pub(crate) sample_rate: u32,
    pub(crate) buffer_size: u32,
}

impl AudioHandle {
    /// Negotiated sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Start the duplex audio system with the given configuration.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    super::cpal_backend::start_audio_system(config)
}

/// List available input (microphone) device names for UI dropdowns.
pub fn available_input_devices() -> Vec<String> {
    super::cpal_backend::device_names(true)
}

/// List available output device names for UI dropdowns.
pub fn available_output_devices() -> Vec<String> {
    super::cpal_backend::device_names(false)
}
