//! Audio I/O backend
//!
//! Duplex cpal streams wiring the platform's microphone and speakers to
//! the engine pair. See `backend::start_audio_system`.

pub mod backend;
pub mod config;
mod cpal_backend;
pub mod error;

pub use backend::{
    available_input_devices, available_output_devices, start_audio_system, AudioHandle,
    AudioSystemResult,
};
pub use config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
pub use error::{AudioError, AudioResult};
