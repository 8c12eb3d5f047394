//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while setting up or running the audio system
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Failed to get a default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found by name
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get a device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build an audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start a stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
