//! Audio backend configuration

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames).
/// 512 frames (~10.7ms at 48kHz) keeps ear-return latency tolerable while
/// staying safe on consumer hardware.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for the karaoke pipeline (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Frames to request, or `None` for the system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Configuration for the duplex audio system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Microphone device name (None = system default input)
    pub input_device: Option<String>,
    /// Playback device name (None = system default output)
    pub output_device: Option<String>,
    /// Preferred buffer size
    pub buffer_size: BufferSize,
    /// Preferred sample rate (None = `DEFAULT_SAMPLE_RATE`)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Set the microphone device
    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    /// Set the playback device
    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    /// Request a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.as_frames(), None);
        assert_eq!(BufferSize::Fixed(256).as_frames(), Some(256));
    }

    #[test]
    fn test_config_builder() {
        let config = AudioConfig::default()
            .with_input_device("USB Mic")
            .with_buffer_frames(256)
            .with_sample_rate(44100);

        assert_eq!(config.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(config.buffer_size, BufferSize::Fixed(256));
        assert_eq!(config.sample_rate, Some(44100));
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = AudioConfig::default().with_output_device("Speakers");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.output_device.as_deref(), Some("Speakers"));
    }
}
