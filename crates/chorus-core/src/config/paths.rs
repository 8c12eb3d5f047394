//! Path utilities for the Chorus library and configuration files

use std::path::PathBuf;

/// Get the default library path: `~/Music/chorus-library`
pub fn default_library_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("chorus-library")
}

/// Get the default config file path for a given file name.
///
/// Returns: `~/Music/chorus-library/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_library_path().join(filename)
}

/// Directory where finished karaoke takes are written
pub fn recordings_dir() -> PathBuf {
    default_library_path().join("recordings")
}

/// Default output path for a finished take, stamped with the local time.
///
/// Example: `~/Music/chorus-library/recordings/take-20260807-213045.wav`
pub fn default_recording_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    recordings_dir().join(format!("take-{}.wav", stamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_path_ends_with_chorus_library() {
        let path = default_library_path();
        assert!(path.ends_with("chorus-library"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("engine.yaml");
        assert!(path.ends_with("engine.yaml"));
    }

    #[test]
    fn test_recording_path_is_wav() {
        let path = default_recording_path();
        assert_eq!(path.extension().unwrap(), "wav");
        assert!(path.starts_with(recordings_dir()));
    }
}
