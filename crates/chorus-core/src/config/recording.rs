//! Recording mode configuration: full track vs bounded segment
//!
//! In segment mode the user picks a start/end window (typically from the
//! lyrics view) and the engine only captures microphone audio while the
//! backing track is inside that window. An optional countdown announces
//! the approach of the window so the singer can come in on time.

use serde::{Deserialize, Serialize};

/// Seconds of countdown emitted before a bounded segment begins
pub const COUNTDOWN_SECONDS: u32 = 3;

/// Recording mode
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RecordingMode {
    /// Capture over the whole backing track
    #[default]
    Full,
    /// Capture only inside a `[start, end)` window (seconds)
    Segment { start: f64, end: f64 },
}

/// Recording configuration applied by the UI layer and consulted by the
/// real-time engine at every block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub mode: RecordingMode,
    /// Emit countdown ticks in the seconds leading into a bounded segment
    pub countdown: bool,
}

impl RecordingConfig {
    /// Reset to full-track mode
    pub fn reset_to_full(&mut self) {
        self.mode = RecordingMode::Full;
    }

    /// Switch to segment mode. Start/end are clamped to a sane ordering;
    /// an inverted window is treated as empty rather than rejected.
    pub fn set_segment(&mut self, start: f64, end: f64) {
        let start = start.max(0.0);
        self.mode = RecordingMode::Segment {
            start,
            end: end.max(start),
        };
    }

    /// Whether microphone audio should be captured at playback time `t`
    pub fn should_record_at(&self, t: f64) -> bool {
        match self.mode {
            RecordingMode::Full => true,
            RecordingMode::Segment { start, end } => t >= start && t < end,
        }
    }

    /// Seconds until the bounded segment begins, if `t` is inside the
    /// countdown window. `None` in full mode or outside the window.
    pub fn countdown_remaining(&self, t: f64) -> Option<u32> {
        if !self.countdown {
            return None;
        }
        match self.mode {
            RecordingMode::Full => None,
            RecordingMode::Segment { start, .. } => {
                let lead = start - t;
                if lead > 0.0 && lead <= COUNTDOWN_SECONDS as f64 {
                    Some(lead.ceil() as u32)
                } else {
                    None
                }
            }
        }
    }

    /// Planned capture duration in seconds, or `None` for full-track mode
    /// (full duration depends on the loaded track).
    pub fn recording_duration(&self) -> Option<f64> {
        match self.mode {
            RecordingMode::Full => None,
            RecordingMode::Segment { start, end } => Some(end - start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mode_records_everywhere() {
        let config = RecordingConfig::default();
        assert!(config.should_record_at(0.0));
        assert!(config.should_record_at(1000.0));
        assert_eq!(config.recording_duration(), None);
    }

    #[test]
    fn test_segment_window() {
        let mut config = RecordingConfig::default();
        config.set_segment(30.0, 60.0);

        assert!(!config.should_record_at(29.9));
        assert!(config.should_record_at(30.0));
        assert!(config.should_record_at(59.9));
        assert!(!config.should_record_at(60.0));
        assert_eq!(config.recording_duration(), Some(30.0));
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let mut config = RecordingConfig::default();
        config.set_segment(60.0, 30.0);
        assert_eq!(config.recording_duration(), Some(0.0));
        assert!(!config.should_record_at(45.0));
    }

    #[test]
    fn test_countdown() {
        let mut config = RecordingConfig {
            countdown: true,
            ..Default::default()
        };
        config.set_segment(10.0, 20.0);

        assert_eq!(config.countdown_remaining(6.5), None);
        assert_eq!(config.countdown_remaining(7.5), Some(3));
        assert_eq!(config.countdown_remaining(9.5), Some(1));
        assert_eq!(config.countdown_remaining(10.0), None);

        config.countdown = false;
        assert_eq!(config.countdown_remaining(9.5), None);
    }
}
