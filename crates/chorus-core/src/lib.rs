//! Chorus Core - karaoke recording and synthesis engine
//!
//! The engine behind Chorus's karaoke mode: backing-track playback, live
//! microphone capture through a voice effect chain, a segment-based
//! recording timeline, and the synthesis stage that reassembles an edited
//! timeline into one output file.

pub mod audio;
pub mod audio_file;
pub mod config;
pub mod effect;
pub mod engine;
pub mod mixer;
pub mod transport;
pub mod types;

pub use types::*;
