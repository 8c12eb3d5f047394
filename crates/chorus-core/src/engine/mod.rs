//! Karaoke recording engine
//!
//! - `KaraokeEngine`: control-thread facade (timeline, preview, finish)
//! - `RtEngine`: the audio thread's state machine and processing loop
//! - `SegmentTimeline`: the gapless model of what was recorded
//! - command/event plumbing between the two halves

pub mod command;
#[allow(clippy::module_inception)]
mod engine;
pub mod events;
mod preview;
pub mod rt;
pub mod timeline;

pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::KaraokeEngine;
pub use events::{EngineEvent, EngineMonitor, EngineState, RtEvent, SegmentCloseCause};
pub use rt::RtEngine;
pub use timeline::{Segment, SegmentTimeline, TimelineError};

#[cfg(test)]
mod tests {
    //! End-to-end engine tests: the control half and the real-time half
    //! wired together, with the audio callback driven by hand.

    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::audio_file::LoadedTrack;
    use crate::types::{PcmBuffer, PcmSpec};

    /// A low sample rate keeps the 180-second scenario buffers small
    /// without changing any of the engine logic under test.
    const TEST_RATE: u32 = 1000;
    const BLOCK: usize = 100;

    struct Rig {
        engine: KaraokeEngine,
        rt: RtEngine,
        /// Phase accumulator for the simulated microphone
        mic_phase: f32,
    }

    impl Rig {
        fn new() -> Self {
            let (engine, rt) = KaraokeEngine::new(PcmSpec::new(TEST_RATE, 1));
            Self {
                engine,
                rt,
                mic_phase: 0.0,
            }
        }

        fn load(&mut self, seconds: f64, level: f32) {
            let spec = PcmSpec::new(TEST_RATE, 1);
            let len = spec.seconds_to_samples(seconds) as usize;
            self.engine
                .load_track(LoadedTrack::from_samples(
                    PcmBuffer::from_vec(vec![level; len]),
                    spec,
                ));
        }

        /// Run `blocks` audio callbacks with a continuous sine on the mic
        fn run(&mut self, blocks: usize) {
            let mut mic = [0.0f32; BLOCK];
            let mut out = [0.0f32; BLOCK];
            for _ in 0..blocks {
                for m in mic.iter_mut() {
                    *m = 0.2 * self.mic_phase.sin();
                    self.mic_phase += 2.0 * std::f32::consts::PI * 100.0 / TEST_RATE as f32;
                }
                self.rt.process(&mic, &mut out);
            }
        }

        fn run_and_poll(&mut self, blocks: usize) -> Vec<EngineEvent> {
            self.run(blocks);
            self.engine.poll()
        }

        /// Poll until a RecordingFinished event arrives (the mix worker
        /// runs on its own thread)
        fn wait_finished(&mut self) -> EngineEvent {
            let deadline = Instant::now() + Duration::from_secs(10);
            loop {
                self.run(1);
                for event in self.engine.poll() {
                    if matches!(event, EngineEvent::RecordingFinished { .. }) {
                        return event;
                    }
                }
                assert!(Instant::now() < deadline, "finish never completed");
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    #[test]
    fn test_full_scenario_record_pause_jump_record_finish() {
        // Load a 180.0s backing track; record [0-30s], pause, jump to
        // 60s, record [60-90s], finish. Expect an unrecorded segment
        // [30-60s], a 180.0s output file, and vocal audio only inside
        // the two recorded windows.
        let mut rig = Rig::new();
        rig.load(180.0, 0.1);
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(300); // 30 seconds

        rig.engine.pause_recording();
        rig.run_and_poll(1);

        rig.engine.jump_to(60.0);
        rig.run_and_poll(1);
        rig.engine.resume_recording();
        rig.run_and_poll(300); // 60s..90s

        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let segments = rig.engine.segments();
        assert_eq!(segments.len(), 3, "segments: {:?}", segments.len());

        assert!(segments[0].is_recorded);
        assert_eq!(segments[0].start_samples, 0);
        assert_eq!(segments[0].end_samples, 30_000);

        // The paused+skipped span is one unrecorded filler, no holes.
        // (Recording resumed one block after the seek landed, so the
        // filler runs to 60.1s.)
        assert!(!segments[1].is_recorded, "skipped span must be a filler");
        assert_eq!(segments[1].start_samples, 30_000);
        assert_eq!(segments[1].end_samples, 60_100);

        assert!(segments[2].is_recorded);
        assert_eq!(segments[2].start_samples, 60_100);
        assert_eq!(segments[2].end_samples, 90_100);

        // Finish to a file and verify duration + vocal placement
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("take.wav");
        rig.engine.finish_recording(out_path.clone());
        rig.run_and_poll(1);

        match rig.wait_finished() {
            EngineEvent::RecordingFinished { error: None, .. } => {}
            other => panic!("finish failed: {:?}", other),
        }

        let reader = hound::WavReader::open(&out_path).unwrap();
        let wav_spec = reader.spec();
        assert_eq!(wav_spec.sample_rate, TEST_RATE);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();

        // Final file length equals the backing track's length
        assert_eq!(samples.len(), 180_000);

        let bgm_only = (0.1f32 * i16::MAX as f32) as i16;
        let near = |a: i16, b: i16| (a as i32 - b as i32).abs() < 700;

        // Vocal present inside the recorded windows (sine over bgm)
        let window_peak = samples[1000..29_000].iter().map(|s| s.abs()).max().unwrap();
        assert!(window_peak > bgm_only + 2000, "vocal missing in [0,30s)");

        // Unrecorded filler carries the backing track alone
        for &s in &samples[31_000..59_000] {
            assert!(near(s, bgm_only), "vocal bled into [30s,60s): {}", s);
        }
        // Tail past the last segment is backing track alone
        for &s in &samples[100_000..] {
            assert!(near(s, bgm_only), "vocal bled into the tail: {}", s);
        }
    }

    #[test]
    fn test_rewind_discards_and_rerecords() {
        let mut rig = Rig::new();
        rig.load(10.0, 0.1);
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(20); // record [0, 2.0s)

        rig.engine.rewind_to(1.0);
        rig.run_and_poll(10); // re-record [1.0s, 2.0s)

        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let segments = rig.engine.segments();
        // [0,1.0) truncated take, [1.0,2.0) fresh take
        assert!(segments.len() >= 2);
        assert!(segments[0].is_recorded);
        assert_eq!(segments[0].end_samples, 1000);
        assert!(segments[1].is_recorded);
        assert_eq!(segments[1].start_samples, 1000);
        assert_eq!(segments[1].end_samples, 2000);
        assert!(rig.engine.timeline().check_invariants());
    }

    #[test]
    fn test_delete_segment_keeps_anchoring() {
        let mut rig = Rig::new();
        rig.load(10.0, 0.1);
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(10);
        rig.engine.jump_to(3.0);
        rig.run_and_poll(10);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        // [0,1.0) recorded, [1.0,3.0) filler, [3.0,4.0) recorded
        assert_eq!(rig.engine.segments().len(), 3);

        rig.engine.delete_segment(0).unwrap();
        let segments = rig.engine.segments();

        // First span reverts to unrecorded and merges with the filler;
        // the later take stays anchored at 3.0s.
        assert!(!segments[0].is_recorded);
        let last = segments.last().unwrap();
        assert!(last.is_recorded);
        assert_eq!(last.start_samples, 3000);
    }

    #[test]
    fn test_preview_reflects_pitch_change_after_invalidation() {
        let mut rig = Rig::new();
        rig.load(4.0, 0.0); // silent backing track isolates the vocal
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(20);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let flat = rig.engine.preview_synthesized().expect("preview");

        // Cache hit while nothing changed
        let again = rig.engine.preview_synthesized().expect("preview");
        assert!(Arc::ptr_eq(&flat, &again), "unchanged preview must be cached");

        // Change pitch; set_effect_params invalidates the cache, so the
        // next preview must reflect the new pitch, never the stale buffer
        let mut params = rig.engine.effect_params().clone();
        params.pitch_semitones = 4.0;
        rig.engine.set_effect_params(params);

        let shifted = rig.engine.preview_synthesized().expect("preview");
        assert!(!Arc::ptr_eq(&flat, &shifted));
        assert_ne!(
            flat.as_slice()[..2000],
            shifted.as_slice()[..2000],
            "pitch change must audibly alter the preview"
        );
    }

    #[test]
    fn test_preview_length_matches_backing_track() {
        let mut rig = Rig::new();
        rig.load(5.0, 0.05);
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(10);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let preview = rig.engine.preview_synthesized().unwrap();
        assert_eq!(preview.len(), 5000);
    }

    #[test]
    fn test_failed_finish_is_retryable_and_preserves_timeline() {
        let mut rig = Rig::new();
        rig.load(2.0, 0.1);
        rig.run_and_poll(1);

        rig.engine.start_recording();
        rig.run_and_poll(5);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let segments_before = rig.engine.segments().len();

        // Unwritable output path
        rig.engine
            .finish_recording(std::path::PathBuf::from("/nonexistent/dir/take.wav"));
        rig.run_and_poll(1);

        match rig.wait_finished() {
            EngineEvent::RecordingFinished {
                error: Some(_),
                retryable,
                ..
            } => assert!(retryable, "write failures must be retryable"),
            other => panic!("expected failure, got {:?}", other),
        }

        // The failed synthesis left the timeline untouched
        assert_eq!(rig.engine.segments().len(), segments_before);
        assert!(rig.engine.timeline().check_invariants());

        // And the engine returned to Idle for a retry
        rig.run_and_poll(1);
        assert_eq!(rig.engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_events_reach_subscribers() {
        let mut rig = Rig::new();
        let rx = rig.engine.subscribe();

        rig.load(2.0, 0.1);
        rig.run_and_poll(1);
        rig.engine.start_recording();
        rig.run_and_poll(10);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        let mut saw_segment_change = false;
        let mut saw_level = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                EngineEvent::SegmentListChanged => saw_segment_change = true,
                EngineEvent::MicrophoneLevel { .. } => saw_level = true,
                _ => {}
            }
        }
        assert!(saw_segment_change);
        assert!(saw_level);
    }

    #[test]
    fn test_stamped_params_are_capture_time_params() {
        let mut rig = Rig::new();
        rig.load(4.0, 0.1);
        rig.run_and_poll(1);

        let mut params = crate::effect::EffectParams::default();
        params.pitch_semitones = 2.0;
        rig.engine.set_effect_params(params);

        rig.engine.start_recording();
        rig.run_and_poll(10);
        rig.engine.stop_recording();
        rig.run_and_poll(1);

        // Change live params after the take; the stamp must not move
        let mut later = crate::effect::EffectParams::default();
        later.pitch_semitones = -5.0;
        rig.engine.set_effect_params(later);

        let segment = &rig.engine.segments()[0];
        assert_eq!(segment.applied_params.pitch_semitones, 2.0);
    }
}
