//! Karaoke engine - control-thread facade
//!
//! `KaraokeEngine` is the half of the engine the application talks to. It
//! owns everything that may allocate or block: the segment timeline, the
//! preview cache, the background mix service, and the decoded track. The
//! real-time half ([`RtEngine`](super::rt::RtEngine)) is created alongside
//! it and moved into the audio callback; the two communicate exclusively
//! over lock-free rings.
//!
//! Call `poll()` from the application tick: it drains captured audio into
//! the timeline, turns real-time events into public `EngineEvent`s, and
//! completes any pending finish job.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

use crate::audio_file::{self, AudioFileError, LoadedTrack};
use crate::config::RecordingConfig;
use crate::effect::{EffectParams, EffectPreset, VoiceEffectChain};
use crate::engine::command::{command_channel, EngineCommand};
use crate::engine::events::{EngineEvent, EngineMonitor, EngineState, RtEvent, SegmentCloseCause};
use crate::engine::preview::{PreviewCache, PreviewKey};
use crate::engine::rt::{RtEngine, CAPTURE_RING_CAPACITY, EVENT_RING_CAPACITY};
use crate::engine::timeline::{Segment, SegmentTimeline, TimelineError};
use crate::mixer::{self, MixProgress, MixService};
use crate::types::{PcmBuffer, PcmSpec};

/// Effect configuration and mic gain captured when a segment opened
struct OpenStamp {
    params: EffectParams,
    mic_gain: f32,
}

pub struct KaraokeEngine {
    spec: PcmSpec,

    command_tx: rtrb::Producer<EngineCommand>,
    event_rx: rtrb::Consumer<RtEvent>,
    capture_rx: rtrb::Consumer<f32>,
    monitor: Arc<EngineMonitor>,

    timeline: SegmentTimeline,
    /// Bumped on every timeline mutation; part of the preview cache key
    timeline_rev: u64,
    track: Option<Arc<LoadedTrack>>,

    live_params: EffectParams,
    mic_gain: f32,
    vocal_gain: f32,
    bgm_gain: f32,
    recording_config: RecordingConfig,

    preview: PreviewCache,
    mix_service: MixService,
    /// Finish flow: requested path until the RT side reaches Finishing,
    /// then the running render job
    finish_requested: Option<PathBuf>,
    finish_job: Option<(PathBuf, Receiver<MixProgress>)>,

    /// Captured samples popped from the ring but not yet cut into segments
    capture_pending: Vec<f32>,
    open_stamp: Option<OpenStamp>,
    /// Events generated by control-side operations, delivered on next poll
    pending_events: Vec<EngineEvent>,
    subscribers: Vec<crossbeam::channel::Sender<EngineEvent>>,
}

impl KaraokeEngine {
    /// Create the engine pair. The returned `RtEngine` must be moved into
    /// the audio callback (or driven manually in tests).
    pub fn new(spec: PcmSpec) -> (Self, RtEngine) {
        let (command_tx, command_rx) = command_channel();
        let (capture_tx, capture_rx) = rtrb::RingBuffer::new(CAPTURE_RING_CAPACITY);
        let (event_tx, event_rx) = rtrb::RingBuffer::new(EVENT_RING_CAPACITY);
        let monitor = Arc::new(EngineMonitor::new());

        let rt = RtEngine::new(
            spec,
            command_rx,
            capture_tx,
            event_tx,
            Arc::clone(&monitor),
        );

        let engine = Self {
            spec,
            command_tx,
            event_rx,
            capture_rx,
            monitor,
            timeline: SegmentTimeline::new(spec),
            timeline_rev: 0,
            track: None,
            live_params: EffectParams::default(),
            mic_gain: 1.0,
            vocal_gain: 1.0,
            bgm_gain: 1.0,
            recording_config: RecordingConfig::default(),
            preview: PreviewCache::new(),
            mix_service: MixService::new(),
            finish_requested: None,
            finish_job: None,
            capture_pending: Vec::new(),
            open_stamp: None,
            pending_events: Vec::new(),
            subscribers: Vec::new(),
        };

        (engine, rt)
    }

    fn send(&mut self, command: EngineCommand) {
        if self.command_tx.push(command).is_err() {
            log::error!("engine command queue full; command dropped");
        }
    }

    fn timeline_changed(&mut self) {
        self.timeline_rev += 1;
        self.preview.invalidate();
        self.pending_events.push(EngineEvent::SegmentListChanged);
    }

    // ─────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────

    /// Lock-free monitoring handle (clonable, safe from any thread)
    pub fn monitor(&self) -> Arc<EngineMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Engine state as last published by the audio thread
    pub fn state(&self) -> EngineState {
        self.monitor.state()
    }

    /// Advisory playback position in seconds (torn/stale reads tolerated)
    pub fn position_seconds(&self) -> f64 {
        self.spec.samples_to_seconds(self.monitor.position_samples())
    }

    pub fn track(&self) -> Option<&Arc<LoadedTrack>> {
        self.track.as_ref()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map(|t| t.duration_seconds()).unwrap_or(0.0)
    }

    pub fn segments(&self) -> &[Segment] {
        self.timeline.segments()
    }

    pub fn timeline(&self) -> &SegmentTimeline {
        &self.timeline
    }

    pub fn effect_params(&self) -> &EffectParams {
        &self.live_params
    }

    /// Subscribe to engine events. Every event returned by `poll` is also
    /// fanned out to all live subscribers.
    pub fn subscribe(&mut self) -> crossbeam::channel::Receiver<EngineEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    // ─────────────────────────────────────────────────────────────
    // Track loading and playback
    // ─────────────────────────────────────────────────────────────

    /// Decode a backing track and load it. Clears the segment timeline.
    pub fn load_file(&mut self, path: &Path) -> Result<Arc<LoadedTrack>, AudioFileError> {
        let track = audio_file::load_track(path, self.spec)?;
        self.load_track(Arc::clone(&track));
        Ok(track)
    }

    /// Load an already-decoded track (preview fixtures, tests)
    pub fn load_track(&mut self, track: Arc<LoadedTrack>) {
        self.track = Some(Arc::clone(&track));
        self.timeline.clear_all();
        self.timeline_changed();
        self.send(EngineCommand::LoadTrack { track });
    }

    pub fn play(&mut self) {
        self.send(EngineCommand::Play);
    }

    pub fn pause(&mut self) {
        self.send(EngineCommand::Pause);
    }

    pub fn stop(&mut self) {
        self.send(EngineCommand::Stop);
    }

    pub fn seek(&mut self, seconds: f64) {
        self.send(EngineCommand::Seek { seconds });
    }

    // ─────────────────────────────────────────────────────────────
    // Live configuration
    // ─────────────────────────────────────────────────────────────

    /// Select a named preset (expands into the full parameter set)
    pub fn set_effect_preset(&mut self, preset: EffectPreset) {
        self.set_effect_params(EffectParams::from_preset(preset));
    }

    /// Replace the live effect parameters. Invalidate-then-configure:
    /// the preview cache is keyed by these, so a stale buffer can never
    /// be served afterwards.
    pub fn set_effect_params(&mut self, mut params: EffectParams) {
        params.clamp();
        self.live_params = params.clone();
        self.preview.invalidate();
        self.send(EngineCommand::SetEffectParams {
            params: Box::new(params),
        });
    }

    pub fn set_mic_gain(&mut self, gain: f32) {
        self.mic_gain = gain.clamp(0.0, 4.0);
        self.send(EngineCommand::SetMicGain { gain: self.mic_gain });
    }

    pub fn set_ear_return_enabled(&mut self, enabled: bool) {
        self.send(EngineCommand::SetEarReturn { enabled });
    }

    pub fn set_ear_return_volume(&mut self, volume: f32) {
        self.send(EngineCommand::SetEarReturnVolume { volume });
    }

    /// Gains used by both preview and the finished mix
    pub fn set_mix_gains(&mut self, vocal_gain: f32, bgm_gain: f32) {
        self.vocal_gain = vocal_gain.clamp(0.0, 2.0);
        self.bgm_gain = bgm_gain.clamp(0.0, 2.0);
        self.preview.invalidate();
    }

    pub fn set_recording_config(&mut self, config: RecordingConfig) {
        self.recording_config = config;
        self.send(EngineCommand::SetRecordingConfig { config });
    }

    pub fn recording_config(&self) -> &RecordingConfig {
        &self.recording_config
    }

    // ─────────────────────────────────────────────────────────────
    // Recording
    // ─────────────────────────────────────────────────────────────

    pub fn start_recording(&mut self) {
        self.send(EngineCommand::StartRecording);
    }

    pub fn pause_recording(&mut self) {
        self.send(EngineCommand::PauseRecording);
    }

    pub fn resume_recording(&mut self) {
        self.send(EngineCommand::ResumeRecording);
    }

    pub fn stop_recording(&mut self) {
        self.send(EngineCommand::StopRecording);
    }

    /// Skip ahead. While recording, the real-time side closes the open
    /// take first and the skipped span becomes a filler when its close
    /// event is processed; otherwise the filler is inserted here.
    pub fn jump_to(&mut self, seconds: f64) {
        if self.state() == EngineState::Recording {
            self.send(EngineCommand::JumpTo { seconds });
        } else {
            let target = self.spec.seconds_to_samples(seconds.max(0.0));
            self.timeline.jump_to(target);
            self.timeline_changed();
            self.send(EngineCommand::Seek { seconds });
        }
    }

    /// Discard everything at/after the target and position there to
    /// re-record.
    pub fn rewind_to(&mut self, seconds: f64) {
        if self.state() == EngineState::Recording {
            self.send(EngineCommand::RewindTo { seconds });
        } else {
            let target = self.spec.seconds_to_samples(seconds.max(0.0));
            self.timeline.rewind_to(target);
            self.timeline_changed();
            self.send(EngineCommand::Seek { seconds });
        }
    }

    /// Convert one segment's span back to unrecorded. Later segments do
    /// not move: their start times are anchored to the backing track.
    pub fn delete_segment(&mut self, index: usize) -> Result<(), TimelineError> {
        self.timeline.delete_segment(index)?;
        self.timeline_changed();
        Ok(())
    }

    pub fn clear_segments(&mut self) {
        self.timeline.clear_all();
        self.timeline_changed();
    }

    /// Begin the finish flow: capture and playback stop, and once the
    /// last segment's close event has been drained the whole timeline is
    /// synthesized over the backing track into `output_path`. Completion
    /// arrives as `EngineEvent::RecordingFinished`; a failed synthesis
    /// leaves the timeline untouched, so retrying is always safe.
    pub fn finish_recording(&mut self, output_path: PathBuf) {
        if self.track.is_none() {
            self.pending_events.push(EngineEvent::Error {
                message: "finish_recording without a loaded track".into(),
            });
            return;
        }
        if self.finish_requested.is_some() || self.finish_job.is_some() {
            log::warn!("finish_recording ignored: a finish is already in flight");
            return;
        }
        self.finish_requested = Some(output_path);
        self.send(EngineCommand::BeginFinish);
    }

    // ─────────────────────────────────────────────────────────────
    // Preview
    // ─────────────────────────────────────────────────────────────

    /// Synthesize the current timeline in memory with the live effect
    /// configuration. Cached until a parameter, gain, or the timeline
    /// changes.
    pub fn preview_synthesized(&mut self) -> Option<Arc<PcmBuffer>> {
        let params = self.live_params.clone();
        self.preview_with_params(params)
    }

    /// Synthesize a preview with an explicit parameter set (auditioning a
    /// change without committing it to the live configuration).
    pub fn preview_with_params(&mut self, mut params: EffectParams) -> Option<Arc<PcmBuffer>> {
        let track = self.track.as_ref()?;
        params.clamp();

        let key = PreviewKey {
            params: params.clone(),
            vocal_gain: self.vocal_gain,
            bgm_gain: self.bgm_gain,
            timeline_rev: self.timeline_rev,
        };
        if let Some(cached) = self.preview.get(&key) {
            return Some(cached);
        }

        // Sweetening chain: the tonal subset of the requested parameters,
        // layered over the already-processed vocals
        let mut chain = VoiceEffectChain::new(self.spec);
        chain.configure(&params.sweetening());

        let buffer = mixer::render_timeline(
            &track.samples,
            &self.timeline,
            self.vocal_gain,
            self.bgm_gain,
            Some(&mut chain),
        );

        let buffer = Arc::new(buffer);
        self.preview.insert(key, Arc::clone(&buffer));
        Some(buffer)
    }

    /// Drop any cached preview. Call whenever an input the cache key
    /// doesn't cover changes underneath it.
    pub fn invalidate_preview_cache(&mut self) {
        self.preview.invalidate();
    }

    // ─────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────

    /// Drain captured audio and real-time events. Returns the public
    /// events produced since the last call (also fanned out to
    /// subscribers). Call regularly from the application tick.
    pub fn poll(&mut self) -> Vec<EngineEvent> {
        let mut events = std::mem::take(&mut self.pending_events);

        // 1. Captured samples first: any segment-close event already in
        // the event ring had its samples pushed before it, so they are
        // guaranteed to be here by the time we see the event.
        while let Ok(sample) = self.capture_rx.pop() {
            self.capture_pending.push(sample);
        }

        // 2. Real-time events
        while let Ok(event) = self.event_rx.pop() {
            match event {
                RtEvent::SegmentOpened { .. } => {
                    self.open_stamp = Some(OpenStamp {
                        params: self.live_params.clone(),
                        mic_gain: self.mic_gain,
                    });
                }
                RtEvent::SegmentClosed {
                    start_samples,
                    end_samples,
                    pushed_samples,
                    cause,
                } => {
                    self.handle_segment_closed(
                        start_samples,
                        end_samples,
                        pushed_samples,
                        cause,
                        &mut events,
                    );
                }
                RtEvent::PlaybackFinished => events.push(EngineEvent::PlaybackFinished),
                RtEvent::CountdownTick { seconds_remaining } => {
                    events.push(EngineEvent::CountdownTick { seconds_remaining })
                }
                RtEvent::LevelUpdate { rms, peak } => {
                    events.push(EngineEvent::MicrophoneLevel { rms, peak })
                }
            }
        }
        events.extend(std::mem::take(&mut self.pending_events));

        // 3. Launch the finish render once the RT side has wound down —
        // its segment-close event was drained above, so the timeline
        // clone below is complete.
        if let Some(path) = self.finish_requested.take() {
            if self.state() == EngineState::Finishing {
                let track = self
                    .track
                    .as_ref()
                    .expect("finish_requested implies a loaded track");
                let rx = self.mix_service.start_render(
                    Arc::clone(track),
                    self.timeline.clone(),
                    self.vocal_gain,
                    self.bgm_gain,
                    path.clone(),
                );
                self.finish_job = Some((path, rx));
            } else {
                // RT hasn't reached Finishing yet; try again next poll
                self.finish_requested = Some(path);
            }
        }

        // 4. Pending finish job completion
        if let Some((path, rx)) = self.finish_job.take() {
            let mut still_running = false;
            loop {
                match rx.try_recv() {
                    Ok(MixProgress::Complete { output_path, .. }) => {
                        self.send(EngineCommand::FinishComplete);
                        events.push(EngineEvent::RecordingFinished {
                            output_path,
                            error: None,
                            retryable: false,
                        });
                        break;
                    }
                    Ok(MixProgress::Failed { error, retryable }) => {
                        self.send(EngineCommand::FinishComplete);
                        events.push(EngineEvent::RecordingFinished {
                            output_path: path.clone(),
                            error: Some(error),
                            retryable,
                        });
                        break;
                    }
                    Ok(MixProgress::Cancelled) => {
                        self.send(EngineCommand::FinishComplete);
                        break;
                    }
                    Ok(MixProgress::Started) => continue,
                    Err(TryRecvError::Empty) => {
                        still_running = true;
                        break;
                    }
                    Err(TryRecvError::Disconnected) => {
                        self.send(EngineCommand::FinishComplete);
                        events.push(EngineEvent::RecordingFinished {
                            output_path: path.clone(),
                            error: Some("mix worker disappeared".into()),
                            retryable: true,
                        });
                        break;
                    }
                }
            }
            if still_running {
                self.finish_job = Some((path, rx));
            }
        }

        // 5. Fan out to subscribers, dropping any that hung up
        if !self.subscribers.is_empty() {
            for event in &events {
                self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }

        events
    }

    fn handle_segment_closed(
        &mut self,
        start_samples: u64,
        end_samples: u64,
        pushed_samples: u64,
        cause: SegmentCloseCause,
        events: &mut Vec<EngineEvent>,
    ) {
        // The close event was pushed after the segment's last sample, so
        // any samples not drained yet are sitting in the ring right now.
        while (self.capture_pending.len() as u64) < pushed_samples {
            match self.capture_rx.pop() {
                Ok(sample) => self.capture_pending.push(sample),
                Err(_) => break,
            }
        }

        let span = (end_samples - start_samples) as usize;
        let take = (pushed_samples as usize).min(self.capture_pending.len());
        let mut vocal: Vec<f32> = self.capture_pending.drain(..take).collect();

        if vocal.len() < span {
            // Capture ring overflow shortfall: pad so the partition
            // invariant (span length == vocal length) still holds
            log::warn!(
                "segment [{}..{}) captured {} of {} samples; padding",
                start_samples,
                end_samples,
                vocal.len(),
                span
            );
            vocal.resize(span, 0.0);
        } else if vocal.len() > span {
            vocal.truncate(span);
        }

        let stamp = self.open_stamp.take().unwrap_or_else(|| OpenStamp {
            params: self.live_params.clone(),
            mic_gain: self.mic_gain,
        });

        if span > 0 {
            if let Err(e) = self.timeline.append_recorded(
                PcmBuffer::from_vec(vocal),
                start_samples,
                stamp.params,
                stamp.mic_gain,
            ) {
                // Internal-consistency failure: logged, not user-facing
                log::error!("dropping captured segment: {}", e);
            }
        }

        match cause {
            SegmentCloseCause::Jump { target_samples } => {
                self.timeline.jump_to(target_samples);
            }
            SegmentCloseCause::Rewind { target_samples } => {
                self.timeline.rewind_to(target_samples);
            }
            SegmentCloseCause::Paused => {
                events.push(EngineEvent::RecordingPaused { automatic: false });
            }
            SegmentCloseCause::DeviceFault => {
                events.push(EngineEvent::RecordingPaused { automatic: true });
                events.push(EngineEvent::Error {
                    message: "audio device fault; recording paused".into(),
                });
            }
            _ => {}
        }

        self.timeline_changed();
        events.extend(std::mem::take(&mut self.pending_events));
    }
}
