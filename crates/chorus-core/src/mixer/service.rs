//! Background mix service
//!
//! The file-based mix is a single-shot asynchronous operation: the caller
//! gets a progress receiver immediately, the work happens on a small
//! long-lived thread pool, and completion (or failure, with a retryable
//! flag) arrives as the final message. Decode and encode never touch the
//! real-time thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Instant;

use crate::types::PcmSpec;

/// A single mix job
#[derive(Debug, Clone)]
pub struct MixRequest {
    /// Raw interleaved vocal PCM at `spec`
    pub vocal_path: PathBuf,
    /// Backing track (any supported container, already at `spec`'s format)
    pub bgm_path: PathBuf,
    /// Output WAV path
    pub output_path: PathBuf,
    /// Vocal gain (0.0 - 1.0 typical)
    pub vocal_gain: f32,
    /// Backing track gain (0.0 - 1.0 typical)
    pub bgm_gain: f32,
    /// Shared pipeline spec
    pub spec: PcmSpec,
}

/// Progress messages delivered over the receiver
#[derive(Debug, Clone)]
pub enum MixProgress {
    /// Work has started on the pool
    Started,
    /// The output file was written
    Complete {
        output_path: PathBuf,
        duration: std::time::Duration,
    },
    /// The mix failed. `retryable` means the inputs were fine and the
    /// same request may succeed again (e.g. the output path was busy).
    Failed { error: String, retryable: bool },
    /// The job was cancelled before completion
    Cancelled,
}

/// Thread pool service for offline mixing.
///
/// Create once at startup and reuse; the pool is not per-job.
pub struct MixService {
    thread_pool: rayon::ThreadPool,
    cancel_flag: Arc<AtomicBool>,
}

impl MixService {
    pub fn new() -> Self {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|i| format!("chorus-mix-{}", i))
            .build()
            .expect("Failed to create mix thread pool");

        Self {
            thread_pool,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a mix job. Returns the progress receiver; poll it for the
    /// terminal `Complete` / `Failed` / `Cancelled` message.
    pub fn start_mix(&self, request: MixRequest) -> Receiver<MixProgress> {
        self.cancel_flag.store(false, Ordering::SeqCst);

        let (progress_tx, progress_rx) = channel();
        let cancel_flag = self.cancel_flag.clone();

        self.thread_pool.spawn(move || {
            let start_time = Instant::now();
            let _ = progress_tx.send(MixProgress::Started);

            if cancel_flag.load(Ordering::Relaxed) {
                let _ = progress_tx.send(MixProgress::Cancelled);
                return;
            }

            let result = super::mix_files(
                &request.vocal_path,
                &request.bgm_path,
                &request.output_path,
                request.vocal_gain,
                request.bgm_gain,
                request.spec,
            );

            if cancel_flag.load(Ordering::Relaxed) {
                let _ = progress_tx.send(MixProgress::Cancelled);
                return;
            }

            match result {
                Ok(()) => {
                    let _ = progress_tx.send(MixProgress::Complete {
                        output_path: request.output_path,
                        duration: start_time.elapsed(),
                    });
                }
                Err(e) => {
                    log::error!("Mix failed: {}", e);
                    let _ = progress_tx.send(MixProgress::Failed {
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        });

        progress_rx
    }

    /// Synthesize an edited segment timeline over its backing track and
    /// write the result as a WAV — the `finish_recording` work item.
    ///
    /// The timeline travels by value (a clone), so a failed synthesis
    /// cannot have touched the engine's own timeline and the finish is
    /// always safe to retry.
    pub fn start_render(
        &self,
        bgm: Arc<crate::audio_file::LoadedTrack>,
        timeline: crate::engine::timeline::SegmentTimeline,
        vocal_gain: f32,
        bgm_gain: f32,
        output_path: PathBuf,
    ) -> Receiver<MixProgress> {
        self.cancel_flag.store(false, Ordering::SeqCst);

        let (progress_tx, progress_rx) = channel();
        let cancel_flag = self.cancel_flag.clone();

        self.thread_pool.spawn(move || {
            let start_time = Instant::now();
            let _ = progress_tx.send(MixProgress::Started);

            let mixed = super::render_timeline(&bgm.samples, &timeline, vocal_gain, bgm_gain, None);

            if cancel_flag.load(Ordering::Relaxed) {
                let _ = progress_tx.send(MixProgress::Cancelled);
                return;
            }

            match crate::audio_file::write_wav_i16(&output_path, &mixed, &bgm.spec) {
                Ok(()) => {
                    log::info!(
                        "Finished take written to {:?} ({:.1}s)",
                        output_path,
                        mixed.duration_seconds(&bgm.spec)
                    );
                    let _ = progress_tx.send(MixProgress::Complete {
                        output_path,
                        duration: start_time.elapsed(),
                    });
                }
                Err(e) => {
                    log::error!("Failed to write finished take: {}", e);
                    let _ = progress_tx.send(MixProgress::Failed {
                        error: e.to_string(),
                        retryable: true,
                    });
                }
            }
        });

        progress_rx
    }

    /// Cancel the current job; the worker stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }
}

impl Default for MixService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file;
    use crate::types::PcmBuffer;
    use std::time::Duration;

    #[test]
    fn test_missing_inputs_report_failure() {
        let service = MixService::new();
        let dir = tempfile::tempdir().unwrap();

        let rx = service.start_mix(MixRequest {
            vocal_path: PathBuf::from("/nonexistent/vocal.pcm"),
            bgm_path: PathBuf::from("/nonexistent/bgm.mp3"),
            output_path: dir.path().join("mix.wav"),
            vocal_gain: 1.0,
            bgm_gain: 1.0,
            spec: PcmSpec::default(),
        });

        let mut failed = false;
        while let Ok(msg) = rx.recv_timeout(Duration::from_secs(5)) {
            if let MixProgress::Failed { retryable, .. } = msg {
                failed = true;
                assert!(!retryable, "missing input is not retryable");
                break;
            }
        }
        assert!(failed, "expected a Failed message");
    }

    #[test]
    fn test_raw_vocal_is_read_back() {
        // The service path is exercised end-to-end by the engine tests;
        // here just confirm the vocal leg of the request format.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocal.pcm");
        let spec = PcmSpec::default();

        let vocal = PcmBuffer::from_vec(vec![0.5; 64]);
        audio_file::write_pcm_file(&path, &vocal, &spec).unwrap();
        let back = audio_file::read_pcm_file(&path, &spec).unwrap();
        assert_eq!(back.len(), 64);
    }
}
