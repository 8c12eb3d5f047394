//! CPAL duplex backend
//!
//! Two streams shuttle audio around the engine pair:
//!
//! ```text
//! ┌──────────────────┐   mic ring (SPSC)   ┌─────────────────────┐
//! │  Input callback  │────────────────────►│  Output callback    │
//! │  (mic capture)   │                     │  (owns RtEngine)    │
//! └──────────────────┘                     └──────────┬──────────┘
//!                                                     │ capture/event rings
//!                     ┌──────────────────┐            ▼
//!                     │  Control thread  │◄──  KaraokeEngine.poll()
//!                     └──────────────────┘
//! ```
//!
//! The output callback is the real-time thread: it drains the mic ring
//! (padding underruns with silence so capture never desynchronizes from
//! playback), runs `RtEngine::process`, and fans the engine's frames out
//! to the device channels. Stream error callbacks only set the monitor's
//! device-fault flag — the RT loop parks recording at the next block.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use crate::engine::{EngineMonitor, KaraokeEngine, RtEngine};
use crate::types::PcmSpec;

use super::backend::{AudioHandle, AudioSystemResult};
use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};

/// Mic ring capacity: a few blocks of slack between the callbacks
const MIC_RING_CAPACITY: usize = MAX_BUFFER_SIZE * 8;

/// Start the duplex audio system.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let host = cpal::default_host();

    let output_device = match &config.output_device {
        Some(name) => find_device(&host, name, false)?,
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("output".into()))?,
    };
    let input_device = match &config.input_device {
        Some(name) => find_device(&host, name, true)?,
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("input".into()))?,
    };

    log::info!(
        "Audio devices: out={:?}, in={:?}",
        output_device.name().unwrap_or_else(|_| "Unknown".into()),
        input_device.name().unwrap_or_else(|_| "Unknown".into()),
    );

    let target_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let (output_config, buffer_size) = pick_config(&output_device, target_rate, config, false)?;
    let (input_config, _) = pick_config(&input_device, output_config.sample_rate.0, config, true)?;

    if input_config.sample_rate != output_config.sample_rate {
        return Err(AudioError::ConfigError(format!(
            "input rate {}Hz != output rate {}Hz; per-stream resampling is not supported",
            input_config.sample_rate.0, output_config.sample_rate.0
        )));
    }

    let sample_rate = output_config.sample_rate.0;
    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: {}Hz, {} frames (~{:.1}ms latency)",
        sample_rate,
        buffer_size,
        latency_ms
    );

    // The karaoke pipeline runs mono at the device rate; the callbacks
    // adapt between engine frames and device channel layouts.
    let spec = PcmSpec::new(sample_rate, 1);
    let (engine, rt) = KaraokeEngine::new(spec);
    let monitor = engine.monitor();

    let (mic_tx, mic_rx) = rtrb::RingBuffer::<f32>::new(MIC_RING_CAPACITY);

    let input_stream = build_input_stream(
        &input_device,
        &input_config,
        mic_tx,
        Arc::clone(&monitor),
    )?;
    let output_stream = build_output_stream(
        &output_device,
        &output_config,
        rt,
        mic_rx,
        Arc::clone(&monitor),
    )?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("input: {}", e)))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("output: {}", e)))?;

    log::info!("Audio streams started (duplex)");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _input_stream: input_stream,
            _output_stream: output_stream,
            sample_rate,
            buffer_size,
        },
        engine,
        monitor,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Input callback: fold the device frame to mono and push into the ring.
fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mic_tx: rtrb::Producer<f32>,
    monitor: Arc<EngineMonitor>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks_exact(channels) {
                    let mono = frame.iter().sum::<f32>() / channels as f32;
                    // Ring full: the output stream stalled; drop the frame
                    let _ = mic_tx.push(mono);
                }
            },
            move |err| {
                log::error!("Input stream error: {}", err);
                monitor.set_device_fault();
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("input: {}", e)))?;

    Ok(stream)
}

/// Output callback: the real-time thread. Owns the `RtEngine`.
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut rt: RtEngine,
    mut mic_rx: rtrb::Consumer<f32>,
    monitor: Arc<EngineMonitor>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    // Pre-allocated engine-side blocks (mono)
    let mut mic_block = vec![0.0f32; MAX_BUFFER_SIZE];
    let mut out_block = vec![0.0f32; MAX_BUFFER_SIZE];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = (data.len() / channels).min(MAX_BUFFER_SIZE);

                // Pull mic samples; pad underruns with silence so the
                // capture stream never desynchronizes from playback
                for m in mic_block[..n_frames].iter_mut() {
                    *m = mic_rx.pop().unwrap_or(0.0);
                }

                rt.process(&mic_block[..n_frames], &mut out_block[..n_frames]);

                // Duplicate the mono engine frame across device channels;
                // anything past the engine block stays silent
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let sample = if i < n_frames { out_block[i] } else { 0.0 };
                    for ch in frame.iter_mut() {
                        *ch = sample;
                    }
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
                monitor.set_device_fault();
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("output: {}", e)))?;

    Ok(stream)
}

/// Find a device by name among the host's input or output devices.
fn find_device(host: &cpal::Host, name: &str, input: bool) -> AudioResult<cpal::Device> {
    let devices = if input {
        host.input_devices()
    } else {
        host.output_devices()
    }
    .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Pick an f32 stream configuration near the target rate.
fn pick_config(
    device: &cpal::Device,
    target_rate: u32,
    config: &AudioConfig,
    input: bool,
) -> AudioResult<(StreamConfig, u32)> {
    let supported: Vec<_> = if input {
        device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect()
    } else {
        device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect()
    };

    if supported.is_empty() {
        return Err(AudioError::ConfigError(
            "no supported stream configurations".into(),
        ));
    }

    let best = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| {
            supported
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| AudioError::UnsupportedFormat("no f32 configuration".into()))?;

    let sample_rate =
        if target_rate >= best.min_sample_rate().0 && target_rate <= best.max_sample_rate().0 {
            cpal::SampleRate(target_rate)
        } else {
            let fallback = best.max_sample_rate();
            log::warn!(
                "Device doesn't support {}Hz, falling back to {}Hz",
                target_rate,
                fallback.0
            );
            fallback
        };

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };

    Ok((
        StreamConfig {
            channels: best.channels(),
            sample_rate,
            buffer_size: CpalBufferSize::Fixed(buffer_size),
        },
        buffer_size,
    ))
}

/// Device names for UI dropdowns.
pub fn device_names(input: bool) -> Vec<String> {
    let host = cpal::default_host();
    let devices = if input {
        host.input_devices()
    } else {
        host.output_devices()
    };
    match devices {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate audio devices: {}", e);
            Vec::new()
        }
    }
}
