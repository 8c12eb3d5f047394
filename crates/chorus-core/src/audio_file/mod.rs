//! Audio file handling
//!
//! This module keeps format concerns out of the recording/mixing logic:
//! everything past this boundary exchanges raw interleaved PCM at the
//! engine's `PcmSpec`.
//!
//! - Backing tracks (mp3/m4a/flac/wav) are decoded with symphonia,
//!   resampled to the engine rate with rubato, and downmixed to the
//!   engine channel count.
//! - Captured vocals and finished takes are raw PCM / WAV files.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::types::{PcmBuffer, PcmSpec, Sample};

/// Audio file errors
#[derive(Debug, Clone)]
pub enum AudioFileError {
    /// File not found or couldn't be opened
    IoError(String),
    /// Invalid or unsupported container/codec
    InvalidFormat(String),
    /// The file decoded to no audio at all
    EmptyTrack,
    /// Raw PCM bit depth we don't understand (only 16 and 32 supported)
    UnsupportedBitDepth(u16),
    /// Two streams that must mix sample-by-sample have different specs
    SpecMismatch { expected: PcmSpec, found: PcmSpec },
    /// Resampling to the engine rate failed
    ResampleError(String),
}

impl std::fmt::Display for AudioFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioFileError::IoError(msg) => write!(f, "IO error: {}", msg),
            AudioFileError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AudioFileError::EmptyTrack => write!(f, "File contains no audio"),
            AudioFileError::UnsupportedBitDepth(depth) => {
                write!(f, "Unsupported bit depth: {}", depth)
            }
            AudioFileError::SpecMismatch { expected, found } => write!(
                f,
                "PCM spec mismatch: expected {}Hz/{}ch, found {}Hz/{}ch",
                expected.sample_rate, expected.channels, found.sample_rate, found.channels
            ),
            AudioFileError::ResampleError(msg) => write!(f, "Resample error: {}", msg),
        }
    }
}

impl std::error::Error for AudioFileError {}

/// A backing track decoded and normalized to the engine spec.
///
/// Shared as `Arc<LoadedTrack>` between the control thread (preview and
/// final synthesis) and the real-time player. The control thread always
/// holds a clone, so the last reference can never drop on the audio thread.
#[derive(Debug)]
pub struct LoadedTrack {
    /// Interleaved samples at the engine spec
    pub samples: PcmBuffer,
    /// The spec the samples were normalized to
    pub spec: PcmSpec,
    /// Source file, kept for UI display and the file-based mix path
    pub path: PathBuf,
}

impl LoadedTrack {
    /// Track duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.duration_seconds(&self.spec)
    }

    /// Track length in interleaved samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the track is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Build a track directly from samples (tests and preview fixtures)
    pub fn from_samples(samples: PcmBuffer, spec: PcmSpec) -> Arc<Self> {
        Arc::new(Self {
            samples,
            spec,
            path: PathBuf::new(),
        })
    }
}

/// Decode any supported container to f32 interleaved samples.
///
/// Returns `(samples, sample_rate, channels)` at the file's native format.
fn decode_file(path: &Path) -> Result<(Vec<Sample>, u32, u16), AudioFileError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = File::open(path).map_err(|e| AudioFileError::IoError(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioFileError::InvalidFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AudioFileError::InvalidFormat("No audio track found".to_string()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioFileError::InvalidFormat("Unknown sample rate".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioFileError::InvalidFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(AudioFileError::EmptyTrack);
    }

    Ok((samples, sample_rate, channels))
}

/// Resample non-interleaved channel data to the target rate.
fn resample_channels(
    channels: Vec<Vec<Sample>>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<Vec<Sample>>, AudioFileError> {
    if source_rate == target_rate {
        return Ok(channels);
    }

    log::info!("Resampling track from {}Hz to {}Hz", source_rate, target_rate);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let frames = channels[0].len();
    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        frames,
        channels.len(),
    )
    .map_err(|e| AudioFileError::ResampleError(e.to_string()))?;

    resampler
        .process(&channels, None)
        .map_err(|e| AudioFileError::ResampleError(e.to_string()))
}

/// Split interleaved samples into per-channel vectors
fn deinterleave(samples: &[Sample], channels: u16) -> Vec<Vec<Sample>> {
    let ch = channels.max(1) as usize;
    let frames = samples.len() / ch;
    let mut out = vec![Vec::with_capacity(frames); ch];
    for frame in samples.chunks_exact(ch) {
        for (c, &s) in frame.iter().enumerate() {
            out[c].push(s);
        }
    }
    out
}

/// Fold per-channel data down (or duplicate up) to the target channel
/// count, re-interleaving the result.
fn remix(channels: Vec<Vec<Sample>>, target_channels: u16) -> Vec<Sample> {
    let frames = channels[0].len();
    let target = target_channels.max(1) as usize;
    let mut out = Vec::with_capacity(frames * target);

    for i in 0..frames {
        // Downmix by averaging all source channels
        let mixed: f32 = channels.iter().map(|c| c[i]).sum::<f32>() / channels.len() as f32;
        if target == 1 {
            out.push(mixed);
        } else if channels.len() >= target {
            for c in channels.iter().take(target) {
                out.push(c[i]);
            }
        } else {
            // Fewer source channels than target: duplicate the mono fold
            for _ in 0..target {
                out.push(mixed);
            }
        }
    }
    out
}

/// Decode a file at its native format, without resampling or remixing.
///
/// The offline mixer uses this to enforce — rather than paper over — the
/// rule that streams mixed sample-by-sample must already share a spec.
pub fn load_native(path: &Path) -> Result<(PcmBuffer, PcmSpec), AudioFileError> {
    let (samples, sample_rate, channels) = decode_file(path)?;
    Ok((
        PcmBuffer::from_vec(samples),
        PcmSpec::new(sample_rate, channels),
    ))
}

/// Load a backing track, normalizing it to the engine spec.
pub fn load_track(path: &Path, spec: PcmSpec) -> Result<Arc<LoadedTrack>, AudioFileError> {
    let (samples, source_rate, source_channels) = decode_file(path)?;

    let channels = deinterleave(&samples, source_channels);
    let channels = resample_channels(channels, source_rate, spec.sample_rate)?;
    let interleaved = remix(channels, spec.channels);

    log::info!(
        "Loaded {:?}: {:.1}s at {}Hz/{}ch (source {}Hz/{}ch)",
        path.file_name().unwrap_or_default(),
        spec.samples_to_seconds(interleaved.len() as u64),
        spec.sample_rate,
        spec.channels,
        source_rate,
        source_channels,
    );

    Ok(Arc::new(LoadedTrack {
        samples: PcmBuffer::from_vec(interleaved),
        spec,
        path: path.to_path_buf(),
    }))
}

/// Read a raw interleaved PCM file at the given spec.
///
/// Supports 16-bit signed integer and 32-bit float little-endian samples.
pub fn read_pcm_file(path: &Path, spec: &PcmSpec) -> Result<PcmBuffer, AudioFileError> {
    let file = File::open(path).map_err(|e| AudioFileError::IoError(e.to_string()))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| AudioFileError::IoError(e.to_string()))?;

    match spec.bits_per_sample {
        16 => {
            let samples: Vec<i16> = bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            Ok(PcmBuffer::from_i16(&samples))
        }
        32 => {
            let samples: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Ok(PcmBuffer::from_vec(samples))
        }
        depth => Err(AudioFileError::UnsupportedBitDepth(depth)),
    }
}

/// Write a raw interleaved PCM file at the given spec (16-bit or f32).
pub fn write_pcm_file(path: &Path, buffer: &PcmBuffer, spec: &PcmSpec) -> Result<(), AudioFileError> {
    let mut file = File::create(path).map_err(|e| AudioFileError::IoError(e.to_string()))?;

    match spec.bits_per_sample {
        16 => {
            let samples = buffer.to_i16();
            let mut bytes = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            file.write_all(&bytes)
                .map_err(|e| AudioFileError::IoError(e.to_string()))
        }
        32 => {
            let mut bytes = Vec::with_capacity(buffer.len() * 4);
            for s in buffer.as_slice() {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            file.write_all(&bytes)
                .map_err(|e| AudioFileError::IoError(e.to_string()))
        }
        depth => Err(AudioFileError::UnsupportedBitDepth(depth)),
    }
}

/// Write a 16-bit WAV file at the given spec (finished takes, mixdowns).
pub fn write_wav_i16(path: &Path, buffer: &PcmBuffer, spec: &PcmSpec) -> Result<(), AudioFileError> {
    let wav_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, wav_spec).map_err(|e| AudioFileError::IoError(e.to_string()))?;

    for s in buffer.to_i16() {
        writer
            .write_sample(s)
            .map_err(|e| AudioFileError::IoError(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| AudioFileError::IoError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_roundtrip_i16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocal.pcm");
        let spec = PcmSpec::default();

        let buffer = PcmBuffer::from_vec(vec![0.0, 0.25, -0.25, 0.99]);
        write_pcm_file(&path, &buffer, &spec).unwrap();
        let back = read_pcm_file(&path, &spec).unwrap();

        assert_eq!(back.len(), 4);
        for (a, b) in buffer.as_slice().iter().zip(back.as_slice()) {
            assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_pcm_roundtrip_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocal.f32");
        let spec = PcmSpec {
            bits_per_sample: 32,
            ..PcmSpec::default()
        };

        let buffer = PcmBuffer::from_vec(vec![0.1, -0.9, 0.5]);
        write_pcm_file(&path, &buffer, &spec).unwrap();
        let back = read_pcm_file(&path, &spec).unwrap();

        assert_eq!(back.as_slice(), buffer.as_slice());
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocal.pcm");
        let spec = PcmSpec {
            bits_per_sample: 24,
            ..PcmSpec::default()
        };

        let buffer = PcmBuffer::silence(4);
        assert!(matches!(
            write_pcm_file(&path, &buffer, &spec),
            Err(AudioFileError::UnsupportedBitDepth(24))
        ));
    }

    #[test]
    fn test_remix_downmix_and_duplicate() {
        // Stereo -> mono averages
        let mono = remix(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 1);
        assert_eq!(mono, vec![0.5, 0.5]);

        // Mono -> stereo duplicates
        let stereo = remix(vec![vec![0.3, 0.6]], 2);
        assert_eq!(stereo, vec![0.3, 0.3, 0.6, 0.6]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let spec = PcmSpec::default();
        assert!(matches!(
            read_pcm_file(Path::new("/nonexistent/vocal.pcm"), &spec),
            Err(AudioFileError::IoError(_))
        ));
    }
}
