//! Offline mixdown utility
//!
//! Mixes a raw vocal PCM capture with a backing track into a WAV file,
//! using the same mixer the engine's finish flow uses.
//!
//! Usage: mixdown <vocal.pcm> <bgm> <out.wav> [vocal_gain] [bgm_gain] [sample_rate] [channels]

use std::path::Path;
use std::process::ExitCode;

use chorus_core::mixer;
use chorus_core::types::PcmSpec;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <vocal.pcm> <bgm> <out.wav> [vocal_gain] [bgm_gain] [sample_rate] [channels]",
            args[0]
        );
        return ExitCode::FAILURE;
    }

    let vocal_gain: f32 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1.0);
    let bgm_gain: f32 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(1.0);
    let sample_rate: u32 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(48000);
    let channels: u16 = args.get(7).and_then(|s| s.parse().ok()).unwrap_or(1);

    let spec = PcmSpec::new(sample_rate, channels);

    match mixer::mix_files(
        Path::new(&args[1]),
        Path::new(&args[2]),
        Path::new(&args[3]),
        vocal_gain,
        bgm_gain,
        spec,
    ) {
        Ok(()) => {
            println!("Wrote {}", args[3]);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Mix failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
