//! Native DSP building blocks for the voice effect chain

pub mod agc;
pub mod delay;
pub mod denoise;
pub mod dynamics;
pub mod echo;
pub mod eq;
pub mod pitch;
pub mod reverb;

pub use agc::AutoGainControl;
pub use delay::Delay;
pub use denoise::NoiseSuppressor;
pub use dynamics::Compressor;
pub use echo::EchoCanceller;
pub use eq::ShelfEq;
pub use pitch::{AutoTuner, PitchShifter};
pub use reverb::Reverb;
