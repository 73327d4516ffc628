//! # Audio Module
//!
//! Everything that touches samples. The codec is the only part the wire
//! protocol depends on; the rest feeds it or persists its output.
//!
//! ## Audio Format:
//! - **Sample Rate**: 8kHz (8,000 Hz), telephony
//! - **Bit Depth**: 16-bit linear PCM on the local side, 8-bit μ-law on the wire
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers for raw PCM bytes

pub mod codec;   // μ-law ⇄ linear PCM
pub mod pcm;     // byte/sample/float conversions, downmix, resampling
pub mod synth;   // silence and synthetic speech-like audio
pub mod wav;     // WAV read/write, file ⇄ μ-law

/// Canonical sample rate on both sides of the codec.
pub const SAMPLE_RATE: u32 = 8000;
