//! # μ-law Codec
//!
//! Converts between 16-bit linear PCM and 8-bit μ-law (G.711), the telephony
//! wire format carried in media envelopes.
//!
//! ## Encoding, per sample:
//! 1. Take the sign and the absolute magnitude (as `i32`, so `-32768` is safe)
//! 2. Clip the magnitude to 32635
//! 3. Add the bias 132 (0x84)
//! 4. Exponent = position of the highest set bit above bit 7 (0..=7)
//! 5. Mantissa = the four bits just below that highest bit
//! 6. Byte = one's complement of `sign | exponent | mantissa`
//!
//! ## Decoding, per byte:
//! The inverse: un-complement, split sign/exponent/mantissa, rebuild the
//! magnitude at the centre of its quantization step and re-apply the sign.
//!
//! Every function here is pure and works element by element: output `i`
//! depends only on input `i`, so buffers can be split across threads freely.

use crate::audio::pcm;
use tracing::debug;

/// Bias added to the magnitude before the exponent search.
pub const BIAS: i32 = 0x84;

/// Largest magnitude that still fits the top segment once biased.
pub const CLIP: i32 = 32635;

/// Segment thresholds, `0x80 << e` for exponent `e`.
const SEGMENT_THRESHOLDS: [i32; 8] = [
    0x80, 0x100, 0x200, 0x400, 0x800, 0x1000, 0x2000, 0x4000,
];

/// Encode one linear PCM sample to a μ-law code.
pub fn encode_sample(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
    let magnitude = (sample as i32).abs().min(CLIP) + BIAS;

    // Highest segment whose threshold the biased magnitude reaches; 0 otherwise.
    let exponent = (0..SEGMENT_THRESHOLDS.len())
        .rev()
        .find(|&e| magnitude >= SEGMENT_THRESHOLDS[e])
        .unwrap_or(0) as u8;

    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Decode one μ-law code to a linear PCM sample.
pub fn decode_sample(code: u8) -> i16 {
    let code = !code;
    let sign = code & 0x80;
    let exponent = ((code & 0x70) >> 4) as i32;
    let mantissa = (code & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a sample buffer. Output has exactly one code per sample.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode_sample(s)).collect()
}

/// Encode raw little-endian 16-bit PCM bytes.
///
/// An odd trailing byte cannot form a sample and is dropped, so an input of
/// `2k + 1` bytes encodes exactly like its first `2k` bytes.
pub fn encode_pcm_bytes(pcm_bytes: &[u8]) -> Vec<u8> {
    if pcm_bytes.len() % 2 != 0 {
        debug!(len = pcm_bytes.len(), "Dropping trailing byte of odd-length PCM buffer");
    }
    encode_samples(&pcm::bytes_to_samples(pcm_bytes))
}

/// Decode μ-law codes to 16-bit samples (for WAV persistence).
pub fn decode(codes: &[u8]) -> Vec<i16> {
    codes.iter().map(|&c| decode_sample(c)).collect()
}

/// Decode μ-law codes to floats in [-1.0, 1.0] (for playback or analysis).
pub fn decode_to_f32(codes: &[u8]) -> Vec<f32> {
    codes
        .iter()
        .map(|&c| decode_sample(c) as f32 / 32768.0)
        .collect()
}

/// Decode μ-law codes to raw little-endian 16-bit PCM bytes.
pub fn decode_to_pcm_bytes(codes: &[u8]) -> Vec<u8> {
    pcm::samples_to_bytes(&decode(codes))
}
