//! # Synthetic Audio
//!
//! Generates the canned audio the call simulator streams: silence and a
//! speech-like tone mix. The tone mix is not intelligible; a transcriber will
//! usually hallucinate on it. It exercises the pipeline, not the model.

use std::f64::consts::PI;

/// Tone components of the fake speech signal: (frequency Hz, amplitude).
const TONES: [(f64, f64); 3] = [
    (440.0, 0.05),  // base tone
    (880.0, 0.03),  // harmonic
    (220.0, 0.02),  // lower frequency
];

/// Amplitude of the white noise component.
const NOISE_LEVEL: f64 = 0.01;

/// Cadence of the amplitude envelope, roughly syllables per second.
const MODULATION_HZ: f64 = 3.0;

/// Scale applied before conversion to 16-bit.
const OUTPUT_SCALE: f64 = 8000.0;

/// `duration_secs` of digital silence.
pub fn silence(duration_secs: f32, sample_rate: u32) -> Vec<i16> {
    vec![0; sample_count(duration_secs, sample_rate)]
}

/// Speech-like test signal: three tones, light noise and a 3 Hz envelope.
///
/// The same `seed` always produces the same buffer.
pub fn fake_speech(duration_secs: f32, sample_rate: u32, seed: u64) -> Vec<i16> {
    let count = sample_count(duration_secs, sample_rate);
    let mut noise = NoiseSource::new(seed);

    (0..count)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let tones: f64 = TONES
                .iter()
                .map(|&(freq, amp)| amp * (2.0 * PI * freq * t).sin())
                .sum();
            let signal = tones + NOISE_LEVEL * noise.next_gaussian();
            let envelope = 0.5 + 0.5 * (2.0 * PI * MODULATION_HZ * t).sin();
            // `as` truncates toward zero and saturates, like the int16 cast it replaces
            (signal * envelope * OUTPUT_SCALE) as i16
        })
        .collect()
}

fn sample_count(duration_secs: f32, sample_rate: u32) -> usize {
    if duration_secs <= 0.0 {
        return 0;
    }
    (duration_secs as f64 * sample_rate as f64) as usize
}

/// Seeded xorshift generator with a Box-Muller transform for unit-variance noise.
struct NoiseSource {
    state: u64,
    spare: Option<f64>,
}

impl NoiseSource {
    fn new(seed: u64) -> Self {
        // xorshift must never hold zero
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15 | 1,
            spare: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform in (0, 1].
    fn next_unit(&mut self) -> f64 {
        ((self.next_u64() >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    fn next_gaussian(&mut self) -> f64 {
        if let Some(value) = self.spare.take() {
            return value;
        }
        let radius = (-2.0 * self.next_unit().ln()).sqrt();
        let angle = 2.0 * PI * self.next_unit();
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }
}
