//! # Linear PCM Helpers
//!
//! Conversions around the canonical interchange format: signed 16-bit,
//! little-endian, mono. Used on both sides of the μ-law codec.

use crate::error::{AppError, AppResult};
use byteorder::{ByteOrder, LittleEndian};

/// Convert raw little-endian bytes to samples.
///
/// An odd trailing byte is ignored; the result has `bytes.len() / 2` samples.
pub fn bytes_to_samples(data: &[u8]) -> Vec<i16> {
    let mut samples = vec![0i16; data.len() / 2];
    LittleEndian::read_i16_into(&data[..samples.len() * 2], &mut samples);
    samples
}

/// Convert samples back to raw little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

/// Scale floats back to 16-bit samples, clamping out-of-range values.
pub fn from_f32(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = sample * 32768.0;
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Average interleaved channels down to one.
///
/// A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> AppResult<Vec<i16>> {
    match channels {
        0 => Err(AppError::CodecFailure("channel count cannot be 0".to_string())),
        1 => Ok(samples.to_vec()),
        n => {
            let n = n as usize;
            Ok(samples
                .chunks_exact(n)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / n as i32) as i16
                })
                .collect())
        }
    }
}

/// Resample with linear interpolation.
///
/// Output length is `floor(len * to_rate / from_rate)`. Equal rates return the
/// input unchanged.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> AppResult<Vec<i16>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AppError::CodecFailure(format!(
            "cannot resample from {} Hz to {} Hz",
            from_rate, to_rate
        )));
    }

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    let resampled = (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(last);
            let fraction = position - index as f64;
            let current = samples[index] as f64;
            let next = samples[(index + 1).min(last)] as f64;
            (current + (next - current) * fraction).round() as i16
        })
        .collect();

    Ok(resampled)
}

/// Largest absolute sample value.
pub fn peak(samples: &[i16]) -> u16 {
    samples.iter().map(|&s| s.unsigned_abs()).max().unwrap_or(0)
}

/// Peak level of normalized samples in dB relative to full scale.
///
/// Silence reports `f64::NEG_INFINITY`.
pub fn peak_dbfs(samples: &[f32]) -> f64 {
    let peak = samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
    20.0 * (peak as f64).log10()
}

/// Root-mean-square level of the buffer, in sample units.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Duration of a mono buffer at the given rate.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_conversion() {
        let samples = vec![0i16, 1, -1, 32767, -32768];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[2..4], &[0x01, 0x00]);
        assert_eq!(bytes_to_samples(&bytes), samples);
    }

    #[test]
    fn test_odd_byte_is_ignored() {
        assert_eq!(bytes_to_samples(&[0x10, 0x00, 0xFF]), vec![16]);
        assert!(bytes_to_samples(&[0xFF]).is_empty());
    }

    #[test]
    fn test_float_conversion_clamps() {
        assert_eq!(from_f32(&[0.0, 0.5, -0.5, -1.0]), vec![0, 16384, -16384, -32768]);
        assert_eq!(from_f32(&[1.0, 2.0, -3.0]), vec![32767, 32767, -32768]);
    }

    #[test]
    fn test_downmix() {
        let stereo = vec![100i16, 300, -200, -400, 7];
        assert_eq!(downmix_to_mono(&stereo, 2).unwrap(), vec![200, -300]);
        assert_eq!(downmix_to_mono(&stereo, 1).unwrap(), stereo);
        assert!(downmix_to_mono(&stereo, 0).is_err());
    }

    #[test]
    fn test_resample_lengths() {
        let input: Vec<i16> = (0..16000).map(|i| (i % 100) as i16).collect();
        assert_eq!(resample(&input, 16000, 8000).unwrap().len(), 8000);
        assert_eq!(resample(&input, 16000, 16000).unwrap(), input);
        assert_eq!(resample(&input[..441], 44100, 8000).unwrap().len(), 80);
        assert!(resample(&input, 0, 8000).is_err());
    }

    #[test]
    fn test_resample_interpolates() {
        let upsampled = resample(&[0, 100], 1, 2).unwrap();
        assert_eq!(upsampled, vec![0, 50, 100, 100]);
    }

    #[test]
    fn test_levels() {
        assert_eq!(peak(&[3, -32768, 12]), 32768);
        assert_eq!(peak(&[]), 0);
        assert!((rms(&[3, -3, 3, -3]) - 3.0).abs() < f64::EPSILON);
        assert_eq!(duration_secs(8000, 8000), 1.0);

        assert!((peak_dbfs(&[0.25, -0.5]) - -6.0206).abs() < 1e-3);
        assert_eq!(peak_dbfs(&[0.0; 4]), f64::NEG_INFINITY);
    }
}
