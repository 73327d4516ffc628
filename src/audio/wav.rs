//! # WAV Persistence
//!
//! Writes decoded call audio as PCM WAV files and loads WAV files to stream
//! them as μ-law. Raw `.pcm`/`.raw` files (16-bit little-endian, mono, already
//! at the call rate) are accepted next to WAV for the encode/decode commands.
//!
//! ## Key Functions:
//! - **encode_wav / write_wav**: 16-bit mono PCM WAV, in memory or on disk
//! - **read_wav / decode_wav**: parse 8/16/24/32-bit integer and float WAV (file or buffer) into 16-bit samples
//! - **load_as_mulaw**: WAV file → mono → 8kHz → μ-law, ready for media frames
//! - **save_mulaw**: μ-law → WAV (or raw PCM) file

use crate::audio::{codec, pcm};
use crate::error::{AppError, AppResult};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};

/// Decoded contents of a WAV file.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved 16-bit samples
    pub samples: Vec<i16>,
}

/// How an audio file on disk is laid out, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Wav,
    RawPcm,
}

impl FileFormat {
    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav" => Some(FileFormat::Wav),
            "pcm" | "raw" => Some(FileFormat::RawPcm),
            _ => None,
        }
    }
}

fn mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[i16], sample_rate: u32) -> AppResult<()> {
    let mut writer = hound::WavWriter::new(writer, mono_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encode mono 16-bit samples as an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> AppResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Write mono 16-bit samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> AppResult<()> {
    let file = std::fs::File::create(path)?;
    write_samples(std::io::BufWriter::new(file), samples, sample_rate)?;

    info!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "WAV file written"
    );
    Ok(())
}

/// Read a WAV file into interleaved 16-bit samples.
///
/// 8, 16, 24 and 32-bit integer PCM and 32-bit float PCM are accepted; wider
/// formats are scaled down to 16 bits.
pub fn read_wav(path: &Path) -> AppResult<WavAudio> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        AppError::CodecFailure(format!("cannot open audio file {}: {}", path.display(), e))
    })?;

    let audio = read_samples(reader)?;

    debug!(
        path = %path.display(),
        channels = audio.channels,
        sample_rate = audio.sample_rate,
        "WAV file read"
    );

    Ok(audio)
}

/// Parse an in-memory WAV file, as handed to a transcriber.
pub fn decode_wav(bytes: &[u8]) -> AppResult<WavAudio> {
    read_samples(hound::WavReader::new(Cursor::new(bytes))?)
}

fn read_samples<R: Read>(mut reader: hound::WavReader<R>) -> AppResult<WavAudio> {
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => {
            let floats = reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?;
            pcm::from_f32(&floats)
        }
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| scale_to_16_bits(s, bits)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Shift an integer sample of `bits` width into the 16-bit range.
fn scale_to_16_bits(sample: i32, bits: u16) -> i16 {
    if bits <= 16 {
        (sample << (16 - bits)) as i16
    } else {
        (sample >> (bits - 16)) as i16
    }
}

/// Load an audio file and convert it to μ-law at `target_rate`.
///
/// ## Conversion Steps (WAV):
/// 1. Read and scale to 16-bit samples
/// 2. Downmix to mono (channel average)
/// 3. Resample to `target_rate`
/// 4. μ-law encode
///
/// Raw PCM carries no header, so it is taken as mono at `target_rate` and
/// only encoded.
pub fn load_as_mulaw(path: &Path, target_rate: u32) -> AppResult<Vec<u8>> {
    let mulaw = match FileFormat::of(path) {
        Some(FileFormat::Wav) => {
            let audio = read_wav(path)?;
            let mono = pcm::downmix_to_mono(&audio.samples, audio.channels)?;
            let resampled = pcm::resample(&mono, audio.sample_rate, target_rate)?;
            info!(
                path = %path.display(),
                source_rate = audio.sample_rate,
                source_channels = audio.channels,
                "Converting WAV file to μ-law"
            );
            codec::encode_samples(&resampled)
        }
        Some(FileFormat::RawPcm) => codec::encode_pcm_bytes(&std::fs::read(path)?),
        None => {
            return Err(AppError::CodecFailure(format!(
                "unsupported audio format for {}, use a .wav or .pcm file",
                path.display()
            )))
        }
    };

    debug!(path = %path.display(), mulaw_bytes = mulaw.len(), "Audio file encoded");
    Ok(mulaw)
}

/// Decode μ-law and write it to `path`: a WAV file, or headerless 16-bit
/// little-endian PCM for `.pcm`/`.raw`.
///
/// Returns the number of samples written.
pub fn save_mulaw(path: &Path, mulaw: &[u8], sample_rate: u32) -> AppResult<usize> {
    match FileFormat::of(path) {
        Some(FileFormat::RawPcm) => {
            std::fs::write(path, codec::decode_to_pcm_bytes(mulaw))?;
            debug!(path = %path.display(), samples = mulaw.len(), "Raw PCM written");
        }
        _ => write_wav(path, &codec::decode(mulaw), sample_rate)?,
    }
    Ok(mulaw.len())
}
