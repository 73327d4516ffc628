//! # Scripted Calls
//!
//! Each scenario drives one media-stream session against a live agent:
//! open channel → start envelope → stream audio → await responses → stop
//! envelope → close. They differ in what audio is sent and what is kept.
//!
//! ## Scenarios:
//! - **simulate**: three synthetic utterances, counts AI responses
//! - **greeting**: saves the first audio the agent sends
//! - **exchange**: saves the greeting, streams a WAV file, saves the reply

pub mod exchange;
pub mod greeting;
pub mod simulate;

use crate::audio::{codec, wav};
use crate::error::AppResult;
use std::path::{Path, PathBuf};

/// What a scenario did, for the console reporter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioReport {
    pub scenario: &'static str,
    pub call_sid: String,
    /// Envelopes sent, including start and stop
    pub frames_sent: usize,
    /// μ-law bytes sent in media envelopes
    pub bytes_sent: usize,
    /// Media envelopes received with audio
    pub responses: usize,
    /// μ-law bytes received
    pub bytes_received: usize,
    pub saved_files: Vec<PathBuf>,
    /// Free-form observations (durations, levels, transcripts)
    pub notes: Vec<String>,
}

/// Decode μ-law and write it as an 8kHz 16-bit mono WAV file.
///
/// Returns the decoded samples for level reporting.
pub(crate) fn save_mulaw_as_wav(path: &Path, mulaw: &[u8], sample_rate: u32) -> AppResult<Vec<i16>> {
    let samples = codec::decode(mulaw);
    wav::write_wav(path, &samples, sample_rate)?;
    Ok(samples)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_mulaw_as_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply.wav");

        let samples = save_mulaw_as_wav(&path, &[0xFF, 0x80, 0x00], 8000).unwrap();
        assert_eq!(samples, vec![0, 32124, -32124]);

        let audio = wav::read_wav(&path).unwrap();
        assert_eq!(audio.samples, samples);
    }
}
