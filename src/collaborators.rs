//! # Agent Collaborators
//!
//! The loopback server hands buffered call audio to two external services:
//! a transcriber and a response generator. Both sit behind traits so the real
//! speech-to-text and text-to-speech clients can live elsewhere. This crate
//! ships only local stand-ins that need no network or credentials.

use crate::audio::{pcm, synth, wav};
use anyhow::Result;
use std::f64::consts::PI;
use std::sync::Arc;

/// Who is on the other end of the call, as far as the responder needs to know.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerContext {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub caller_email: Option<String>,
}

/// Output of a [`ResponseGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    pub text: String,
    /// Mono 16-bit PCM at 8kHz, ready for μ-law encoding
    pub pcm: Vec<i16>,
}

/// Speech-to-text: a WAV file in, text out.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Turns a transcript into the agent's spoken reply.
#[async_trait::async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn respond(&self, transcript: &str, caller: &CallerContext) -> Result<GeneratedResponse>;

    /// Opening line played when a call starts.
    async fn greet(&self, caller: &CallerContext) -> Result<GeneratedResponse>;

    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        (**self).transcribe(wav).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait::async_trait]
impl<T: ResponseGenerator + ?Sized> ResponseGenerator for Arc<T> {
    async fn respond(&self, transcript: &str, caller: &CallerContext) -> Result<GeneratedResponse> {
        (**self).respond(transcript, caller).await
    }

    async fn greet(&self, caller: &CallerContext) -> Result<GeneratedResponse> {
        (**self).greet(caller).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// RMS below which a buffer is reported as silence.
const SILENCE_RMS: f64 = 50.0;

/// Describes the level of the audio instead of recognising words.
///
/// Silence transcribes to an empty string, which the server treats as
/// "nothing to answer".
#[derive(Debug, Clone, Default)]
pub struct LevelTranscriber;

#[async_trait::async_trait]
impl Transcriber for LevelTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let audio = wav::decode_wav(wav)?;
        let mono = pcm::downmix_to_mono(&audio.samples, audio.channels)?;
        let rms = pcm::rms(&mono);

        if rms < SILENCE_RMS {
            return Ok(String::new());
        }

        Ok(format!(
            "[{:.2}s of audio, rms {:.0}, peak {}]",
            pcm::duration_secs(mono.len(), audio.sample_rate),
            rms,
            pcm::peak(&mono)
        ))
    }

    fn name(&self) -> &str {
        "level"
    }
}

/// Answers every transcript with a short tone.
#[derive(Debug, Clone)]
pub struct ToneResponder {
    pub frequency_hz: f64,
    pub duration_secs: f32,
    pub sample_rate: u32,
}

impl Default for ToneResponder {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            duration_secs: 0.5,
            sample_rate: crate::audio::SAMPLE_RATE,
        }
    }
}

impl ToneResponder {
    fn tone(&self, frequency_hz: f64) -> Vec<i16> {
        let count = (self.duration_secs.max(0.0) as f64 * self.sample_rate as f64) as usize;
        (0..count)
            .map(|i| {
                let t = i as f64 / self.sample_rate as f64;
                (0.3 * (2.0 * PI * frequency_hz * t).sin() * 32767.0) as i16
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ResponseGenerator for ToneResponder {
    async fn respond(&self, transcript: &str, _caller: &CallerContext) -> Result<GeneratedResponse> {
        Ok(GeneratedResponse {
            text: format!("I heard {}", transcript),
            pcm: self.tone(self.frequency_hz),
        })
    }

    async fn greet(&self, caller: &CallerContext) -> Result<GeneratedResponse> {
        let text = match &caller.caller_email {
            Some(email) => format!("Hello {}, how can I help you today?", email),
            None => "Hello, how can I help you today?".to_string(),
        };
        // Greeting is one octave lower so it is easy to tell apart in saved files
        let mut pcm = synth::silence(0.1, self.sample_rate);
        pcm.extend(self.tone(self.frequency_hz / 2.0));
        Ok(GeneratedResponse { text, pcm })
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_level_transcriber_silence() {
        let wav = wav::encode_wav(&synth::silence(1.0, 8000), 8000).unwrap();
        let text = LevelTranscriber.transcribe(&wav).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_level_transcriber_describes_audio() {
        let wav = wav::encode_wav(&synth::fake_speech(1.0, 8000, 3), 8000).unwrap();
        let text = LevelTranscriber.transcribe(&wav).await.unwrap();
        assert!(text.starts_with("[1.00s of audio"), "got {}", text);
    }

    #[tokio::test]
    async fn test_level_transcriber_rejects_garbage() {
        assert!(LevelTranscriber.transcribe(b"nope").await.is_err());
    }

    #[tokio::test]
    async fn test_tone_responder() {
        let responder = ToneResponder::default();
        let reply = responder
            .respond("hello", &CallerContext::default())
            .await
            .unwrap();
        assert_eq!(reply.text, "I heard hello");
        assert_eq!(reply.pcm.len(), 4000);
        assert!(pcm::peak(&reply.pcm) > 9000);

        let caller = CallerContext {
            caller_email: Some("a@b.c".to_string()),
            ..CallerContext::default()
        };
        let greeting = responder.greet(&caller).await.unwrap();
        assert!(greeting.text.contains("a@b.c"));
        assert_eq!(greeting.pcm.len(), 4800);
    }

    #[tokio::test]
    async fn test_shared_through_arc() {
        let transcriber: Arc<dyn Transcriber> = Arc::new(LevelTranscriber);
        assert_eq!(transcriber.name(), "level");
    }
}
