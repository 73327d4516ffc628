//! Full exchange: collect the greeting, stream a recorded WAV file as the
//! caller's speech, then collect the agent's answer.
//!
//! Envelopes carry the complete set of fields a telephony provider sends
//! (sequence numbers, track, chunk index, timestamps, media format) so the
//! agent sees realistic traffic.

use super::{save_mulaw_as_wav, ScenarioReport};
use crate::audio::{pcm, wav};
use crate::collaborators::{LevelTranscriber, Transcriber};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::media::call::{chunk_frames, CallIdentity};
use crate::media::envelope::{EventKind, MediaEnvelope, MediaFormat};
use crate::transport::MediaStreamClient;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Payloads this small are keep-alives, not speech.
const MIN_CHUNK_BYTES: usize = 100;

/// First media sequence number; start uses 1.
const FIRST_MEDIA_SEQUENCE: u64 = 10;

const STOP_SEQUENCE: u64 = 9999;

pub async fn run(config: &AppConfig, audio_file: &Path, output_dir: &Path) -> AppResult<ScenarioReport> {
    // Fail on a bad file before dialling
    let mulaw = wav::load_as_mulaw(audio_file, config.audio.sample_rate)?;

    let identity = CallIdentity::from_config(config);
    let timing = &config.timing;
    let quiet_gap = Duration::from_secs(timing.quiet_gap_secs);
    let mut report = ScenarioReport {
        scenario: "exchange",
        call_sid: identity.call_sid.clone(),
        ..ScenarioReport::default()
    };

    let mut client = MediaStreamClient::connect(&config.stream.url).await?;
    client.send(&start_envelope(&identity)).await?;
    info!(call_sid = %identity.call_sid, "Start event sent, waiting for greeting");

    let greeting = collect_audio(
        &mut client,
        Duration::from_secs(timing.receive_timeout_secs),
        quiet_gap,
        true,
    )
    .await?;
    keep_audio(config, &mut report, &output_dir.join("test_greeting_response.wav"), &greeting, "greeting").await?;

    let frames = media_frames(&identity.stream_sid, &mulaw, config.audio.file_chunk_bytes);
    let sent = client
        .stream_frames(&frames, Duration::from_millis(config.audio.chunk_interval_ms))
        .await?;
    info!(frames = sent, bytes = mulaw.len(), file = %audio_file.display(), "Test audio sent");

    let answer = collect_audio(
        &mut client,
        Duration::from_secs(timing.response_timeout_secs),
        quiet_gap,
        false,
    )
    .await?;
    keep_audio(config, &mut report, &output_dir.join("test_ai_response.wav"), &answer, "response").await?;

    client
        .send(&identity.stop_envelope().with_sequence_number(STOP_SEQUENCE))
        .await?;
    report.frames_sent = client.frames_sent();
    report.bytes_sent = client.bytes_sent();

    tokio::time::sleep(Duration::from_secs(timing.stop_grace_secs)).await;
    client.close().await;

    Ok(report)
}

/// Start envelope with the format details a provider would announce.
fn start_envelope(identity: &CallIdentity) -> MediaEnvelope {
    let mut envelope = identity.start_envelope().with_sequence_number(1);
    if let MediaEnvelope::Start { start, .. } = &mut envelope {
        start.tracks = Some(vec!["inbound".to_string()]);
        start.media_format = Some(MediaFormat::default());
    }
    envelope
}

/// Media envelopes tagged with track, chunk index, timestamp and sequence number.
fn media_frames(stream_sid: &str, mulaw: &[u8], chunk_bytes: usize) -> Vec<MediaEnvelope> {
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();

    chunk_frames(stream_sid, mulaw, chunk_bytes)
        .into_iter()
        .enumerate()
        .map(|(index, frame)| {
            let mut frame = frame.with_sequence_number(FIRST_MEDIA_SEQUENCE + index as u64);
            if let MediaEnvelope::Media { media, .. } = &mut frame {
                media.track = Some("inbound".to_string());
                media.chunk = Some(index.to_string());
                media.timestamp = Some(timestamp.clone());
            }
            frame
        })
        .collect()
}

/// Gather media payloads larger than [`MIN_CHUNK_BYTES`] for at most
/// `overall`.
///
/// With `first_only` the first payload ends collection; otherwise a quiet
/// `gap` after something was received does.
async fn collect_audio(
    client: &mut MediaStreamClient,
    overall: Duration,
    gap: Duration,
    first_only: bool,
) -> AppResult<Vec<Vec<u8>>> {
    let deadline = Instant::now() + overall;
    let gap = gap.max(Duration::from_millis(100));
    let mut chunks: Vec<Vec<u8>> = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match client.next_frame(gap.min(remaining)).await? {
            None => {
                if !chunks.is_empty() {
                    debug!(chunks = chunks.len(), "Quiet gap reached");
                    break;
                }
            }
            Some(frame) if frame.kind == EventKind::Media => {
                if let Some(payload) = frame.payload.filter(|p| p.len() > MIN_CHUNK_BYTES) {
                    chunks.push(payload);
                    if first_only {
                        break;
                    }
                }
            }
            Some(_) => {}
        }
    }

    Ok(chunks)
}

/// Save collected audio, describe it, and record both in the report.
async fn keep_audio(
    config: &AppConfig,
    report: &mut ScenarioReport,
    path: &Path,
    chunks: &[Vec<u8>],
    label: &str,
) -> AppResult<()> {
    if chunks.is_empty() {
        warn!(label, "No audio received");
        report.notes.push(format!("No {} received", label));
        return Ok(());
    }

    let mulaw = chunks.concat();
    let rate = config.audio.sample_rate;
    let samples = save_mulaw_as_wav(path, &mulaw, rate)?;

    report.responses += chunks.len();
    report.bytes_received += mulaw.len();
    report.saved_files.push(path.to_path_buf());

    let description = LevelTranscriber
        .transcribe(&wav::encode_wav(&samples, rate)?)
        .await
        .unwrap_or_default();
    report.notes.push(format!(
        "{}: {:.2}s {}",
        label,
        pcm::duration_secs(samples.len(), rate),
        description
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth;
    use crate::scenarios::test_support::{fake_agent, fast_config, GREETING_BYTES, REPLY_BYTES};

    #[test]
    fn test_media_frames_are_tagged() {
        let frames = media_frames("MZ1", &[0xFF; 330], 160);
        assert_eq!(frames.len(), 3);

        match &frames[2] {
            MediaEnvelope::Media { media, sequence_number, .. } => {
                assert_eq!(sequence_number.as_deref(), Some("12"));
                assert_eq!(media.track.as_deref(), Some("inbound"));
                assert_eq!(media.chunk.as_deref(), Some("2"));
                assert!(media.timestamp.is_some());
            }
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn test_start_envelope_announces_format() {
        let identity = CallIdentity::from_config(&AppConfig::default());
        match start_envelope(&identity) {
            MediaEnvelope::Start { start, sequence_number, .. } => {
                assert_eq!(sequence_number.as_deref(), Some("1"));
                assert_eq!(start.media_format, Some(MediaFormat::default()));
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_saves_greeting_and_response() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("caller.wav");
        wav::write_wav(&input, &synth::fake_speech(0.1, 8000, 5), 8000).unwrap();

        let mut config = fast_config(fake_agent(800).await);
        config.timing.stop_grace_secs = 0;

        let report = run(&config, &input, dir.path()).await.unwrap();

        assert_eq!(report.bytes_sent, 800);
        // start + 5 × 160-byte frames + stop
        assert_eq!(report.frames_sent, 7);
        assert_eq!(report.responses, 2);
        assert_eq!(report.bytes_received, GREETING_BYTES + REPLY_BYTES);
        assert_eq!(report.saved_files.len(), 2);
        assert!(dir.path().join("test_greeting_response.wav").exists());
        assert!(dir.path().join("test_ai_response.wav").exists());
    }

    #[tokio::test]
    async fn test_exchange_rejects_unsupported_file() {
        let config = fast_config("ws://127.0.0.1:9/api/twilio/media-stream".to_string());
        let err = run(&config, Path::new("hello.m4a"), Path::new(".")).await.unwrap_err();
        assert_eq!(err.kind(), "codec_failure");
    }
}
