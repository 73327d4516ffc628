//! Synthetic call: three speech-like utterances streamed at real-time pace
//! while a background listener counts the agent's replies.
//!
//! The audio is tones and noise, not words. Expect the agent's transcriber to
//! hallucinate; use `exchange` with a recorded file to test understanding.

use super::ScenarioReport;
use crate::audio::{codec, synth};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::media::call::CallIdentity;
use crate::transport::MediaStreamClient;
use std::time::Duration;
use tracing::info;

/// What each synthetic utterance stands in for.
pub const UTTERANCES: [&str; 3] = [
    "Hello, I'm calling about my recent order",
    "Can you check the status of my shipment please?",
    "Thank you so much for your help today",
];

pub async fn run(config: &AppConfig) -> AppResult<ScenarioReport> {
    let identity = CallIdentity::from_config(config);
    let audio = &config.audio;
    let timing = &config.timing;

    let mut client = MediaStreamClient::connect(&config.stream.url).await?;
    client.send(&identity.start_envelope()).await?;
    info!(call_sid = %identity.call_sid, "Start event sent");

    let listener = client.spawn_listener()?;
    tokio::time::sleep(Duration::from_secs(timing.greeting_wait_secs)).await;

    let pacing = Duration::from_millis(audio.chunk_interval_ms);
    let reply_wait = Duration::from_secs_f32(audio.utterance_secs) + Duration::from_secs(timing.quiet_gap_secs);

    for (index, phrase) in UTTERANCES.iter().enumerate() {
        let speech = synth::fake_speech(audio.utterance_secs, audio.sample_rate, index as u64 + 1);
        let mulaw = codec::encode_samples(&speech);

        let frames = client
            .stream_audio(&identity.stream_sid, &mulaw, audio.chunk_bytes, pacing)
            .await?;
        info!(
            utterance = index + 1,
            phrase = *phrase,
            frames,
            bytes = mulaw.len(),
            "Synthetic utterance sent"
        );

        tokio::time::sleep(reply_wait).await;
    }

    tokio::time::sleep(Duration::from_secs(timing.final_wait_secs)).await;

    client.send(&identity.stop_envelope()).await?;
    info!("Stop event sent");

    let received = listener.finish(Duration::from_secs(timing.stop_grace_secs)).await;

    let report = ScenarioReport {
        scenario: "simulate",
        call_sid: identity.call_sid.clone(),
        frames_sent: client.frames_sent(),
        bytes_sent: client.bytes_sent(),
        responses: received.responses,
        bytes_received: received.mulaw.len(),
        saved_files: Vec::new(),
        notes: vec![format!(
            "{} synthetic utterances of {:.1}s each",
            UTTERANCES.len(),
            audio.utterance_secs
        )],
    };

    client.close().await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::test_support::{fake_agent, fast_config, GREETING_BYTES, REPLY_BYTES};

    #[tokio::test]
    async fn test_simulate_counts_responses() {
        // 0.1s of 8kHz μ-law is 800 bytes, so one reply per utterance
        let url = fake_agent(800).await;
        let config = fast_config(url);

        let report = run(&config).await.unwrap();

        assert_eq!(report.scenario, "simulate");
        assert_eq!(report.call_sid, "CA_TEST");
        // start + 3 × ceil(800 / 640) media + stop
        assert_eq!(report.frames_sent, 1 + 3 * 2 + 1);
        assert_eq!(report.bytes_sent, 3 * 800);
        assert_eq!(report.responses, 4);
        assert_eq!(report.bytes_received, GREETING_BYTES + 3 * REPLY_BYTES);
    }

    #[tokio::test]
    async fn test_simulate_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = fast_config(format!("ws://{}/api/twilio/media-stream", addr));
        let err = run(&config).await.unwrap_err();
        assert_eq!(err.kind(), "transport_failure");
    }
}
