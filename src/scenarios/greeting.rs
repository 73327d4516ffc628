//! Greeting check: open a call and keep the first audio the agent sends.

use super::{save_mulaw_as_wav, ScenarioReport};
use crate::audio::{codec, pcm};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::media::call::CallIdentity;
use crate::media::envelope::EventKind;
use crate::transport::MediaStreamClient;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Send a start envelope, wait for the first media payload, and save it to
/// `output` as a WAV file.
///
/// No greeting within `timing.receive_timeout_secs` is not an error; the
/// report simply shows zero responses.
pub async fn run(config: &AppConfig, output: &Path) -> AppResult<ScenarioReport> {
    let identity = CallIdentity::from_config(config);
    let mut report = ScenarioReport {
        scenario: "greeting",
        call_sid: identity.call_sid.clone(),
        ..ScenarioReport::default()
    };

    let mut client = MediaStreamClient::connect(&config.stream.url).await?;
    client.send(&identity.start_envelope()).await?;
    info!(call_sid = %identity.call_sid, "Start event sent, waiting for greeting");

    let timeout = Duration::from_secs(config.timing.receive_timeout_secs);
    let greeting = loop {
        match client.next_frame(timeout).await? {
            None => break None,
            Some(frame) if frame.kind == EventKind::Media => {
                if let Some(payload) = frame.payload.filter(|p| !p.is_empty()) {
                    break Some(payload);
                }
            }
            Some(frame) => {
                info!(event = %frame.kind, "Ignoring non-media envelope");
            }
        }
    };

    match greeting {
        Some(mulaw) => {
            let samples = save_mulaw_as_wav(output, &mulaw, config.audio.sample_rate)?;
            report.responses = 1;
            report.bytes_received = mulaw.len();
            report.saved_files.push(output.to_path_buf());
            report.notes.push(format!(
                "{} samples, {:.2}s, peak {:.1} dBFS",
                samples.len(),
                pcm::duration_secs(samples.len(), config.audio.sample_rate),
                pcm::peak_dbfs(&codec::decode_to_f32(&mulaw))
            ));
        }
        None => {
            warn!(timeout_secs = config.timing.receive_timeout_secs, "Timed out waiting for greeting");
            report.notes.push("Timed out waiting for audio".to_string());
        }
    }

    client.send(&identity.stop_envelope()).await?;
    report.frames_sent = client.frames_sent();
    report.bytes_sent = client.bytes_sent();
    client.close().await;

    Ok(report)
}
