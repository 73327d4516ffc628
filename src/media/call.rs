//! # Call Identity
//!
//! Who a simulated call claims to be, and the envelopes that open, carry and
//! close its media stream.

use crate::config::AppConfig;
use crate::media::envelope::{MediaEnvelope, StartMetadata};
use std::collections::BTreeMap;

/// Identity of one simulated call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallIdentity {
    pub call_sid: String,
    pub stream_sid: String,
    pub from: String,
    pub to: String,
    pub custom_parameters: BTreeMap<String, String>,
}

impl CallIdentity {
    /// Build the identity from configuration.
    ///
    /// Without a configured `call_sid` one is generated as
    /// `SIM_TEST_<unix-seconds>`.
    pub fn from_config(config: &AppConfig) -> Self {
        let call_sid = config
            .stream
            .call_sid
            .clone()
            .unwrap_or_else(|| format!("SIM_TEST_{}", chrono::Utc::now().timestamp()));

        Self {
            call_sid,
            stream_sid: config.stream.stream_sid.clone(),
            from: config.stream.from.clone(),
            to: config.stream.to.clone(),
            custom_parameters: config.custom_parameters(),
        }
    }

    /// Envelope that opens the media stream.
    pub fn start_envelope(&self) -> MediaEnvelope {
        MediaEnvelope::start(
            self.stream_sid.clone(),
            StartMetadata {
                call_sid: Some(self.call_sid.clone()),
                stream_sid: Some(self.stream_sid.clone()),
                from: Some(self.from.clone()),
                to: Some(self.to.clone()),
                custom_parameters: self.custom_parameters.clone(),
                ..StartMetadata::default()
            },
        )
    }

    /// Envelope that ends the media stream.
    pub fn stop_envelope(&self) -> MediaEnvelope {
        MediaEnvelope::stop(self.stream_sid.clone(), Some(self.call_sid.clone()))
    }
}

/// Split μ-law audio into media envelopes of `chunk_bytes` each; the last
/// frame carries the remainder.
///
/// `chunk_bytes` must be non-zero; configuration validation guarantees it for
/// every configured chunk size.
pub fn chunk_frames(stream_sid: &str, mulaw: &[u8], chunk_bytes: usize) -> Vec<MediaEnvelope> {
    mulaw
        .chunks(chunk_bytes.max(1))
        .map(|chunk| MediaEnvelope::media(stream_sid, chunk))
        .collect()
}
