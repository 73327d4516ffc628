//! # Media Envelope Adapter
//!
//! Wraps μ-law audio into the JSON envelope exchanged on the media-stream
//! channel, and unwraps inbound envelopes to their payload bytes.
//!
//! ## Wire Format:
//! ```json
//! {"event":"start","streamSid":"MZ1","start":{"callSid":"CA1","streamSid":"MZ1","from":"+1…","to":"+1…","customParameters":{"caller_email":"…"}}}
//! {"event":"media","streamSid":"MZ1","media":{"payload":"//7+/Q=="}}
//! {"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}
//! ```
//!
//! Session metadata on start/stop is opaque pass-through data. The adapter
//! owns no chunking or pacing; see `media::call` and `transport` for that.

use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Discriminator of a media envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Media,
    Stop,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Media => "media",
            EventKind::Stop => "stop",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message on the media-stream channel, tagged by its `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaEnvelope {
    /// Session start with caller/callee metadata
    Start {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(rename = "sequenceNumber", default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<String>,
        start: StartMetadata,
    },

    /// One chunk of base64 μ-law audio
    Media {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(rename = "sequenceNumber", default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<String>,
        #[serde(default)]
        media: MediaPayload,
    },

    /// Session end
    Stop {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(rename = "sequenceNumber", default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<String>,
        #[serde(default)]
        stop: StopMetadata,
    },
}

/// Metadata carried by a `start` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub custom_parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_format: Option<MediaFormat>,
}

/// Audio format announced in a `start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for MediaFormat {
    fn default() -> Self {
        Self {
            encoding: "audio/x-mulaw".to_string(),
            sample_rate: crate::audio::SAMPLE_RATE,
            channels: 1,
        }
    }
}

/// Body of a `media` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64 text of the raw μ-law bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Metadata carried by a `stop` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
}

/// An inbound envelope after parsing: the three things callers look at, plus
/// the full envelope for anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub kind: EventKind,
    pub stream_id: Option<String>,
    /// Decoded μ-law bytes; only ever set for `media` events with a payload
    pub payload: Option<Vec<u8>>,
    pub envelope: MediaEnvelope,
}

impl MediaEnvelope {
    /// Build a `start` envelope. The stream id is written both at the top
    /// level and inside the start metadata.
    pub fn start(stream_sid: impl Into<String>, mut metadata: StartMetadata) -> Self {
        let stream_sid = stream_sid.into();
        if metadata.stream_sid.is_none() {
            metadata.stream_sid = Some(stream_sid.clone());
        }
        MediaEnvelope::Start {
            stream_sid: Some(stream_sid),
            sequence_number: None,
            start: metadata,
        }
    }

    /// Build a `media` envelope around raw μ-law bytes.
    pub fn media(stream_sid: impl Into<String>, mulaw: &[u8]) -> Self {
        MediaEnvelope::Media {
            stream_sid: Some(stream_sid.into()),
            sequence_number: None,
            media: MediaPayload {
                payload: Some(BASE64.encode(mulaw)),
                ..MediaPayload::default()
            },
        }
    }

    /// Build a `stop` envelope.
    pub fn stop(stream_sid: impl Into<String>, call_sid: Option<String>) -> Self {
        MediaEnvelope::Stop {
            stream_sid: Some(stream_sid.into()),
            sequence_number: None,
            stop: StopMetadata {
                call_sid,
                account_sid: None,
            },
        }
    }

    /// Attach a `sequenceNumber`.
    pub fn with_sequence_number(mut self, number: u64) -> Self {
        let value = Some(number.to_string());
        match &mut self {
            MediaEnvelope::Start { sequence_number, .. }
            | MediaEnvelope::Media { sequence_number, .. }
            | MediaEnvelope::Stop { sequence_number, .. } => *sequence_number = value,
        }
        self
    }

    pub fn kind(&self) -> EventKind {
        match self {
            MediaEnvelope::Start { .. } => EventKind::Start,
            MediaEnvelope::Media { .. } => EventKind::Media,
            MediaEnvelope::Stop { .. } => EventKind::Stop,
        }
    }

    /// Stream identifier: the top-level `streamSid`, or for `start` events
    /// without one, `start.streamSid`.
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            MediaEnvelope::Start { stream_sid, start, .. } => {
                stream_sid.as_deref().or(start.stream_sid.as_deref())
            }
            MediaEnvelope::Media { stream_sid, .. } | MediaEnvelope::Stop { stream_sid, .. } => {
                stream_sid.as_deref()
            }
        }
    }

    /// Decoded payload bytes of a `media` event, `None` for other events or a
    /// media event without a payload field.
    pub fn payload_bytes(&self) -> AppResult<Option<Vec<u8>>> {
        match self {
            MediaEnvelope::Media { media, .. } => match &media.payload {
                Some(text) => Ok(Some(BASE64.decode(text)?)),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Serialize to the JSON text sent on the channel.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("cannot serialize {} envelope: {}", self.kind(), e)))
    }
}

/// Serialize an envelope from its three essential parts.
///
/// `payload` is required for `media` and ignored for `start`/`stop`, which
/// carry only the stream id in their metadata.
pub fn serialize(kind: EventKind, stream_id: &str, payload: Option<&[u8]>) -> AppResult<String> {
    let envelope = match kind {
        EventKind::Start => MediaEnvelope::start(stream_id, StartMetadata::default()),
        EventKind::Media => {
            let bytes = payload.ok_or_else(|| {
                AppError::ValidationError("media envelope requires a payload".to_string())
            })?;
            MediaEnvelope::media(stream_id, bytes)
        }
        EventKind::Stop => MediaEnvelope::stop(stream_id, None),
    };
    envelope.to_json()
}

/// Parse an inbound envelope.
///
/// ## Errors:
/// `MalformedEnvelope` when the text is not JSON, the `event` field is
/// missing or unknown, a known section has the wrong shape, or the media
/// payload is not valid base64. The channel is unaffected; the caller decides
/// whether to skip the message.
pub fn deserialize(text: &str) -> AppResult<InboundFrame> {
    let envelope: MediaEnvelope = serde_json::from_str(text)?;
    let payload = envelope.payload_bytes()?;

    Ok(InboundFrame {
        kind: envelope.kind(),
        stream_id: envelope.stream_id().map(str::to_string),
        payload,
        envelope,
    })
}
