//! # Media Stream Framing
//!
//! The JSON envelope spoken on the media-stream channel and the call identity
//! that fills in its start/stop metadata.

pub mod call;      // CallIdentity, start/stop envelopes, chunking into media frames
pub mod envelope;  // MediaEnvelope serialize/deserialize
