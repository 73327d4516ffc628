//! # Configuration Management
//!
//! This module handles loading and managing configuration from multiple sources:
//! - `.env` file (loaded in `main` with `dotenv`)
//! - TOML configuration files (`config.toml`, or the file given with `--config`)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! The configuration is an explicit structure handed to the channel client,
//! the scenarios, the pre-flight checks and the loopback server. Nothing in the
//! codec or the envelope adapter reads it.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Command line (`--url`)
//! 2. Deployment variables (`WEBSOCKET_URL`, `HOST`, `PORT`)
//! 3. Environment variables (APP_STREAM__URL, APP_SERVER__PORT, etc.)
//! 4. Configuration file
//! 5. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::collections::BTreeMap;
use std::env;                    // For reading environment variables
use std::path::Path;

/// Main application configuration that contains all settings.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: Automatically implements common traits:
///   - `Debug`: Allows printing with {:?} for debugging
///   - `Clone`: Allows making copies of the struct
///   - `Serialize`: Can convert this struct to TOML (see `print-config`)
///   - `Deserialize`: Can create this struct from TOML and environment values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub audio: AudioConfig,
    pub timing: TimingConfig,
    pub server: ServerConfig,
    pub preflight: PreflightConfig,
}

/// Where to connect and who the simulated call claims to be.
///
/// ## Fields:
/// - `url`: media-stream WebSocket endpoint (`wss://…/api/twilio/media-stream`)
/// - `stream_sid`: stream identifier put on every envelope
/// - `call_sid`: call identifier; when unset a `SIM_TEST_<unix-seconds>` value is generated
/// - `from` / `to`: caller and callee numbers carried in the start envelope
/// - `caller_email`: forwarded as the `caller_email` custom parameter
/// - `custom_parameters`: any extra key/value pairs for `customParameters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    pub stream_sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_email: Option<String>,
    #[serde(default)]
    pub custom_parameters: BTreeMap<String, String>,
}

/// Audio framing policy used by the callers of the codec.
///
/// ## Fields:
/// - `sample_rate`: canonical PCM rate on both sides of the codec (8000 Hz)
/// - `chunk_bytes`: μ-law bytes per media frame for synthetic calls (640 = 80ms)
/// - `file_chunk_bytes`: μ-law bytes per media frame when streaming a file (160 = 20ms)
/// - `chunk_interval_ms`: pause between consecutive media frames
/// - `utterance_secs`: length of each synthetic utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_bytes: usize,
    pub file_chunk_bytes: usize,
    pub chunk_interval_ms: u64,
    pub utterance_secs: f32,
}

/// Waits and timeouts for the scripted scenarios (all in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause after the start envelope so the agent can greet
    pub greeting_wait_secs: u64,
    /// Longest wait for a single inbound message
    pub receive_timeout_secs: u64,
    /// Longest wait for a complete AI response after streaming a file
    pub response_timeout_secs: u64,
    /// Silence after which a partially received response counts as complete
    pub quiet_gap_secs: u64,
    /// Wait after the last utterance before sending stop
    pub final_wait_secs: u64,
    /// Wait after stop before closing the channel
    pub stop_grace_secs: u64,
}

/// Settings for the loopback media-stream server (`serve`).
///
/// ## Fields:
/// - `host` / `port`: bind address
/// - `public_url`: media-stream URL advertised in the voice webhook TwiML;
///   defaults to `ws://<host>:<port>/api/twilio/media-stream`
/// - `processing_interval_ms`: minimum time between two responses
/// - `min_processing_bytes`: buffered μ-law needed before responding (3000 ≈ 0.4s)
/// - `final_flush_bytes`: leftover audio at `stop` larger than this is still transcribed
/// - `idle_timeout_secs`: a call silent for this long is closed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub processing_interval_ms: u64,
    pub min_processing_bytes: usize,
    pub final_flush_bytes: usize,
    pub idle_timeout_secs: u64,
}

/// Settings for the `check` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    pub health_url: String,
    pub required_env: Vec<String>,
    /// Accept `ws://` URLs (local loopback server) with a warning instead of failing
    pub allow_insecure: bool,
}

/// Provides default configuration values.
///
/// These mirror the values the call simulators have always used, so the tool
/// runs against a local agent with no configuration file at all.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                url: "ws://127.0.0.1:8000/api/twilio/media-stream".to_string(),
                stream_sid: "SIM_STREAM_001".to_string(),
                call_sid: None,
                from: "+1234567890".to_string(),
                to: "+13614507995".to_string(),
                caller_email: Some("customer@example.com".to_string()),
                custom_parameters: BTreeMap::new(),
            },
            audio: AudioConfig {
                sample_rate: 8000,        // Telephony rate
                chunk_bytes: 640,         // 80ms of μ-law at 8kHz
                file_chunk_bytes: 160,    // 20ms of μ-law at 8kHz
                chunk_interval_ms: 20,
                utterance_secs: 8.0,
            },
            timing: TimingConfig {
                greeting_wait_secs: 3,
                receive_timeout_secs: 15,
                response_timeout_secs: 20,
                quiet_gap_secs: 2,
                final_wait_secs: 4,
                stop_grace_secs: 2,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only
                port: 8000,
                public_url: None,
                processing_interval_ms: 2000,
                min_processing_bytes: 3000,
                final_flush_bytes: 8000,
                idle_timeout_secs: 20,
            },
            preflight: PreflightConfig {
                health_url: "http://localhost:8000/health".to_string(),
                required_env: [
                    "OPENAI_API_KEY",
                    "ELEVENLABS_API_KEY",
                    "ELEVENLABS_VOICE_ID",
                    "TWILIO_ACCOUNT_SID",
                    "TWILIO_AUTH_TOKEN",
                    "TWILIO_PHONE_NUMBER",
                    "WEBSOCKET_URL",
                    "SUPABASE_URL",
                    "SUPABASE_KEY",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                allow_insecure: false,
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from the config file (`config.toml` if `path` is None)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for WEBSOCKET_URL, HOST and PORT
    ///
    /// ## Environment Variable Examples:
    /// - `APP_STREAM__URL=wss://agent.example.com/api/twilio/media-stream`
    /// - `APP_AUDIO__CHUNK_BYTES=320`
    /// - `APP_SERVER__PORT=9000`
    /// - `WEBSOCKET_URL=wss://…`: the variable the agent itself is configured with
    ///
    /// The double underscore separates nesting levels so field names may keep
    /// their own underscores.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_source = match path {
            // An explicit file must exist
            Some(path) => config::File::from(path).required(true),
            // config.toml next to the binary is optional
            None => config::File::with_name("config").required(false),
        };

        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file_source)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        if let Ok(url) = env::var("WEBSOCKET_URL") {
            settings = settings.set_override("stream.url", url)?;
        }

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - The stream URL is a WebSocket URL
    /// - Sample rate and chunk sizes are non-zero, utterance length is finite and positive
    /// - Server port is not 0
    pub fn validate(&self) -> Result<()> {
        if !(self.stream.url.starts_with("ws://") || self.stream.url.starts_with("wss://")) {
            return Err(anyhow::anyhow!(
                "Stream URL must start with ws:// or wss://, got '{}'",
                self.stream.url
            ));
        }

        if self.stream.stream_sid.is_empty() {
            return Err(anyhow::anyhow!("Stream SID cannot be empty"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.audio.chunk_bytes == 0 || self.audio.file_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Chunk sizes must be greater than 0"));
        }

        if !(self.audio.utterance_secs > 0.0 && self.audio.utterance_secs.is_finite()) {
            return Err(anyhow::anyhow!("Utterance length must be a positive number of seconds"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Idle timeout must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Custom parameters sent in the start envelope: the configured map plus
    /// `caller_email` when one is set.
    pub fn custom_parameters(&self) -> BTreeMap<String, String> {
        let mut params = self.stream.custom_parameters.clone();
        if let Some(email) = &self.stream.caller_email {
            params.insert("caller_email".to_string(), email.clone());
        }
        params
    }

    /// Media-stream URL the loopback server advertises in its TwiML.
    pub fn advertised_stream_url(&self) -> String {
        self.server.public_url.clone().unwrap_or_else(|| {
            format!(
                "ws://{}:{}/api/twilio/media-stream",
                self.server.host, self.server.port
            )
        })
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Tests for the configuration module.
#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module
    use std::io::Write;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 8000);
        assert_eq!(config.audio.chunk_bytes, 640);
        assert_eq!(config.stream.stream_sid, "SIM_STREAM_001");
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;  // Invalid port
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.stream.url = "https://agent.example.com/api/twilio/media-stream".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.chunk_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_utterance_length_must_be_finite() {
        for bad in [0.0, -1.0, f32::INFINITY, f32::NAN] {
            let mut config = AppConfig::default();
            config.audio.utterance_secs = bad;
            assert!(config.validate().is_err(), "accepted utterance_secs = {}", bad);
        }
    }

    #[test]
    fn test_caller_email_joins_custom_parameters() {
        let mut config = AppConfig::default();
        config
            .stream
            .custom_parameters
            .insert("From".to_string(), "+15550001111".to_string());

        let params = config.custom_parameters();
        assert_eq!(params.get("caller_email").map(String::as_str), Some("customer@example.com"));
        assert_eq!(params.get("From").map(String::as_str), Some("+15550001111"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[stream]\nurl = \"wss://agent.example.com/api/twilio/media-stream\"\nstream_sid = \"MZ123\"\n\n[audio]\nchunk_bytes = 320"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.stream.stream_sid, "MZ123");
        assert_eq!(config.audio.chunk_bytes, 320);
        // Untouched fields keep their defaults
        assert_eq!(config.audio.file_chunk_bytes, 160);
        assert_eq!(config.timing.receive_timeout_secs, 15);
    }

    #[test]
    fn test_to_toml_renders_sections() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[stream]"));
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("chunk_bytes = 640"));
    }

    #[test]
    fn test_advertised_stream_url() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.advertised_stream_url(),
            "ws://127.0.0.1:8000/api/twilio/media-stream"
        );
        config.server.public_url = Some("wss://tunnel.example.dev/api/twilio/media-stream".into());
        assert_eq!(
            config.advertised_stream_url(),
            "wss://tunnel.example.dev/api/twilio/media-stream"
        );
    }
}
