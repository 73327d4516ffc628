//! Command-line interface for media-stream-probe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Test client and loopback endpoint for voice-agent media streams
#[derive(Parser, Debug)]
#[command(
    name = "media-stream-probe",
    version,
    about = "Test client and loopback endpoint for voice-agent media streams"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Media-stream WebSocket URL (overrides configuration and WEBSOCKET_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Place a synthetic call: three fake utterances, count the AI responses
    Simulate,

    /// Start a call and save the agent's greeting as a WAV file
    Greeting {
        /// Where to write the greeting
        #[arg(long, value_name = "PATH", default_value = "greeting.wav")]
        output: PathBuf,
    },

    /// Full exchange: greeting, stream a WAV file, save the agent's response
    Exchange {
        /// WAV file to stream as the caller's speech
        file: PathBuf,

        /// Directory for the saved greeting and response
        #[arg(long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },

    /// Pre-flight checks: environment, WebSocket URL, server health, voice webhook
    Check,

    /// Run the loopback media-stream server
    Serve,

    /// Convert a WAV file (or raw 16-bit .pcm) to raw 8kHz μ-law
    Encode {
        input: PathBuf,
        output: PathBuf,
    },

    /// Convert raw 8kHz μ-law to a WAV file (or raw 16-bit .pcm)
    Decode {
        input: PathBuf,
        output: PathBuf,
    },

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from(["media-stream-probe", "simulate"]).unwrap();
        assert!(matches!(cli.command, Commands::Simulate));
        assert!(!cli.verbose);
        assert!(cli.url.is_none());
    }

    #[test]
    fn test_parse_exchange_with_globals_after_command() {
        let cli = Cli::try_parse_from([
            "media-stream-probe",
            "exchange",
            "hello.wav",
            "--url",
            "wss://agent.example.com/api/twilio/media-stream",
            "-v",
        ])
        .unwrap();

        match cli.command {
            Commands::Exchange { file, output_dir } => {
                assert_eq!(file, PathBuf::from("hello.wav"));
                assert_eq!(output_dir, PathBuf::from("."));
            }
            other => panic!("Expected Exchange command, got {:?}", other),
        }
        assert!(cli.verbose);
        assert_eq!(
            cli.url.as_deref(),
            Some("wss://agent.example.com/api/twilio/media-stream")
        );
    }

    #[test]
    fn test_parse_greeting_default_output() {
        let cli = Cli::try_parse_from(["media-stream-probe", "greeting"]).unwrap();
        match cli.command {
            Commands::Greeting { output } => assert_eq!(output, PathBuf::from("greeting.wav")),
            other => panic!("Expected Greeting command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_codec_commands() {
        let cli = Cli::try_parse_from(["media-stream-probe", "encode", "in.wav", "out.ulaw"]).unwrap();
        assert!(matches!(cli.command, Commands::Encode { .. }));

        let cli = Cli::try_parse_from(["media-stream-probe", "decode", "in.ulaw", "out.wav"]).unwrap();
        assert!(matches!(cli.command, Commands::Decode { .. }));

        assert!(Cli::try_parse_from(["media-stream-probe", "encode", "in.wav"]).is_err());
    }

    #[test]
    fn test_parse_global_config() {
        let cli =
            Cli::try_parse_from(["media-stream-probe", "--config", "/tmp/probe.toml", "check"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/probe.toml")));
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["media-stream-probe"]).is_err());
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["media-stream-probe", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }
}
