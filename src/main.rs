//! # Media Stream Probe - Main Application Entry Point
//!
//! A test harness for voice agents that speak the telephony media-stream
//! protocol: JSON envelopes carrying base64 8kHz μ-law audio over a WebSocket.
//!
//! ## What it can do:
//! - **simulate / greeting / exchange**: place scripted calls against an agent
//! - **check**: pre-flight checks before real calls are routed to a deployment
//! - **serve**: run a local loopback agent to test against
//! - **encode / decode**: convert between WAV files and raw μ-law
//!
//! ## Application Architecture:
//! - **audio**: μ-law codec, PCM helpers, WAV files, synthetic speech
//! - **media**: envelope adapter and call identity
//! - **transport**: the WebSocket client side of a call
//! - **scenarios**: scripted call sequences
//! - **preflight**: environment and endpoint checks
//! - **server**, **websocket**, **handlers**, **health**, **middleware**, **state**:
//!   the loopback server
//! - **config**, **error**, **cli**, **console**: shared plumbing

mod audio;          // μ-law codec and audio helpers (audio/ directory)
mod cli;            // Command-line arguments (cli.rs)
mod collaborators;  // Transcriber / response generator traits (collaborators.rs)
mod config;         // Configuration management (config.rs)
mod console;        // Coloured status output (console.rs)
mod error;          // Error handling types (error.rs)
mod handlers;       // HTTP request handlers (handlers/ directory)
mod health;         // Health check endpoints (health.rs)
mod media;          // Media envelopes and call identity (media/ directory)
mod middleware;     // Custom middleware (middleware/ directory)
mod preflight;      // Pre-flight checks (preflight.rs)
mod scenarios;      // Scripted calls (scenarios/ directory)
mod server;         // Loopback server bootstrap (server.rs)
mod state;          // Loopback server state (state.rs)
mod transport;      // Media-stream WebSocket client (transport.rs)
mod websocket;      // Media-stream WebSocket actor (websocket.rs)

use anyhow::Result;
use audio::wav;
use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;
use error::AppResult;
use scenarios::ScenarioReport;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads `.env`** so deployment variables like `WEBSOCKET_URL` are visible
/// 2. **Parses the command line**
/// 3. **Sets up logging**
/// 4. **Loads and validates configuration** (file, environment, `--url`)
/// 5. **Runs the selected command**
///
/// ## Rust Concepts:
/// - `#[actix_web::main]`: sets up the async runtime the loopback server and the
///   WebSocket client both run on
/// - `?`: any error ends the program with a non-zero exit code and the message
#[actix_web::main]
async fn main() -> Result<()> {
    // .ok() means "ignore errors" - it's fine if there's no .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.stream.url = url;
    }
    config.validate()?;

    info!("Starting media-stream-probe v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Simulate => {
            console::header("VOICE AGENT - SIMULATED CALL");
            report(scenarios::simulate::run(&config).await)?;
        }
        Commands::Greeting { output } => {
            console::header("VOICE AGENT - GREETING CHECK");
            report(scenarios::greeting::run(&config, &output).await)?;
        }
        Commands::Exchange { file, output_dir } => {
            console::header("VOICE AGENT - FULL EXCHANGE");
            report(scenarios::exchange::run(&config, &file, &output_dir).await)?;
        }
        Commands::Check => {
            if !preflight::run(&config).await {
                std::process::exit(1);
            }
        }
        Commands::Serve => server::run(config).await?,
        Commands::Encode { input, output } => {
            let mulaw = wav::load_as_mulaw(&input, config.audio.sample_rate)?;
            std::fs::write(&output, &mulaw)?;
            console::success(&format!(
                "{} bytes of μ-law written to {}",
                mulaw.len(),
                output.display()
            ));
        }
        Commands::Decode { input, output } => {
            let mulaw = std::fs::read(&input)?;
            let samples = wav::save_mulaw(&output, &mulaw, config.audio.sample_rate)?;
            console::success(&format!(
                "{} samples written to {}",
                samples,
                output.display()
            ));
        }
        Commands::PrintConfig => print!("{}", config.to_toml()?),
    }

    Ok(())
}

/// Print a scenario outcome. Failures are shown on the console and returned
/// so the process exits non-zero.
fn report(result: AppResult<ScenarioReport>) -> Result<()> {
    match result {
        Ok(report) => {
            console::scenario_report(&report);
            Ok(())
        }
        Err(e) => {
            console::failure(&e.to_string());
            Err(e.into())
        }
    }
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "media_stream_probe=debug")
/// - If not set, defaults to "media_stream_probe=info,actix_web=info"
///   (`--verbose` turns the crate level up to debug)
fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "media_stream_probe=debug,actix_web=info"
    } else {
        "media_stream_probe=info,actix_web=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
