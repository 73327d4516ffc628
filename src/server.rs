//! # Loopback Server
//!
//! A local stand-in for the voice agent, so the scripted calls and the
//! pre-flight checks can be exercised without the real deployment.
//!
//! ## Routes:
//! - `GET  /health`, `GET /api/v1/health`: liveness and counters
//! - `GET  /api/v1/metrics`: per-endpoint and per-call statistics
//! - `GET  /api/v1/config`: effective configuration
//! - `POST /api/twilio/webhook/voice`: TwiML pointing at the media stream
//! - `POST /api/twilio/webhook/status`: call status callbacks
//! - `GET  /api/twilio/media-stream`: the media-stream WebSocket
//!
//! ## Middleware order:
//! Middleware wraps from the inside out, so the last `.wrap()` runs first on
//! the way in. Request ids are assigned before metrics and tracing see the
//! request.

use crate::collaborators::{LevelTranscriber, ToneResponder};
use crate::config::AppConfig;
use crate::middleware::{MetricsMiddleware, RequestLogging};
use crate::state::AppState;
use crate::{handlers, health, websocket};

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;

/// Register every route of the loopback server.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(handlers::get_config)),
    )
    .service(
        web::scope("/api/twilio")
            .route("/webhook/voice", web::post().to(handlers::voice_webhook))
            .route("/webhook/status", web::post().to(handlers::status_webhook))
            .route("/media-stream", web::get().to(websocket::media_stream)),
    )
    // Also at root level, where deployment health probes expect it
    .route("/health", web::get().to(health::health_check));
}

/// The full application: shared state, middleware and routes.
///
/// ## Rust Concepts:
/// - **impl Trait in return position**: `App`'s type grows with every
///   `.wrap()`; `impl ServiceFactory<…>` hides it from callers
pub fn app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    // The provider and browser dashboards call from other origins
    let cors = Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    App::new()
        .app_data(state)
        .wrap(cors)
        .wrap(TracingLogger::default())
        .wrap(MetricsMiddleware)
        .wrap(RequestLogging)
        .configure(routes)
}

/// State for a server run with the built-in stand-in collaborators.
pub fn default_state(config: AppConfig) -> web::Data<AppState> {
    let responder = ToneResponder {
        sample_rate: config.audio.sample_rate,
        ..ToneResponder::default()
    };
    web::Data::new(AppState::new(config, LevelTranscriber, responder))
}

/// Run the loopback server until it fails or Ctrl+C is pressed.
///
/// ## Shutdown:
/// `tokio::select!` races the server against the interrupt signal; on
/// Ctrl+C open calls get a graceful stop.
pub async fn run(config: AppConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let stream_url = config.advertised_stream_url();
    let state = default_state(config);

    info!(
        transcriber = state.transcriber.name(),
        responder = state.responder.name(),
        "Collaborators ready"
    );

    let server = HttpServer::new(move || app(state.clone()))
        .bind(&bind_addr)?
        .run();

    info!(addr = %bind_addr, media_stream = %stream_url, "Loopback server listening");

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task error"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}
