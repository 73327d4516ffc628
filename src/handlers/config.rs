use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration of the running server.
///
/// Read-only: the loopback server is configured at startup and the scripted
/// calls read the same values from their own configuration.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = &state.config;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "media_stream_url": config.advertised_stream_url(),
                "processing_interval_ms": config.server.processing_interval_ms,
                "min_processing_bytes": config.server.min_processing_bytes,
                "final_flush_bytes": config.server.final_flush_bytes,
                "idle_timeout_secs": config.server.idle_timeout_secs
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "encoding": "audio/x-mulaw",
                "channels": 1
            },
            "collaborators": {
                "transcriber": state.transcriber.name(),
                "responder": state.responder.name()
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LevelTranscriber, ToneResponder};
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_get_config() {
        let mut config = AppConfig::default();
        config.server.min_processing_bytes = 1234;
        let state = web::Data::new(AppState::new(config, LevelTranscriber, ToneResponder::default()));

        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["server"]["min_processing_bytes"], 1234);
        assert_eq!(body["config"]["audio"]["sample_rate"], 8000);
        assert_eq!(body["config"]["collaborators"]["responder"], "tone");
    }
}
