//! # Telephony Webhooks
//!
//! The provider calls these over plain HTTP before and during a call:
//! - **voice**: a call came in; answer with TwiML that connects the call audio
//!   to our media-stream WebSocket
//! - **status**: the call changed state (ringing, completed, …)
//!
//! Both arrive as `application/x-www-form-urlencoded` bodies.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Fields of the voice webhook this server looks at.
///
/// ## Rust Concepts:
/// - **#[serde(rename_all = "PascalCase")]**: the provider sends `CallSid`, `From`, `To`
/// - **Option<String>**: every field may be missing on a test request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusWebhook {
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub call_duration: Option<String>,
}

/// `POST /api/twilio/webhook/voice`
///
/// ## What this does:
/// 1. Reads caller, callee and call id from the form body
/// 2. Answers with TwiML pointing the call's audio at our media stream
///
/// An unreadable body still gets TwiML, with a spoken apology instead of a
/// stream, so the caller hears something rather than a dead line.
pub async fn voice_webhook(
    state: web::Data<AppState>,
    form: Option<web::Form<VoiceWebhook>>,
) -> HttpResponse {
    let twiml = match form {
        Some(form) => {
            info!(
                call_sid = form.call_sid.as_deref().unwrap_or("unknown"),
                from = form.from.as_deref().unwrap_or("unknown"),
                to = form.to.as_deref().unwrap_or("unknown"),
                "Incoming call"
            );
            stream_twiml(&state.config.advertised_stream_url())
        }
        None => {
            warn!("Voice webhook body could not be read");
            apology_twiml()
        }
    };

    HttpResponse::Ok().content_type("application/xml").body(twiml)
}

/// `POST /api/twilio/webhook/status`
pub async fn status_webhook(form: Option<web::Form<StatusWebhook>>) -> HttpResponse {
    match form {
        Some(form) => info!(
            call_sid = form.call_sid.as_deref().unwrap_or("unknown"),
            status = form.call_status.as_deref().unwrap_or("unknown"),
            duration = form.call_duration.as_deref().unwrap_or("-"),
            "Call status update"
        ),
        None => warn!("Status webhook body could not be read"),
    }

    HttpResponse::Ok().json(json!({ "status": "received" }))
}

/// TwiML that bridges the call audio to `stream_url`.
pub fn stream_twiml(stream_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Connect><Stream url=\"{}\"/></Connect></Response>",
        escape_xml(stream_url)
    )
}

fn apology_twiml() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
     <Response><Say>Sorry, there was an error connecting your call.</Say></Response>"
        .to_string()
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LevelTranscriber, ToneResponder};
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, test, App};

    fn app_state() -> web::Data<AppState> {
        let mut config = AppConfig::default();
        config.server.public_url = Some("wss://agent.example.com/api/twilio/media-stream".into());
        web::Data::new(AppState::new(config, LevelTranscriber, ToneResponder::default()))
    }

    #[actix_web::test]
    async fn test_stream_twiml_escapes_url() {
        let twiml = stream_twiml("wss://a.example/api/twilio/media-stream?x=1&y=2");
        assert!(twiml.contains("<Response><Connect><Stream url=\"wss://a.example/api/twilio/media-stream?x=1&amp;y=2\"/>"));
    }

    #[actix_web::test]
    async fn test_voice_webhook_returns_twiml() {
        let app = test::init_service(
            App::new()
                .app_data(app_state())
                .route("/api/twilio/webhook/voice", web::post().to(voice_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/twilio/webhook/voice")
            .set_form([("From", "+1234567890"), ("To", "+10000000000"), ("CallSid", "TEST123")])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/xml")
        );
        let body = test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("<Response>"));
        assert!(body.contains("wss://agent.example.com/api/twilio/media-stream"));
    }

    #[actix_web::test]
    async fn test_voice_webhook_without_form_apologises() {
        let app = test::init_service(
            App::new()
                .app_data(app_state())
                .route("/api/twilio/webhook/voice", web::post().to(voice_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/twilio/webhook/voice")
            .set_payload("not a form")
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        let body = std::str::from_utf8(&body).unwrap();

        assert!(body.contains("<Say>"));
        assert!(!body.contains("<Stream"));
    }

    #[actix_web::test]
    async fn test_status_webhook() {
        let app = test::init_service(
            App::new().route("/api/twilio/webhook/status", web::post().to(status_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/twilio/webhook/status")
            .set_form([("CallSid", "CA1"), ("CallStatus", "completed")])
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "received");
    }
}
