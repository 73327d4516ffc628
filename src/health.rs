use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port,
            "media_stream_url": config.advertised_stream_url()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "active_calls": metrics.active_calls
        },
        "collaborators": {
            "transcriber": state.transcriber.name(),
            "responder": state.responder.name()
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "calls": call_stats(&metrics),
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn call_stats(metrics: &AppMetrics) -> serde_json::Value {
    json!({
        "active_calls": metrics.active_calls,
        "total_calls": metrics.total_calls,
        "media_frames_received": metrics.media_frames_received,
        "media_bytes_received": metrics.media_bytes_received,
        "responses_sent": metrics.responses_sent,
        "transcripts": metrics.transcripts,
        "malformed_envelopes": metrics.malformed_envelopes
    })
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                let kb = || {
                    line.split_whitespace()
                        .nth(1)
                        .and_then(|kb| kb.parse::<u64>().ok())
                        .unwrap_or(0)
                        * 1024
                };
                if line.starts_with("VmRSS:") {
                    vm_rss = kb();
                } else if line.starts_with("VmSize:") {
                    vm_size = kb();
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "pid": process::id()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LevelTranscriber, ToneResponder};
    use crate::config::AppConfig;
    use actix_web::{test, App};

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState::new(
            AppConfig::default(),
            LevelTranscriber,
            ToneResponder::default(),
        ))
    }

    #[actix_web::test]
    async fn test_health_reports_collaborators() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["collaborators"]["transcriber"], "level");
        assert_eq!(
            body["service"]["media_stream_url"],
            "ws://127.0.0.1:8000/api/twilio/media-stream"
        );
    }

    #[actix_web::test]
    async fn test_metrics_include_call_counters() {
        let state = state();
        state.call_started();
        state.record_malformed_envelope();

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["calls"]["total_calls"], 1);
        assert_eq!(body["calls"]["malformed_envelopes"], 1);
    }
}
