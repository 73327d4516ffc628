//! # Pre-flight Checks
//!
//! Verifies that a deployment is ready to take calls before anyone dials in:
//! credentials are present, the media-stream URL has the right shape, the
//! agent answers its health probe and its voice webhook returns TwiML.
//!
//! Each check produces a [`CheckResult`]; `run` prints them and a PASS/FAIL
//! summary.

use crate::config::AppConfig;
use crate::console;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Path every media-stream URL must contain.
pub const MEDIA_STREAM_PATH: &str = "/api/twilio/media-stream";

/// Path of the voice webhook, relative to the agent's base URL.
pub const VOICE_WEBHOOK_PATH: &str = "/api/twilio/webhook/voice";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// One line of check output.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    Pass(String),
    Warn(String),
    Info(String),
    Fail(String),
}

/// Outcome of a single named check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub findings: Vec<Finding>,
}

impl CheckResult {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            findings: Vec::new(),
        }
    }

    /// A check passes when none of its findings is a failure.
    pub fn passed(&self) -> bool {
        !self.findings.iter().any(|f| matches!(f, Finding::Fail(_)))
    }

    fn print(&self) {
        for finding in &self.findings {
            match finding {
                Finding::Pass(msg) => console::success(msg),
                Finding::Warn(msg) => console::warning(msg),
                Finding::Info(msg) => console::info(msg),
                Finding::Fail(msg) => console::failure(msg),
            }
        }
    }
}

/// Every required variable must be set and non-empty. Values are shown
/// masked.
pub fn check_env<F>(required: &[String], lookup: F) -> CheckResult
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = CheckResult::new("Environment Variables");
    let mut missing = 0;

    for name in required {
        match lookup(name).filter(|value| !value.is_empty()) {
            Some(value) => result
                .findings
                .push(Finding::Pass(format!("{}: {}", name, console::mask(&value)))),
            None => {
                missing += 1;
                result.findings.push(Finding::Fail(format!("{} is missing", name)));
            }
        }
    }

    if missing > 0 {
        result.findings.push(Finding::Fail(format!(
            "Missing {} required environment variables",
            missing
        )));
    } else {
        result
            .findings
            .push(Finding::Pass("All environment variables present".to_string()));
    }

    result
}

/// The media-stream URL must be `wss://` and end in the media-stream path.
/// `ws://` passes with a warning when `allow_insecure` is set.
pub fn check_stream_url(url: &str, allow_insecure: bool) -> CheckResult {
    let mut result = CheckResult::new("WebSocket URL Format");

    if url.starts_with("ws://") && allow_insecure {
        result
            .findings
            .push(Finding::Warn(format!("Insecure WebSocket URL accepted: {}", url)));
    } else if !url.starts_with("wss://") {
        result
            .findings
            .push(Finding::Fail("WebSocket URL must start with 'wss://'".to_string()));
        return result;
    }

    if !url.contains(MEDIA_STREAM_PATH) {
        result.findings.push(Finding::Fail(format!(
            "WebSocket URL must include '{}' path",
            MEDIA_STREAM_PATH
        )));
        result.findings.push(Finding::Warn(format!("Current URL: {}", url)));
        result.findings.push(Finding::Info(format!(
            "Should be: wss://your-domain.ngrok-free.dev{}",
            MEDIA_STREAM_PATH
        )));
        return result;
    }

    result
        .findings
        .push(Finding::Pass(format!("WebSocket URL format correct: {}", url)));
    result
}

/// Voice webhook URL served by the same host as the media stream.
pub fn webhook_url(stream_url: &str) -> String {
    let base = stream_url
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1)
        .replace(MEDIA_STREAM_PATH, "");
    format!("{}{}", base.trim_end_matches('/'), VOICE_WEBHOOK_PATH)
}

/// `GET` the health URL; only 200 passes.
pub async fn check_health(client: &Client, url: &str) -> CheckResult {
    let mut result = CheckResult::new("Server Running");

    match client.get(url).timeout(HEALTH_TIMEOUT).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            result
                .findings
                .push(Finding::Pass("Server is running and responding".to_string()));
        }
        Ok(response) => {
            result
                .findings
                .push(Finding::Fail(format!("Server returned status {}", response.status())));
        }
        Err(e) => {
            debug!(error = %e, url, "Health probe failed");
            result.findings.push(Finding::Fail("Server is NOT running".to_string()));
            result.findings.push(Finding::Info(format!("Nothing answered at {}", url)));
        }
    }

    result
}

/// `POST` a call notification to the voice webhook and expect TwiML back.
pub async fn check_webhook(client: &Client, url: &str, to_number: &str) -> CheckResult {
    let mut result = CheckResult::new("Webhook Endpoint");
    result.findings.push(Finding::Info(format!("Testing: {}", url)));

    let form = [("From", "+1234567890"), ("To", to_number), ("CallSid", "TEST123")];

    let response = match client.post(url).form(&form).timeout(WEBHOOK_TIMEOUT).send().await {
        Ok(response) => response,
        Err(e) => {
            result.findings.push(Finding::Fail(format!("Cannot reach webhook: {}", e)));
            result.findings.push(Finding::Warn(
                "Make sure the tunnel is running and WEBSOCKET_URL is correct".to_string(),
            ));
            return result;
        }
    };

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        result
            .findings
            .push(Finding::Fail(format!("Webhook returned status {}", status)));
        return result;
    }

    match response.text().await {
        Ok(body) if body.contains("<Response>") => result.findings.push(Finding::Pass(
            "Webhook endpoint responding with valid TwiML".to_string(),
        )),
        Ok(_) => result
            .findings
            .push(Finding::Fail("Webhook responded but no TwiML found".to_string())),
        Err(e) => result
            .findings
            .push(Finding::Fail(format!("Cannot read webhook response: {}", e))),
    }

    result
}

/// Run every check, print findings and the summary. Returns true when all
/// checks passed.
pub async fn run(config: &AppConfig) -> bool {
    console::header("VOICE AGENT - PRE-FLIGHT CHECKS");

    let client = Client::new();
    let to_number = std::env::var("TWILIO_PHONE_NUMBER").unwrap_or_else(|_| "+10000000000".to_string());

    let mut results = Vec::new();

    console::info("Checking environment variables...");
    record(&mut results, check_env(&config.preflight.required_env, |name| std::env::var(name).ok()));

    console::info("Checking WebSocket URL format...");
    record(&mut results, check_stream_url(&config.stream.url, config.preflight.allow_insecure));

    console::info("Checking if server is running...");
    record(&mut results, check_health(&client, &config.preflight.health_url).await);

    console::info("Checking webhook endpoint...");
    record(&mut results, check_webhook(&client, &webhook_url(&config.stream.url), &to_number).await);

    let summary: Vec<(String, bool)> = results
        .iter()
        .map(|result| (result.name.to_string(), result.passed()))
        .collect();
    console::summary(&summary)
}

fn record(results: &mut Vec<CheckResult>, result: CheckResult) {
    result.print();
    results.push(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_env_all_present() {
        let values: HashMap<&str, &str> = [("A_KEY", "sk-0123456789abcdefghijklmnop"), ("B", "x")]
            .into_iter()
            .collect();
        let result = check_env(&required(&["A_KEY", "B"]), |name| {
            values.get(name).map(|v| v.to_string())
        });

        assert!(result.passed());
        assert_eq!(
            result.findings[0],
            Finding::Pass("A_KEY: sk-0123456789abcdefg...".to_string())
        );
    }

    #[test]
    fn test_env_missing_or_empty() {
        let result = check_env(&required(&["PRESENT", "EMPTY", "ABSENT"]), |name| match name {
            "PRESENT" => Some("value".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        });

        assert!(!result.passed());
        let failures = result
            .findings
            .iter()
            .filter(|f| matches!(f, Finding::Fail(_)))
            .count();
        // two missing variables plus the tally line
        assert_eq!(failures, 3);
    }

    #[test]
    fn test_stream_url_rules() {
        assert!(check_stream_url("wss://agent.example.com/api/twilio/media-stream", false).passed());
        assert!(!check_stream_url("ws://127.0.0.1:8000/api/twilio/media-stream", false).passed());
        assert!(!check_stream_url("wss://agent.example.com/ws", false).passed());

        let insecure = check_stream_url("ws://127.0.0.1:8000/api/twilio/media-stream", true);
        assert!(insecure.passed());
        assert!(matches!(insecure.findings[0], Finding::Warn(_)));
    }

    #[test]
    fn test_webhook_url_derivation() {
        assert_eq!(
            webhook_url("wss://agent.example.com/api/twilio/media-stream"),
            "https://agent.example.com/api/twilio/webhook/voice"
        );
        assert_eq!(
            webhook_url("ws://127.0.0.1:8000/api/twilio/media-stream"),
            "http://127.0.0.1:8000/api/twilio/webhook/voice"
        );
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = check_health(&Client::new(), &format!("http://{}/health", addr)).await;
        assert!(!result.passed());
        assert_eq!(result.name, "Server Running");
    }

    #[tokio::test]
    async fn test_webhook_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/api/twilio/webhook/voice", addr);
        let result = check_webhook(&Client::new(), &url, "+10000000000").await;
        assert!(!result.passed());
    }
}
