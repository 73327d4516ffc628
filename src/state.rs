//! # Loopback Server State
//!
//! Shared state handed to every HTTP handler and every media-stream actor of
//! the loopback server (`serve`).
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Every worker thread of the HTTP server gets its own clone of `AppState`
//! - Cloning an `Arc` only bumps a counter, the data itself is shared
//!
//! ### RwLock (Reader-Writer Lock)
//! - Many readers (the `/metrics` handler) OR one writer (a call recording a frame)
//! - The counters are tiny, so locks are held for a few instructions only
//!
//! ### Trait objects (`Arc<dyn Transcriber>`)
//! - The server does not care which speech-to-text service is behind the trait
//! - `dyn` means the concrete type is chosen at runtime (see `main.rs`)
//!
//! ## Poisoned locks
//! A panic while holding a lock "poisons" it. The counters are plain integers
//! that cannot be left half-updated, so a poisoned lock is recovered with
//! `PoisonError::into_inner` instead of taking the server down.

use crate::collaborators::{ResponseGenerator, Transcriber};
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// State shared across all handlers and call actors.
///
/// ## Fields:
/// - `config`: read-only after startup, so a plain `Arc` is enough
/// - `metrics`: request and call counters, updated concurrently
/// - `transcriber` / `responder`: the agent's collaborators
/// - `start_time`: for the uptime figure in `/health`
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub transcriber: Arc<dyn Transcriber>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub start_time: Instant,
}

/// Counters collected since the server started.
///
/// ## HTTP side:
/// - **request_count** / **error_count**: every request through the metrics middleware
/// - **endpoint_metrics**: per `"METHOD /path"` statistics
///
/// ## Call side:
/// - **active_calls** / **total_calls**: media-stream sessions that sent `start`
/// - **media_frames_received** / **media_bytes_received**: inbound audio
/// - **responses_sent**: media envelopes sent back (greetings included)
/// - **transcripts**: buffers that produced usable text
/// - **malformed_envelopes**: inbound messages that were skipped
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    pub active_calls: u32,
    pub total_calls: u64,
    pub media_frames_received: u64,
    pub media_bytes_received: u64,
    pub responses_sent: u64,
    pub transcripts: u64,
    pub malformed_envelopes: u64,
}

/// Statistics for one HTTP endpoint.
///
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Create the state for a server run.
    ///
    /// ## Rust Concepts:
    /// - **impl Trait + 'static**: accepts any concrete collaborator type and
    ///   boxes it behind an `Arc<dyn …>`
    pub fn new(
        config: AppConfig,
        transcriber: impl Transcriber + 'static,
        responder: impl ResponseGenerator + 'static,
    ) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            transcriber: Arc::new(transcriber),
            responder: Arc::new(responder),
            start_time: Instant::now(),
        }
    }

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    /// Called for every 4xx/5xx response.
    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record one request against its endpoint.
    ///
    /// ## Rust Concepts:
    /// - **.entry().or_default()**: creates the `EndpointMetric` the first time an
    ///   endpoint is seen
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A media stream sent `start`.
    pub fn call_started(&self) {
        let mut metrics = self.write_metrics();
        metrics.active_calls += 1;
        metrics.total_calls += 1;
    }

    /// A started media stream closed. Never goes below zero.
    pub fn call_ended(&self) {
        let mut metrics = self.write_metrics();
        metrics.active_calls = metrics.active_calls.saturating_sub(1);
    }

    pub fn record_media_frame(&self, bytes: usize) {
        let mut metrics = self.write_metrics();
        metrics.media_frames_received += 1;
        metrics.media_bytes_received += bytes as u64;
    }

    pub fn record_response_sent(&self) {
        self.write_metrics().responses_sent += 1;
    }

    pub fn record_transcript(&self) {
        self.write_metrics().transcripts += 1;
    }

    pub fn record_malformed_envelope(&self) {
        self.write_metrics().malformed_envelopes += 1;
    }

    /// Copy of the counters, so no lock is held while a response is built.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    /// Share of HTTP requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
