//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through
//! `web::Data<AppState>`. The transcription engine is constructed once in
//! `main`, owned by the composition root, and reaches each request as an
//! injected handle rather than a process global.
//!
//! ## Sharing model:
//! - The engine is `Arc`-shared and internally synchronized; handlers only
//!   ever call `&self` methods on it.
//! - Metrics are the one piece of request-mutable state, behind
//!   `Arc<RwLock<_>>` so concurrent requests can record counters safely.
//! - Configuration is an immutable snapshot taken at startup. Nothing in
//!   this service mutates config at runtime.

use crate::config::AppConfig;
use crate::transcription::TranscriptionEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Everything a request handler needs, cloned per actix worker.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration snapshot (read-only after boot)
    pub config: Arc<AppConfig>,

    /// The loaded Whisper model and its admission gate
    pub engine: Arc<TranscriptionEngine>,

    /// Request/error counters updated by middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started, for uptime reporting
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests processed since startup
    pub request_count: u64,

    /// Total requests that ended in a 4xx/5xx response
    pub error_count: u64,

    /// Successfully completed transcriptions
    pub transcriptions_completed: u64,

    /// Per-endpoint statistics, keyed as "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Statistics for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, engine: TranscriptionEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Record one finished request against its endpoint.
    ///
    /// Takes the write lock briefly; the work inside is a couple of integer
    /// additions, so contention stays negligible even under load.
    pub fn record_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Count a transcription that made it all the way to a 200 response.
    pub fn record_transcription(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.transcriptions_completed += 1;
    }

    /// Snapshot the metrics so the lock is not held while serializing JSON.
    pub fn metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            transcriptions_completed: metrics.transcriptions_completed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::TranscriptionEngine;

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let engine = TranscriptionEngine::new(&config);
        AppState::new(config, engine)
    }

    #[test]
    fn test_record_request_accumulates() {
        let state = test_state();
        state.record_request("POST /transcribe", 120, false);
        state.record_request("POST /transcribe", 80, true);

        let snapshot = state.metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);

        let endpoint = &snapshot.endpoint_metrics["POST /transcribe"];
        assert_eq!(endpoint.request_count, 2);
        assert_eq!(endpoint.total_duration_ms, 200);
        assert_eq!(endpoint.average_duration_ms(), 100.0);
        assert_eq!(endpoint.error_rate(), 0.5);
    }

    #[test]
    fn test_empty_endpoint_metric_rates() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }

    #[test]
    fn test_record_transcription() {
        let state = test_state();
        state.record_transcription();
        state.record_transcription();
        assert_eq!(state.metrics_snapshot().transcriptions_completed, 2);
    }
}
