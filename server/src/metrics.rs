// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{RelayEnd, RelayObserver, RelayReport};

use crate::error::ApiError;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Per-endpoint metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub min_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    pub latency_samples: Arc<Mutex<Vec<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        // Keep the most recent samples for percentiles
        if let Ok(mut samples) = self.latency_samples.lock() {
            samples.push(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a handler started at `start` and pass it through.
    pub fn track<T>(&self, start: Instant, result: Result<T, ApiError>) -> Result<T, ApiError> {
        match &result {
            Ok(_) => self.record_request(start.elapsed().as_millis() as u64),
            Err(_) => self.record_error(),
        }
        result
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for streamed responses. Registered as the relay observer.
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    pub started: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub interrupted: Arc<AtomicU64>,
    pub consumer_disconnected: Arc<AtomicU64>,
    pub upstream_open_failures: Arc<AtomicU64>,
    pub bytes_forwarded: Arc<AtomicU64>,
    pub chunks_forwarded: Arc<AtomicU64>,
}

impl RelayMetrics {
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open_failure(&self) {
        self.upstream_open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsResponse {
        RelayMetricsResponse {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            consumer_disconnected: self.consumer_disconnected.load(Ordering::Relaxed),
            upstream_open_failures: self.upstream_open_failures.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            chunks_forwarded: self.chunks_forwarded.load(Ordering::Relaxed),
        }
    }
}

impl RelayObserver for RelayMetrics {
    fn on_closed(&self, report: &RelayReport) {
        self.bytes_forwarded.fetch_add(report.bytes, Ordering::Relaxed);
        self.chunks_forwarded
            .fetch_add(report.chunks as u64, Ordering::Relaxed);
        let counter = match report.end {
            RelayEnd::Completed => &self.completed,
            // Dropping the response body cancels the relay, so both mean the client left.
            RelayEnd::ConsumerDisconnected | RelayEnd::Cancelled => &self.consumer_disconnected,
            RelayEnd::UpstreamFailed(_) | RelayEnd::TimedOut => &self.interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub stream_audio: EndpointMetrics,
    pub tts: EndpointMetrics,
    pub voice_design: EndpointMetrics,
    pub voices: EndpointMetrics,
    pub provider_voices: EndpointMetrics,
    pub relay: RelayMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            stream_audio: EndpointMetrics::new(),
            tts: EndpointMetrics::new(),
            voice_design: EndpointMetrics::new(),
            voices: EndpointMetrics::new(),
            provider_voices: EndpointMetrics::new(),
            relay: RelayMetrics::default(),
        }
    }

    pub fn endpoints(&self) -> EndpointMetricsResponse {
        EndpointMetricsResponse {
            stream_audio: self.stream_audio.stats(),
            tts: self.tts.stats(),
            voice_design: self.voice_design.stats(),
            voices: self.voices.stats(),
            provider_voices: self.provider_voices.stats(),
        }
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct DetailedMetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub relay: RelayMetricsResponse,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub stream_audio: EndpointStats,
    pub tts: EndpointStats,
    pub voice_design: EndpointStats,
    pub voices: EndpointStats,
    pub provider_voices: EndpointStats,
}

#[derive(Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Serialize)]
pub struct RelayMetricsResponse {
    pub started: u64,
    pub completed: u64,
    pub interrupted: u64,
    pub consumer_disconnected: u64,
    pub upstream_open_failures: u64,
    pub bytes_forwarded: u64,
    pub chunks_forwarded: u64,
}
