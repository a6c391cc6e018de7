// Service metrics collection and the /metrics endpoint

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{real_time_factor, RequestMetrics};

use crate::AppState;

const MAX_LATENCY_SAMPLES: usize = 1000;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Start the uptime clock. Later calls keep the first instant.
pub fn mark_start() {
    let _ = START_TIME.get_or_init(Instant::now);
}

/// Per delivery mode counters and time-to-first-audio latencies
#[derive(Debug)]
pub struct EndpointMetrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    latency_samples: Mutex<Vec<u64>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            latency_samples: Mutex::new(Vec::new()),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Time from request arrival to the first audio byte being handed over.
    pub fn record_first_audio(&self, latency: Duration) {
        let latency_ms = latency.as_millis() as u64;
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            samples.push(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    fn latency_count(&self) -> usize {
        self.latency_samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.latency_count();
        if count == 0 {
            return 0.0;
        }
        let samples = self
            .latency_samples
            .lock()
            .map(|s| s.iter().sum::<u64>())
            .unwrap_or(0);
        samples as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.latency_samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_first_audio_ms: self.avg_latency_ms(),
            min_first_audio_ms: if min == u64::MAX { 0 } else { min },
            max_first_audio_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_first_audio_ms: self.percentile(50),
            p95_first_audio_ms: self.percentile(95),
            p99_first_audio_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate synthesis work across completed requests
#[derive(Debug, Default)]
pub struct SynthesisMetrics {
    completed_requests: AtomicU64,
    segments: AtomicU64,
    characters: AtomicU64,
    audio_us: AtomicU64,
    synthesis_us: AtomicU64,
}

impl SynthesisMetrics {
    pub fn record(&self, summary: &RequestMetrics) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
        self.segments
            .fetch_add(summary.segments as u64, Ordering::Relaxed);
        self.characters
            .fetch_add(summary.text_length as u64, Ordering::Relaxed);
        self.audio_us.fetch_add(
            (summary.audio_duration_s * 1_000_000.0) as u64,
            Ordering::Relaxed,
        );
        self.synthesis_us.fetch_add(
            (summary.synthesis_time_ms * 1000.0) as u64,
            Ordering::Relaxed,
        );
    }

    pub fn stats(&self) -> SynthesisStats {
        let audio = Duration::from_micros(self.audio_us.load(Ordering::Relaxed));
        let synthesis = Duration::from_micros(self.synthesis_us.load(Ordering::Relaxed));
        SynthesisStats {
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            segments: self.segments.load(Ordering::Relaxed),
            characters: self.characters.load(Ordering::Relaxed),
            audio_seconds: audio.as_secs_f64(),
            synthesis_seconds: synthesis.as_secs_f64(),
            real_time_factor: (!synthesis.is_zero())
                .then(|| real_time_factor(audio, synthesis)),
        }
    }
}

/// All service metrics, shared through the app state
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub buffered: EndpointMetrics,
    pub chunked: EndpointMetrics,
    pub websocket: EndpointMetrics,
    pub synthesis: SynthesisMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_requests(&self) -> u64 {
        [&self.buffered, &self.chunked, &self.websocket]
            .iter()
            .map(|m| m.request_count.load(Ordering::Relaxed))
            .sum()
    }
}

#[derive(Serialize)]
pub struct DetailedMetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub synthesis: SynthesisStats,
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
    pub buffered: EndpointStats,
    pub chunked: EndpointStats,
    pub websocket: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_first_audio_ms: f64,
    pub min_first_audio_ms: u64,
    pub max_first_audio_ms: u64,
    pub p50_first_audio_ms: u64,
    pub p95_first_audio_ms: u64,
    pub p99_first_audio_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SynthesisStats {
    pub completed_requests: u64,
    pub segments: u64,
    pub characters: u64,
    pub audio_seconds: f64,
    pub synthesis_seconds: f64,
    pub real_time_factor: Option<f64>,
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    // Unix-like systems only
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|l| l.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    let metrics = &state.metrics;
    Json(DetailedMetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: metrics.total_requests(),
            uptime_seconds: uptime,
            system_load,
        },
        endpoints: EndpointMetricsResponse {
            buffered: metrics.buffered.stats(),
            chunked: metrics.chunked.stats(),
            websocket: metrics.websocket.stats(),
        },
        synthesis: metrics.synthesis.stats(),
    })
}
