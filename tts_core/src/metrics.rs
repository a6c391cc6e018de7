//! Real-time-factor bookkeeping for one request.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::EngineMetrics;

/// Audio seconds produced per second of synthesis. Above 1.0 is faster
/// than real time. A zero synthesis time yields infinity.
pub fn real_time_factor(audio_duration: Duration, synthesis_time: Duration) -> f64 {
    let synthesis = synthesis_time.as_secs_f64();
    if synthesis <= 0.0 {
        return f64::INFINITY;
    }
    audio_duration.as_secs_f64() / synthesis
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentMetrics {
    pub index: usize,
    pub text_length: usize,
    pub synthesis_time_ms: f64,
    pub audio_duration_s: f64,
    pub real_time_factor: f64,
}

/// Totals for a whole request; the RTF is computed from the sums.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RequestMetrics {
    pub segments: usize,
    pub text_length: usize,
    pub synthesis_time_ms: f64,
    pub audio_duration_s: f64,
    pub real_time_factor: f64,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    request_id: String,
    segments: Vec<SegmentMetrics>,
    synthesis_time: Duration,
    audio_duration: Duration,
    text_length: usize,
}

impl MetricsCollector {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn record_segment(
        &mut self,
        index: usize,
        text_length: usize,
        engine: EngineMetrics,
    ) -> SegmentMetrics {
        let rtf = real_time_factor(engine.audio_duration, engine.synthesis_time);
        if rtf.is_infinite() {
            warn!(
                request_id = %self.request_id,
                segment = index,
                "Synthesis time measured as zero, RTF is unbounded"
            );
        }

        let segment = SegmentMetrics {
            index,
            text_length,
            synthesis_time_ms: engine.synthesis_time.as_secs_f64() * 1000.0,
            audio_duration_s: engine.audio_duration.as_secs_f64(),
            real_time_factor: rtf,
        };
        info!(
            request_id = %self.request_id,
            segment = index,
            chars = text_length,
            synthesis_ms = segment.synthesis_time_ms,
            audio_s = segment.audio_duration_s,
            rtf = segment.real_time_factor,
            "Segment synthesized"
        );

        self.synthesis_time += engine.synthesis_time;
        self.audio_duration += engine.audio_duration;
        self.text_length += text_length;
        self.segments.push(segment);
        segment
    }

    pub fn segments(&self) -> &[SegmentMetrics] {
        &self.segments
    }

    pub fn summary(&self) -> RequestMetrics {
        RequestMetrics {
            segments: self.segments.len(),
            text_length: self.text_length,
            synthesis_time_ms: self.synthesis_time.as_secs_f64() * 1000.0,
            audio_duration_s: self.audio_duration.as_secs_f64(),
            real_time_factor: real_time_factor(self.audio_duration, self.synthesis_time),
        }
    }

    /// Log and return the request totals.
    pub fn finish(&self) -> RequestMetrics {
        let summary = self.summary();
        info!(
            request_id = %self.request_id,
            segments = summary.segments,
            chars = summary.text_length,
            synthesis_ms = summary.synthesis_time_ms,
            audio_s = summary.audio_duration_s,
            rtf = summary.real_time_factor,
            "Synthesis complete"
        );
        summary
    }
}
