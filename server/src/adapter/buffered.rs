use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use tracing::info;
use tts_core::{wav, RequestMetrics};

use super::TtsRequest;
use crate::error::{ApiError, ApiJson};
use crate::AppState;

/// `POST /tts`: synthesize everything, then answer with one finished WAV.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TtsRequest>,
) -> Result<Response, ApiError> {
    let endpoint = &state.metrics.buffered;
    endpoint.record_request();
    let started = Instant::now();

    let result = synthesize(&state, req).await;
    match &result {
        Ok(_) => endpoint.record_first_audio(started.elapsed()),
        Err(_) => endpoint.record_error(),
    }
    result
}

async fn synthesize(state: &AppState, req: TtsRequest) -> Result<Response, ApiError> {
    let request = req.into_synthesis_request(&state.config)?;
    let mut stream = state.coordinator.run(request)?;

    // A failure discards everything gathered so far.
    let mut body = Vec::new();
    while let Some(frame) = stream.next_frame().await {
        body.extend_from_slice(&frame?.payload);
    }
    wav::finalize_header(&mut body)?;

    let request_id = stream.request_id().to_string();
    let summary = stream
        .metrics()
        .await
        .ok_or_else(|| ApiError::InternalError("synthesis ended without a summary".to_string()))?;
    state.metrics.synthesis.record(&summary);
    info!(request_id = %request_id, bytes = body.len(), "Buffered response ready");

    wav_response(body, &summary)
}

fn wav_response(body: Vec<u8>, summary: &RequestMetrics) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::CONTENT_DISPOSITION, "inline; filename=\"speech.wav\"")
        .header("x-audio-duration-ms", format!("{:.0}", summary.audio_duration_s * 1000.0))
        .header("x-synthesis-time-ms", format!("{:.0}", summary.synthesis_time_ms))
        .header("x-real-time-factor", format!("{:.3}", summary.real_time_factor))
        .header("x-segments", summary.segments)
        .body(Body::from(body))
        .map_err(|e| ApiError::InternalError(format!("response build error: {e}")))
}
