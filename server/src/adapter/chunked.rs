use std::io;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use tracing::{info, warn};

use super::TtsRequest;
use crate::error::{ApiError, ApiJson};
use crate::AppState;

/// `POST /tts/stream`: WAV bytes as they are produced.
///
/// The first frame is awaited before the status line goes out, so a request
/// that fails before any audio still gets a JSON error. Later failures can
/// only abort the body.
pub async fn tts_stream_endpoint(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TtsRequest>,
) -> Result<Response, ApiError> {
    let endpoint = &state.metrics.chunked;
    endpoint.record_request();
    let started = Instant::now();

    let mut stream = match start(&state, req) {
        Ok(stream) => stream,
        Err(e) => {
            endpoint.record_error();
            return Err(e);
        }
    };
    let first = match stream.next_frame().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            endpoint.record_error();
            return Err(e.into());
        }
        None => {
            endpoint.record_error();
            return Err(ApiError::InternalError(
                "synthesis produced no audio".to_string(),
            ));
        }
    };
    endpoint.record_first_audio(started.elapsed());

    let metrics = state.metrics.clone();
    let body = async_stream::stream! {
        yield Ok::<_, io::Error>(Bytes::from(first.payload));

        let mut failed = false;
        while let Some(item) = stream.next_frame().await {
            match item {
                Ok(frame) => yield Ok(Bytes::from(frame.payload)),
                Err(e) => {
                    warn!(request_id = %stream.request_id(), error = %e, "Aborting streamed response");
                    metrics.chunked.record_error();
                    failed = true;
                    yield Err(io::Error::other(e.to_string()));
                    break;
                }
            }
        }

        if !failed {
            let request_id = stream.request_id().to_string();
            if let Some(summary) = stream.metrics().await {
                metrics.synthesis.record(&summary);
                info!(request_id = %request_id, rtf = summary.real_time_factor, "Streamed response complete");
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(header::CONTENT_DISPOSITION, "inline; filename=\"speech.wav\"")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::InternalError(format!("response build error: {e}")))
}

fn start(state: &AppState, req: TtsRequest) -> Result<tts_core::FrameStream, ApiError> {
    let request = req.into_synthesis_request(&state.config)?;
    Ok(state.coordinator.run(request)?)
}
