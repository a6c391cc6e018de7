//! Integration tests for the HTTP delivery modes

mod common;

use std::io::Cursor;

use axum::{
    body::to_bytes,
    http::{header, StatusCode},
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tower::ServiceExt;

use common::*;
use server::build_router;
use server::config::ServerConfig;

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(MockEngine::new());
    for uri in ["/health", "/api/health"] {
        let response = app.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "ok");
    }
}

#[tokio::test]
async fn test_list_voices() {
    let app = create_test_app(MockEngine::new());
    let response = app.oneshot(get_request("/voices")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let voices = json_body(response).await;
    assert_eq!(voices["default_language"], "en");
    assert_eq!(voices["supports_multi_language"], true);
    assert_eq!(voices["supports_speaker_cloning"], false);
    assert_eq!(voices["languages"], json!(["en", "de"]));
}

#[tokio::test]
async fn test_tts_endpoint_returns_finished_wav() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request(
            "/tts",
            json!({ "text": "Hello world. How are you?", "language": "en" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(headers["x-segments"], "2");
    assert_eq!(headers["x-audio-duration-ms"], "150");
    assert!(headers.contains_key("x-real-time-factor"));
    assert!(headers.contains_key("x-synthesis-time-ms"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), wav_len(24));
    assert_eq!(
        headers[header::CONTENT_LENGTH].to_str().unwrap(),
        body.len().to_string()
    );

    let reader = hound::WavReader::new(Cursor::new(body.to_vec())).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.len() as usize, 24 * SAMPLES_PER_CHAR);
}

#[tokio::test]
async fn test_api_prefix_and_default_language() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request("/api/tts", json!({ "text": "Hi there." })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_text_is_rejected() {
    let engine = MockEngine::new();
    let calls = engine.calls();
    let app = create_test_app(engine);
    let response = app
        .oneshot(json_request("/tts", json!({ "text": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["code"], 400);
    assert!(body["detail"].as_str().unwrap().contains("empty"));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_body_gets_structured_error() {
    let app = create_test_app(MockEngine::new());
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/tts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_chunk_size_is_rejected() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request(
            "/tts/stream",
            json!({ "text": "Hello.", "chunk_size": 100 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsupported_language_is_a_capability_error() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request(
            "/tts",
            json!({ "text": "Bonjour.", "language": "fr" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "capability_error");
    assert!(body["detail"].as_str().unwrap().contains("fr"));
}

#[tokio::test]
async fn test_speaker_reference_without_cloning_is_refused() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request(
            "/tts",
            json!({ "text": "Hello.", "speaker_wav": "voices/me.wav" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_buffered_engine_failure_discards_audio() {
    let app = create_test_app(MockEngine::new().failing_on(1));
    let response = app
        .oneshot(json_request(
            "/tts",
            json!({ "text": "One sentence. Two sentences. Three." }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "engine_error");
    assert_eq!(body["code"], 500);
}

#[tokio::test]
async fn test_stream_endpoint_sends_progressive_wav() {
    let app = create_test_app(MockEngine::new());
    let response = app
        .oneshot(json_request(
            "/tts/stream",
            json!({ "text": "Hello world. How are you?", "chunk_size": 1024 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert!(!response.headers().contains_key(header::CONTENT_LENGTH));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), wav_len(24));
    assert_eq!(&body[0..4], b"RIFF");
    // streaming placeholder, the length was unknown when the header left
    assert_eq!(&body[4..8], &u32::MAX.to_le_bytes());

    let mut finished = body.to_vec();
    tts_core::wav::finalize_header(&mut finished).unwrap();
    let reader = hound::WavReader::new(Cursor::new(finished)).unwrap();
    assert_eq!(reader.len() as usize, 24 * SAMPLES_PER_CHAR);
}

#[tokio::test]
async fn test_stream_failure_before_audio_is_json() {
    let app = create_test_app(MockEngine::new().failing_on(0));
    let response = app
        .oneshot(json_request("/tts/stream", json!({ "text": "Hello. Again." })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "engine_error");
}

#[tokio::test]
async fn test_stream_failure_mid_body_truncates() {
    let app = create_test_app(MockEngine::new().failing_on(1));
    let response = app
        .oneshot(json_request(
            "/tts/stream",
            json!({ "text": "One sentence. Two sentences. Three.", "chunk_size": 1024 }),
        ))
        .await
        .unwrap();

    // the first segment produced audio, so the status line already went out
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
}

#[tokio::test]
async fn test_metrics_track_requests() {
    let state = test_state(MockEngine::new(), test_config());
    let app = build_router(state);

    let ok = app
        .clone()
        .oneshot(json_request("/tts", json!({ "text": "Hello world." })))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let bad = app
        .clone()
        .oneshot(json_request("/tts", json!({ "text": "Hallo.", "language": "xx" })))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let metrics = json_body(response).await;
    assert_eq!(metrics["endpoints"]["buffered"]["request_count"], 2);
    assert_eq!(metrics["endpoints"]["buffered"]["error_count"], 1);
    assert_eq!(metrics["endpoints"]["chunked"]["request_count"], 0);
    assert_eq!(metrics["synthesis"]["completed_requests"], 1);
    assert_eq!(metrics["synthesis"]["characters"], 12);
    assert_eq!(metrics["system"]["request_count"], 2);
    assert!(metrics["timestamp"].is_string());
}

#[tokio::test]
async fn test_missing_language_uses_the_engine_voice() {
    let engine = MockEngine::single_voice("en_US");
    let calls = engine.calls();
    let app = create_test_app(engine);

    let response = app
        .clone()
        .oneshot(json_request("/tts", json!({ "text": "Hello." })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // naming a language the voice map lacks is still refused
    let response = app
        .oneshot(json_request("/tts", json!({ "text": "Hello.", "language": "en" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let config = ServerConfig {
        body_limit_bytes: 64,
        ..test_config()
    };
    let app = build_router(test_state(MockEngine::new(), config));
    let body = json!({ "text": "word ".repeat(40) }).to_string();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/tts")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_client_leaving_cancels_synthesis() {
    let engine = MockEngine::new().with_delay(Duration::from_millis(100));
    let calls = engine.calls();
    let app = create_test_app(engine);
    let response = app
        .oneshot(json_request(
            "/tts/stream",
            json!({ "text": "First part. Second part. Third part.", "chunk_size": 1024 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(&first[..4], b"RIFF");
    drop(body);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(calls.load(Ordering::SeqCst) <= 2);
}
