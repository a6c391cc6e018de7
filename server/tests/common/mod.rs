//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use server::{build_router, config::ServerConfig, AppState};
use tts_core::{Capabilities, EngineHandle, RawAudio, SynthesisEngine, SynthesisParams, TtsError};

pub const SAMPLE_RATE: u32 = 16_000;
pub const SAMPLES_PER_CHAR: usize = 100;

/// Engine producing `SAMPLES_PER_CHAR` samples per character of input.
pub struct MockEngine {
    capabilities: Capabilities,
    fail_on_call: Option<usize>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities {
                supports_multi_language: true,
                supports_speaker_cloning: false,
                languages: vec!["en".to_string(), "de".to_string()],
            },
            fail_on_call: None,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Single-language engine speaking only `language`.
    pub fn single_voice(language: &str) -> Self {
        let mut engine = Self::new();
        engine.capabilities = Capabilities {
            supports_multi_language: false,
            supports_speaker_cloning: false,
            languages: vec![language.to_string()],
        };
        engine
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl SynthesisEngine for MockEngine {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn synthesize(&mut self, text: &str, params: &SynthesisParams) -> tts_core::Result<RawAudio> {
        self.capabilities().check(params)?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail_on_call == Some(call) {
            return Err(TtsError::Engine("mock engine failure".to_string()));
        }
        let samples = (0..text.chars().count() * SAMPLES_PER_CHAR)
            .map(|i| ((i % 80) as f32 / 80.0) - 0.5)
            .collect();
        Ok(RawAudio::mono(samples, SAMPLE_RATE))
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::default()
}

pub fn test_state(engine: MockEngine, config: ServerConfig) -> AppState {
    AppState::new(EngineHandle::initialize(engine), config)
}

/// Create a test app instance backed by `engine`
pub fn create_test_app(engine: MockEngine) -> Router {
    build_router(test_state(engine, test_config()))
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Bytes of a complete response for `chars` characters of text.
pub fn wav_len(chars: usize) -> usize {
    44 + chars * SAMPLES_PER_CHAR * 2
}
