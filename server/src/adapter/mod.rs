//! Delivery modes over one [`FrameStream`](tts_core::FrameStream).
//!
//! - [`buffered`]: whole WAV with a definite length.
//! - [`chunked`]: progressive HTTP body, end of body is completion.
//! - [`session`]: WebSocket session with status messages.

pub mod buffered;
pub mod chunked;
pub mod session;

use serde::Deserialize;
use tts_core::SynthesisRequest;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::validate_tts_request;

/// Request body shared by every delivery mode.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub language: Option<String>,
    #[serde(alias = "speaker_wav", alias = "speakerReference")]
    pub speaker_reference: Option<String>,
    pub chunk_size: Option<usize>,
}

impl TtsRequest {
    pub fn into_synthesis_request(
        self,
        config: &ServerConfig,
    ) -> Result<SynthesisRequest, ApiError> {
        validate_tts_request(
            &self.text,
            self.language.as_deref(),
            self.chunk_size,
            config.max_text_length,
        )?;

        let mut request = match self.language {
            Some(language) => SynthesisRequest::new(self.text, language),
            None => SynthesisRequest::in_default_language(self.text),
        };
        request.speaker_reference = self.speaker_reference.filter(|s| !s.trim().is_empty());
        request.frame_size = self.chunk_size;
        Ok(request)
    }
}
