//! The synthesis engine seam.
//!
//! An engine is the one stateful, non-reentrant resource of the process. It
//! is wrapped in an [`EngineHandle`] that owns it behind an async mutex; the
//! coordinator holds that lock for a whole request so two requests never
//! interleave inside the model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::error::{Result, TtsError};

/// Mono PCM produced for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawAudio {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Playback length of the samples.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// Timing of a single engine call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineMetrics {
    pub synthesis_time: Duration,
    pub audio_duration: Duration,
}

/// Feature flags advertised by an engine, queried once per instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub supports_multi_language: bool,
    pub supports_speaker_cloning: bool,
    /// Language keys the engine accepts. Empty means "not restricted".
    pub languages: Vec<String>,
}

impl Capabilities {
    pub fn knows_language(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }

    /// Build per-call parameters, leaving out anything the engine cannot take.
    ///
    /// A single-language engine never receives a language; a request for a
    /// language it does not speak is refused instead of silently synthesized
    /// in the wrong one. A speaker reference for an engine without cloning is
    /// refused too. Without a language the engine uses its own default.
    pub fn params_for(
        &self,
        language: Option<&str>,
        speaker_reference: Option<&str>,
    ) -> Result<SynthesisParams> {
        if let Some(language) = language.filter(|l| !self.knows_language(l)) {
            return Err(TtsError::Capability(format!(
                "Language '{}' is not available. Supported: {}",
                language,
                self.languages.join(", ")
            )));
        }
        if speaker_reference.is_some() && !self.supports_speaker_cloning {
            return Err(TtsError::Capability(
                "The active model does not support speaker references".to_string(),
            ));
        }

        Ok(SynthesisParams {
            language: language
                .filter(|_| self.supports_multi_language)
                .map(str::to_string),
            speaker_reference: speaker_reference.map(str::to_string),
        })
    }

    /// Engine-side guard: refuse parameters the flags do not allow.
    pub fn check(&self, params: &SynthesisParams) -> Result<()> {
        if params.language.is_some() && !self.supports_multi_language {
            return Err(TtsError::Capability(
                "language given to a single-language model".to_string(),
            ));
        }
        if params.speaker_reference.is_some() && !self.supports_speaker_cloning {
            return Err(TtsError::Capability(
                "speaker reference given to a model without cloning".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional per-call parameters, already filtered by [`Capabilities`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisParams {
    pub language: Option<String>,
    pub speaker_reference: Option<String>,
}

/// A speech model. Implementations may hold exclusive hardware state and are
/// only ever called from one thread at a time.
pub trait SynthesisEngine: Send {
    fn capabilities(&self) -> Capabilities;

    fn synthesize(&mut self, text: &str, params: &SynthesisParams) -> Result<RawAudio>;
}

/// Run one engine call and measure it.
pub fn timed_synthesize(
    engine: &mut dyn SynthesisEngine,
    text: &str,
    params: &SynthesisParams,
) -> Result<(RawAudio, EngineMetrics)> {
    let start = Instant::now();
    let audio = engine.synthesize(text, params)?;
    let metrics = EngineMetrics {
        synthesis_time: start.elapsed(),
        audio_duration: audio.duration(),
    };
    Ok((audio, metrics))
}

type EngineSlot = Option<Box<dyn SynthesisEngine>>;

/// Process-wide owner of the engine.
///
/// Cloning the handle shares the same engine. After [`EngineHandle::shutdown`]
/// the slot is empty and later requests fail with an engine error.
#[derive(Clone)]
pub struct EngineHandle {
    slot: Arc<Mutex<EngineSlot>>,
    capabilities: Arc<Capabilities>,
}

impl EngineHandle {
    pub fn initialize<E>(engine: E) -> Self
    where
        E: SynthesisEngine + 'static,
    {
        let capabilities = engine.capabilities();
        info!(
            multi_language = capabilities.supports_multi_language,
            speaker_cloning = capabilities.supports_speaker_cloning,
            languages = capabilities.languages.len(),
            "Synthesis engine initialized"
        );
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(engine)))),
            capabilities: Arc::new(capabilities),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Wait for exclusive use of the engine.
    pub(crate) async fn acquire(&self) -> EngineGuard {
        EngineGuard(self.slot.clone().lock_owned().await)
    }

    /// Drop the engine once the current holder releases it.
    ///
    /// Returns `false` when it had already been shut down.
    pub async fn shutdown(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let was_loaded = slot.take().is_some();
        if was_loaded {
            info!("Synthesis engine shut down");
        }
        was_loaded
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

/// Exclusive access to the engine for the lifetime of one request.
pub(crate) struct EngineGuard(OwnedMutexGuard<EngineSlot>);

impl EngineGuard {
    pub(crate) fn engine(&mut self) -> Result<&mut dyn SynthesisEngine> {
        match self.0.as_mut() {
            Some(engine) => Ok(engine.as_mut()),
            None => Err(TtsError::Engine("engine has been shut down".to_string())),
        }
    }
}
