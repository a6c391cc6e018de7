//! Request orchestration: segment, synthesize, encode and frame.
//!
//! Synthesis runs on the blocking pool while holding the engine lock and
//! pushes frames into a bounded channel. The consumer side is a
//! [`FrameStream`]; closing or dropping it is the cancellation signal, which
//! the producer checks before every engine call and on every frame hand-off.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use hound::WavSpec;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{timed_synthesize, Capabilities, EngineGuard, EngineHandle, SynthesisParams};
use crate::error::{Result, TtsError};
use crate::frame::{AudioFrame, FrameAssembler, DEFAULT_FRAME_SIZE};
use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::segment::{segment, TextSegment};
use crate::wav;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// An accepted synthesis request. The coordinator takes ownership of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    /// `None` lets the coordinator pick its default language.
    pub language: Option<String>,
    pub speaker_reference: Option<String>,
    /// Delivery frame size in bytes; the coordinator default when `None`.
    pub frame_size: Option<usize>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: Some(language.into()),
            speaker_reference: None,
            frame_size: None,
        }
    }

    /// A request that leaves the language to the coordinator.
    pub fn in_default_language(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            speaker_reference: None,
            frame_size: None,
        }
    }

    pub fn with_speaker_reference(mut self, speaker_reference: impl Into<String>) -> Self {
        self.speaker_reference = Some(speaker_reference.into());
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = Some(frame_size);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Segmenter `max_length`, in characters.
    pub max_segment_length: usize,
    pub default_frame_size: usize,
    /// Preferred language for requests that name none. Ignored when the
    /// engine does not list it; the engine's first language is used then.
    pub default_language: Option<String>,
    /// Used for cloning engines when a request names no speaker.
    pub default_speaker_reference: Option<String>,
    /// Frames buffered between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_segment_length: 500,
            default_frame_size: DEFAULT_FRAME_SIZE,
            default_language: None,
            default_speaker_reference: None,
            channel_capacity: 32,
        }
    }
}

/// Drives the engine for one request at a time.
#[derive(Clone)]
pub struct StreamCoordinator {
    engine: EngineHandle,
    config: Arc<CoordinatorConfig>,
}

impl StreamCoordinator {
    pub fn new(engine: EngineHandle, config: CoordinatorConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.engine.capabilities()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start synthesizing `request` and return its frame sequence.
    ///
    /// Validation and capability problems are reported here, before the
    /// engine is touched. Engine failures arrive as the last item of the
    /// stream. Must be called from within a tokio runtime.
    pub fn run(&self, request: SynthesisRequest) -> Result<FrameStream> {
        let request_id = format!("tts-{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed));

        let segments = segment(&request.text, self.config.max_segment_length)?;
        let params = self.params_for(&request)?;
        let assembler = FrameAssembler::new(
            request.frame_size.unwrap_or(self.config.default_frame_size),
        )?;

        info!(
            request_id = %request_id,
            segments = segments.len(),
            chars = request.text.chars().count(),
            language = params.language.as_deref().unwrap_or("-"),
            frame_size = assembler.frame_size(),
            "Starting synthesis"
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (summary_tx, summary_rx) = oneshot::channel();
        let job = Job {
            request_id: request_id.clone(),
            segments,
            params,
            assembler,
        };
        let engine = self.engine.clone();

        tokio::spawn(async move {
            let guard = tokio::select! {
                guard = engine.acquire() => guard,
                _ = tx.closed() => {
                    debug!(request_id = %job.request_id, "Cancelled while waiting for the engine");
                    return;
                }
            };

            let producer_tx = tx.clone();
            let outcome = tokio::task::spawn_blocking(move || job.run(guard, &producer_tx)).await;
            match outcome {
                Ok(Some(summary)) => {
                    let _ = summary_tx.send(summary);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Synthesis task failed: {e}");
                    let _ = tx
                        .send(Err(TtsError::Engine("synthesis task failed".to_string())))
                        .await;
                }
            }
        });

        Ok(FrameStream {
            request_id,
            frames: rx,
            summary: summary_rx,
        })
    }

    fn params_for(&self, request: &SynthesisRequest) -> Result<SynthesisParams> {
        let capabilities = self.engine.capabilities();
        let speaker = match request.speaker_reference.as_deref() {
            Some(speaker) => Some(speaker),
            None if capabilities.supports_speaker_cloning => {
                self.config.default_speaker_reference.as_deref()
            }
            None => None,
        };
        let language = match request.language.as_deref() {
            Some(language) => Some(language),
            None => self.default_language(capabilities),
        };
        capabilities.params_for(language, speaker)
    }

    fn default_language<'a>(&'a self, capabilities: &'a Capabilities) -> Option<&'a str> {
        match self.config.default_language.as_deref() {
            Some(language) if capabilities.knows_language(language) => Some(language),
            _ => capabilities.languages.first().map(String::as_str),
        }
    }
}

/// Everything the blocking producer needs for one request.
struct Job {
    request_id: String,
    segments: Vec<TextSegment>,
    params: SynthesisParams,
    assembler: FrameAssembler,
}

type FrameSender = mpsc::Sender<Result<AudioFrame>>;

impl Job {
    /// Returns the request totals when every segment was delivered.
    fn run(self, mut guard: EngineGuard, tx: &FrameSender) -> Option<RequestMetrics> {
        let Job {
            request_id,
            segments,
            params,
            mut assembler,
        } = self;

        let fail = |err: TtsError| {
            warn!(request_id = %request_id, error = %err, "Synthesis stopped");
            let _ = tx.blocking_send(Err(err));
        };

        let engine = match guard.engine() {
            Ok(engine) => engine,
            Err(e) => {
                fail(e);
                return None;
            }
        };

        let mut metrics = MetricsCollector::new(request_id.as_str());
        let mut declared: Option<WavSpec> = None;
        let total = segments.len();

        for segment in &segments {
            if tx.is_closed() {
                info!(
                    request_id = %request_id,
                    next_segment = segment.index,
                    "Consumer gone, skipping remaining segments"
                );
                return None;
            }
            debug!(
                request_id = %request_id,
                "Synthesizing segment {}/{}",
                segment.index + 1,
                total
            );

            let (audio, engine_metrics) = match timed_synthesize(engine, &segment.text, &params) {
                Ok(result) => result,
                Err(e) => {
                    fail(e);
                    return None;
                }
            };
            metrics.record_segment(segment.index, segment.char_len, engine_metrics);

            let spec = *declared.get_or_insert_with(|| wav::spec_for(&audio));
            let bytes = match wav::encode(&audio, &spec, segment.index == 0) {
                Ok(bytes) => bytes,
                Err(e) => {
                    fail(e);
                    return None;
                }
            };

            for frame in assembler.push(&bytes) {
                if tx.blocking_send(Ok(frame)).is_err() {
                    info!(request_id = %request_id, "Consumer gone mid-segment");
                    return None;
                }
            }
        }

        if let Some(frame) = assembler.finish() {
            if tx.blocking_send(Ok(frame)).is_err() {
                return None;
            }
        }
        Some(metrics.finish())
    }
}

/// The ordered, single-use frame sequence of one request.
///
/// Ends with `None` after the last frame, or after an `Err` item when
/// synthesis failed part way.
#[derive(Debug)]
pub struct FrameStream {
    request_id: String,
    frames: mpsc::Receiver<Result<AudioFrame>>,
    summary: oneshot::Receiver<RequestMetrics>,
}

impl FrameStream {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn next_frame(&mut self) -> Option<Result<AudioFrame>> {
        self.frames.recv().await
    }

    /// Stop the producer. A call already running finishes, but no further
    /// segment is sent to the engine.
    pub fn cancel(&mut self) {
        self.frames.close();
    }

    /// Request totals, available once the stream has ended successfully.
    pub async fn metrics(self) -> Option<RequestMetrics> {
        self.summary.await.ok()
    }
}

impl Stream for FrameStream {
    type Item = Result<AudioFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().frames.poll_recv(cx)
    }
}
