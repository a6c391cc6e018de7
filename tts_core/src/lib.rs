//! Streaming text-to-speech core.
//!
//! Text is split into sentence-sized segments, each segment is synthesized
//! by the single [`SynthesisEngine`] in turn, and the resulting PCM is
//! written as one WAV byte stream sliced into fixed-size [`AudioFrame`]s.
//! Transports consume a [`FrameStream`] and never talk to the engine.

mod coordinator;
mod engine;
mod error;
mod frame;
mod metrics;
mod piper;
mod segment;
pub mod wav;

pub use coordinator::{CoordinatorConfig, FrameStream, StreamCoordinator, SynthesisRequest};
pub use engine::{
    timed_synthesize, Capabilities, EngineHandle, EngineMetrics, RawAudio, SynthesisEngine,
    SynthesisParams,
};
pub use error::{Result, TtsError};
pub use frame::{AudioFrame, FrameAssembler, DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
pub use metrics::{real_time_factor, MetricsCollector, RequestMetrics, SegmentMetrics};
pub use piper::{parse_voice_map, PiperEngine, VoiceEntry};
pub use segment::{segment, TextSegment};
