use thiserror::Error;

/// Failure categories of the synthesis pipeline.
///
/// `Validation` and `Capability` are always raised before the engine is
/// touched, so nothing has been delivered when they surface. `Engine` can
/// happen after frames have already left the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TtsError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unsupported by the active engine: {0}")]
    Capability(String),

    #[error("synthesis failed: {0}")]
    Engine(String),

    #[error("transport closed: {0}")]
    Transport(String),
}

impl TtsError {
    /// Short machine-readable name used in error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TtsError::Validation(_) => "validation_error",
            TtsError::Capability(_) => "capability_error",
            TtsError::Engine(_) => "engine_error",
            TtsError::Transport(_) => "transport_error",
        }
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            TtsError::Validation(msg)
            | TtsError::Capability(msg)
            | TtsError::Engine(msg)
            | TtsError::Transport(msg) => msg,
        }
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;
