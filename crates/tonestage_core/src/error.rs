//! Engine Error Types

use thiserror::Error;

/// Errors that can occur while configuring or driving the pipeline
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DSP error: {0}")]
    DspError(#[from] tonestage_dsp::DspError),

    #[error("Codec setup failed: {0}")]
    CodecError(String),

    #[error("Ring buffer overflow - output is not being drained")]
    BufferOverflow,

    #[error("Ring buffer underflow - not enough data available")]
    BufferUnderflow,

    #[error("Channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
