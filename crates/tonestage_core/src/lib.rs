//! Tonestage Core - Pipeline and Engine
//!
//! This crate wires the DSP blocks into a running signal path:
//! - The pipeline entry point (filter cascade, limiter, make-up gain)
//! - Configuration with JSON loading and validation
//! - The hardware codec setup boundary
//! - Lock-free frame transport between capture and playback rings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   FilterController ──rtrb──▶        ThresholdHandle (atomic)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Context                          │
//! │   Capture ──rtrb──▶ Pipeline ──rtrb──▶ Playback            │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod config;
mod engine;
mod error;
mod pipeline;
mod transport;

pub use codec::{CodecConfig, CodecMode, CodecSetup, NullCodec};
pub use config::{
    reference_limiter, EngineConfig, PipelineConfig, MAX_ATTACK_SECONDS, MAX_ENVELOPE_SECONDS,
    MAX_TRANSPORT_FRAMES,
};
pub use engine::{AudioEngine, HostPorts};
pub use error::{EngineError, EngineResult};
pub use pipeline::Pipeline;
pub use transport::FrameTransport;

// Re-export DSP types for convenience
pub use tonestage_dsp::{
    BiquadFilter, FilterCascade, FilterController, FilterKind, FilterSpec, FrameProcessor,
    LimiterConfig, LookaheadLimiter, ThresholdHandle,
};
