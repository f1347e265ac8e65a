//! Tonestage DSP - Fixed-Point Signal Processing
//!
//! This crate provides the per-frame audio processing blocks for Tonestage:
//! - Biquad filters with cookbook designs and Q8.24 coefficients
//! - A five-section filter cascade with fixed gain staging
//! - A lookahead peak limiter with attack, hold and release
//! - Lock-free coefficient and threshold updates from control threads
//!
//! # Architecture
//!
//! Every component processes one interleaved frame (one sample per channel)
//! at a time, in place, on `i32` samples. All buffers are allocated at
//! construction; the per-frame path never allocates, locks or fails.
//! Parameter changes are staged and take effect at the next frame boundary.

mod biquad;
mod cascade;
mod error;
pub mod fixed;
mod limiter;
mod processor;

pub use crate::biquad::{
    BiquadFilter, FilterController, FilterKind, FilterSpec, FixedCoefficients, MAX_GAIN_DB,
    MAX_Q, MIN_GAIN_DB,
};
pub use cascade::{reference_specs, FilterCascade, HEADROOM_SHIFT, MAKEUP_SHIFT};
pub use error::DspError;
pub use limiter::{LimiterConfig, LookaheadLimiter, ThresholdHandle, MAX_LOOKAHEAD_SAMPLES};
pub use processor::FrameProcessor;

/// Maximum number of interleaved channels a component supports
pub const MAX_CHANNELS: usize = 8;

/// Channel count used by the convenience constructors
pub const DEFAULT_CHANNELS: usize = 2;

/// Sampling frequency used by the convenience constructors (Hz)
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Clamp a requested channel count to `1..=MAX_CHANNELS`
#[inline]
pub fn clamp_channels(channels: usize) -> usize {
    channels.clamp(1, MAX_CHANNELS)
}
