//! Lookahead Peak Limiter
//!
//! Guarantees that no output sample exceeds a configured ceiling. Samples run
//! through a short delay line (the lookahead), while the gain envelope is
//! computed from the undelayed input. Gain reduction therefore starts before
//! the peak that caused it reaches the output.
//!
//! # Algorithm
//!
//! Per frame, with all values in Q1.31:
//! 1. Peak of all channels, coarsely quantized to its top 16 bits
//! 2. Target gain `threshold / peak` when the peak is above threshold
//! 3. Release smoothing with instant attack and a hold window
//! 4. Attack smoothing of the result into the applied gain
//! 5. Gain applied to the oldest buffered sample, hard-clamped to the ceiling
//!
//! The threshold lives in an atomic so it can be changed from a control
//! thread through a [`ThresholdHandle`] while audio is flowing.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fixed::{
    mul_q31, one_pole_coefficients, seconds_to_samples, threshold_to_linear, FULL_SCALE,
};
use crate::{clamp_channels, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};

/// Default ceiling (dBFS)
pub const DEFAULT_THRESHOLD_DB: f64 = -6.0;

/// Default attack time, also the lookahead length (seconds)
pub const DEFAULT_ATTACK_SECONDS: f64 = 0.002;

/// Default hold time (seconds)
pub const DEFAULT_HOLD_SECONDS: f64 = 0.01;

/// Default release time (seconds)
pub const DEFAULT_RELEASE_SECONDS: f64 = 1.0;

/// Longest lookahead delay line, in frames (one second at 192 kHz)
pub const MAX_LOOKAHEAD_SAMPLES: usize = 192_000;

/// Keeps the top 16 bits of the peak so the gain estimate needs only a
/// 32/16-bit division.
const PEAK_MASK: i32 = !0xFFFF;

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Ceiling in dBFS; 0 or above disables limiting
    pub threshold_db: f64,
    /// Attack time in seconds; also sets the lookahead delay
    pub attack_seconds: f64,
    /// Time the gain is held after a peak before releasing
    pub hold_seconds: f64,
    /// Release time constant in seconds
    pub release_seconds: f64,
    /// Number of interleaved channels (clamped to 1..=MAX_CHANNELS)
    pub channels: usize,
    /// Sampling frequency in Hz
    pub sample_rate: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold_db: DEFAULT_THRESHOLD_DB,
            attack_seconds: DEFAULT_ATTACK_SECONDS,
            hold_seconds: DEFAULT_HOLD_SECONDS,
            release_seconds: DEFAULT_RELEASE_SECONDS,
            channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl LimiterConfig {
    pub fn new(
        threshold_db: f64,
        attack_seconds: f64,
        hold_seconds: f64,
        release_seconds: f64,
        channels: usize,
        sample_rate: f64,
    ) -> Self {
        Self {
            threshold_db,
            attack_seconds,
            hold_seconds,
            release_seconds,
            channels,
            sample_rate,
        }
    }

    /// Default timing for the given channel count
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    /// Lookahead length in samples, clamped to `1..=MAX_LOOKAHEAD_SAMPLES`
    pub fn lookahead_samples(&self) -> usize {
        seconds_to_samples(self.attack_seconds, self.sample_rate).clamp(1, MAX_LOOKAHEAD_SAMPLES)
    }

    /// Hold length in samples
    pub fn hold_samples(&self) -> usize {
        seconds_to_samples(self.hold_seconds, self.sample_rate)
    }
}

/// Shared handle for changing a limiter's threshold from another thread
///
/// The ceiling is a single atomic word, so the audio thread sees either the
/// old or the new value.
#[derive(Debug, Clone)]
pub struct ThresholdHandle {
    threshold: Arc<AtomicI32>,
}

impl ThresholdHandle {
    /// Set the ceiling in dBFS; 0 dB or above disables limiting
    pub fn set_threshold_db(&self, threshold_db: f64) {
        self.threshold
            .store(threshold_to_linear(threshold_db), Ordering::Relaxed);
    }

    /// Current ceiling as a full-scale linear value
    pub fn threshold_linear(&self) -> i32 {
        self.threshold.load(Ordering::Relaxed)
    }
}

/// Fixed-point lookahead limiter
pub struct LookaheadLimiter {
    channels: usize,
    a_att: i32,
    b_att: i32,
    a_rel: i32,
    b_rel: i32,
    hold_samples: usize,
    lookahead_samples: usize,
    threshold: Arc<AtomicI32>,
    /// Frame-major delay line: `lookahead_samples` frames of `channels` samples
    lookahead: Box<[i32]>,
    cursor: usize,
    hold_count: usize,
    gain: i32,
    release_state: i32,
}

impl LookaheadLimiter {
    /// Create a limiter; all buffers are allocated here and never again
    pub fn new(config: LimiterConfig) -> Self {
        let channels = clamp_channels(config.channels);
        let (a_att, b_att) = one_pole_coefficients(config.attack_seconds, config.sample_rate);
        let (a_rel, b_rel) = one_pole_coefficients(config.release_seconds, config.sample_rate);
        let hold_samples = config.hold_samples();
        let lookahead_samples = config.lookahead_samples();
        let threshold = threshold_to_linear(config.threshold_db);

        debug!(
            "Limiter: threshold={}dB ({:#x}) lookahead={} hold={} channels={}",
            config.threshold_db, threshold, lookahead_samples, hold_samples, channels
        );

        Self {
            channels,
            a_att,
            b_att,
            a_rel,
            b_rel,
            hold_samples,
            lookahead_samples,
            threshold: Arc::new(AtomicI32::new(threshold)),
            lookahead: vec![0; lookahead_samples * channels].into_boxed_slice(),
            cursor: 0,
            hold_count: hold_samples,
            gain: FULL_SCALE,
            release_state: FULL_SCALE,
        }
    }

    /// Default limiter (-6 dBFS, 2 ms attack, 10 ms hold, 1 s release, 48 kHz)
    pub fn with_channels(channels: usize) -> Self {
        Self::new(LimiterConfig::with_channels(channels))
    }

    /// Set the ceiling in dBFS; 0 dB or above disables limiting
    pub fn set_threshold_db(&self, threshold_db: f64) {
        self.threshold
            .store(threshold_to_linear(threshold_db), Ordering::Relaxed);
    }

    /// Handle for changing the threshold from a control thread
    pub fn threshold_handle(&self) -> ThresholdHandle {
        ThresholdHandle {
            threshold: Arc::clone(&self.threshold),
        }
    }

    /// Current ceiling as a full-scale linear value
    pub fn threshold_linear(&self) -> i32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Gain applied to the most recent output frame (Q1.31)
    pub fn gain(&self) -> i32 {
        self.gain
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Delay introduced by the limiter, in frames
    pub fn lookahead_samples(&self) -> usize {
        self.lookahead_samples
    }

    pub fn hold_samples(&self) -> usize {
        self.hold_samples
    }

    /// Clear the delay line and return the envelope to unity gain
    pub fn reset(&mut self) {
        self.lookahead.fill(0);
        self.cursor = 0;
        self.hold_count = self.hold_samples;
        self.gain = FULL_SCALE;
        self.release_state = FULL_SCALE;
    }

    /// Limit one frame in place and return the applied gain (Q1.31)
    ///
    /// Output is the input delayed by [`Self::lookahead_samples`] frames.
    ///
    /// # Real-time Safety
    /// No allocations, no locks, O(channels).
    #[inline]
    pub fn process(&mut self, samples: &mut [i32]) -> i32 {
        let threshold = self.threshold.load(Ordering::Relaxed);
        let channels = self.channels.min(samples.len());
        let frame = &mut samples[..channels];

        let peak = frame
            .iter()
            .map(|s| s.saturating_abs())
            .max()
            .unwrap_or(0)
            & PEAK_MASK;

        // peak > threshold >= 0 implies peak >= 1 << 16, so the divisor is
        // non-zero and the quotient stays below 1 << 16.
        let target = if peak > threshold {
            (threshold / (peak >> 16)) << 15
        } else {
            FULL_SCALE
        };

        let candidate = ((target as i64 * self.b_rel as i64
            + self.release_state as i64 * self.a_rel as i64)
            >> 31) as i32;

        if target < candidate {
            self.release_state = target;
            self.hold_count = self.hold_samples;
        } else if self.hold_count > 0 {
            self.hold_count -= 1;
        } else {
            self.release_state = candidate;
        }

        self.gain = ((self.release_state as i64 * self.b_att as i64
            + self.gain as i64 * self.a_att as i64)
            >> 31) as i32;

        let gain = self.gain;
        let offset = self.cursor * self.channels;
        let slots = &mut self.lookahead[offset..offset + self.channels];
        for (sample, slot) in frame.iter_mut().zip(slots.iter_mut()) {
            let delayed = mul_q31(gain, *slot);
            *slot = *sample;
            *sample = delayed.clamp(-threshold, threshold);
        }

        self.cursor += 1;
        if self.cursor >= self.lookahead_samples {
            self.cursor = 0;
        }

        gain
    }
}
