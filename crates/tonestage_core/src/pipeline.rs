//! Pipeline Entry Point
//!
//! One call per incoming frame: headroom shift and filter cascade, then the
//! lookahead limiter, then make-up gain. Everything is allocated when the
//! pipeline is built; `process_frame` only touches pre-allocated state.

use tonestage_dsp::fixed::FULL_SCALE;
use tonestage_dsp::{FilterCascade, FrameProcessor, LookaheadLimiter, DEFAULT_SAMPLE_RATE};
use tracing::debug;

use crate::config::{reference_limiter, PipelineConfig};
use crate::error::EngineResult;

/// Filter cascade followed by the lookahead limiter
pub struct Pipeline {
    cascade: FilterCascade,
    limiter: LookaheadLimiter,
}

impl Pipeline {
    /// Build from already-constructed stages
    pub fn new(cascade: FilterCascade, limiter: LookaheadLimiter) -> Self {
        Self { cascade, limiter }
    }

    /// The shipped tone curve and limiter at 48 kHz
    pub fn reference(channels: usize) -> Self {
        Self::new(
            FilterCascade::reference(channels),
            LookaheadLimiter::new(reference_limiter(channels, DEFAULT_SAMPLE_RATE)),
        )
    }

    /// Validate a configuration and build the stages it describes
    pub fn from_config(config: &PipelineConfig) -> EngineResult<Self> {
        config.validate()?;

        let cascade = FilterCascade::new(
            &config.filter_specs(),
            config.channels,
            config.error_feedback,
        );
        let limiter = LookaheadLimiter::new(config.limiter_config());

        debug!(
            "Pipeline: {} filters, {} channels at {}Hz, latency {} frames",
            cascade.len(),
            config.channels,
            config.sample_rate,
            limiter.lookahead_samples()
        );

        Ok(Self::new(cascade, limiter))
    }

    pub fn channels(&self) -> usize {
        self.cascade.channels()
    }

    /// Delay from input to output, in frames
    pub fn latency_frames(&self) -> usize {
        self.limiter.lookahead_samples()
    }

    pub fn cascade(&self) -> &FilterCascade {
        &self.cascade
    }

    /// Filter sections, for setters and controllers
    pub fn cascade_mut(&mut self) -> &mut FilterCascade {
        &mut self.cascade
    }

    pub fn limiter(&self) -> &LookaheadLimiter {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut LookaheadLimiter {
        &mut self.limiter
    }

    /// Clear filter memory, the limiter delay line and its envelope
    pub fn reset(&mut self) {
        self.cascade.reset();
        self.limiter.reset();
    }

    /// Process one frame in place and return the limiter gain (Q1.31)
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no logging.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [i32]) -> i32 {
        self.cascade.process(frame);
        let gain = self.limiter.process(frame);
        self.cascade.restore_headroom(frame);
        gain
    }

    /// Process an interleaved buffer and return the lowest gain applied
    ///
    /// A trailing partial frame is left untouched.
    pub fn process_interleaved(&mut self, buffer: &mut [i32]) -> i32 {
        let channels = self.channels();
        buffer
            .chunks_exact_mut(channels)
            .map(|frame| self.process_frame(frame))
            .min()
            .unwrap_or(FULL_SCALE)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::reference(tonestage_dsp::DEFAULT_CHANNELS)
    }
}

impl FrameProcessor for Pipeline {
    #[inline]
    fn process_frame(&mut self, frame: &mut [i32]) {
        Pipeline::process_frame(self, frame);
    }

    fn reset(&mut self) {
        Pipeline::reset(self);
    }

    fn name(&self) -> &'static str {
        "Pipeline"
    }

    fn channels(&self) -> usize {
        Pipeline::channels(self)
    }

    fn process_interleaved(&mut self, buffer: &mut [i32]) {
        Pipeline::process_interleaved(self, buffer);
    }
}
