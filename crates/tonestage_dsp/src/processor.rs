//! Frame Processor Trait
//!
//! Common interface for the per-frame blocks so they can be driven by the
//! same transport and benchmark code (filter, cascade, limiter, pipeline).

use crate::biquad::BiquadFilter;
use crate::cascade::FilterCascade;
use crate::limiter::LookaheadLimiter;

/// Trait for in-place processors of interleaved `i32` frames
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process_frame()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO logging
/// - O(channels) work per frame
///
/// The caller serializes all calls; a processor is never entered from two
/// contexts at once.
pub trait FrameProcessor: Send {
    /// Process one frame (one sample per channel) in place
    fn process_frame(&mut self, frame: &mut [i32]);

    /// Reset internal state (filter memory, delay lines, envelopes)
    fn reset(&mut self);

    /// Human-readable name for debugging
    fn name(&self) -> &'static str;

    /// Number of interleaved channels per frame
    fn channels(&self) -> usize;

    /// Process an interleaved buffer frame by frame
    ///
    /// A trailing partial frame is left untouched.
    fn process_interleaved(&mut self, buffer: &mut [i32]) {
        let channels = self.channels();
        for frame in buffer.chunks_exact_mut(channels) {
            self.process_frame(frame);
        }
    }
}

impl FrameProcessor for BiquadFilter {
    #[inline]
    fn process_frame(&mut self, frame: &mut [i32]) {
        self.process(frame);
    }

    fn reset(&mut self) {
        self.reset_states();
    }

    fn name(&self) -> &'static str {
        "Biquad"
    }

    fn channels(&self) -> usize {
        BiquadFilter::channels(self)
    }
}

impl FrameProcessor for FilterCascade {
    #[inline]
    fn process_frame(&mut self, frame: &mut [i32]) {
        self.process(frame);
    }

    fn reset(&mut self) {
        FilterCascade::reset(self);
    }

    fn name(&self) -> &'static str {
        "Filter Cascade"
    }

    fn channels(&self) -> usize {
        FilterCascade::channels(self)
    }
}

impl FrameProcessor for LookaheadLimiter {
    #[inline]
    fn process_frame(&mut self, frame: &mut [i32]) {
        self.process(frame);
    }

    fn reset(&mut self) {
        LookaheadLimiter::reset(self);
    }

    fn name(&self) -> &'static str {
        "Lookahead Limiter"
    }

    fn channels(&self) -> usize {
        LookaheadLimiter::channels(self)
    }
}
