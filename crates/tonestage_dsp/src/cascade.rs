//! Filter Cascade
//!
//! An ordered chain of biquad sections with fixed gain staging. The input is
//! attenuated by [`HEADROOM_SHIFT`] bits before the first section so boosting
//! filters cannot clip internally; the caller restores level with
//! [`FilterCascade::restore_headroom`] once downstream stages have run.

use tracing::debug;

use crate::biquad::{BiquadFilter, FilterKind, FilterSpec};
use crate::error::DspError;
use crate::clamp_channels;

/// Right shift applied before the first section (≈24 dB of headroom)
pub const HEADROOM_SHIFT: u32 = 4;

/// Left shift that restores level after limiting (×32, ≈30.1 dB)
pub const MAKEUP_SHIFT: u32 = 5;

/// The five-section tone-shaping curve the pipeline ships with
///
/// Two low-frequency boosts, a steep subsonic cut and a gentle treble lift.
/// Order is significant.
pub fn reference_specs(sample_rate: f64) -> [FilterSpec; 5] {
    [
        FilterSpec::new(FilterKind::Peaking, 55.0, sample_rate, 11.0, 1.0),
        FilterSpec::new(FilterKind::Peaking, 55.0, sample_rate, 11.0, 1.0),
        FilterSpec::new(FilterKind::HighPass, 40.0, sample_rate, 0.0, 0.85),
        FilterSpec::new(FilterKind::HighPass, 40.0, sample_rate, 0.0, 0.85),
        FilterSpec::new(FilterKind::HighShelf, 8000.0, sample_rate, 3.0, 0.71),
    ]
}

/// Biquad sections applied in order, sharing a channel count
pub struct FilterCascade {
    filters: Vec<BiquadFilter>,
    channels: usize,
}

impl FilterCascade {
    /// Build one section per spec, in order
    pub fn new(specs: &[FilterSpec], channels: usize, error_feedback: bool) -> Self {
        let channels = clamp_channels(channels);
        let filters: Vec<BiquadFilter> = specs
            .iter()
            .map(|spec| BiquadFilter::new(*spec, channels).with_error_feedback(error_feedback))
            .collect();

        debug!(
            "Filter cascade: {} sections, {} channels, error feedback {}",
            filters.len(),
            channels,
            error_feedback
        );

        Self { filters, channels }
    }

    /// The reference curve at 48 kHz without error feedback
    pub fn reference(channels: usize) -> Self {
        Self::new(&reference_specs(crate::DEFAULT_SAMPLE_RATE), channels, false)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of sections
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[BiquadFilter] {
        &self.filters
    }

    /// Section at `index`
    pub fn filter(&self, index: usize) -> Result<&BiquadFilter, DspError> {
        self.filters
            .get(index)
            .ok_or(DspError::InvalidFilterIndex(index))
    }

    /// Mutable section at `index`, for setters and controllers
    pub fn filter_mut(&mut self, index: usize) -> Result<&mut BiquadFilter, DspError> {
        self.filters
            .get_mut(index)
            .ok_or(DspError::InvalidFilterIndex(index))
    }

    /// Clear the memory of every section
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset_states();
        }
    }

    /// Apply headroom shift and all sections to one frame in place
    ///
    /// # Real-time Safety
    /// No allocations, no locks, O(sections × channels).
    #[inline]
    pub fn process(&mut self, samples: &mut [i32]) {
        let channels = self.channels.min(samples.len());
        let frame = &mut samples[..channels];

        for sample in frame.iter_mut() {
            *sample >>= HEADROOM_SHIFT;
        }
        for filter in &mut self.filters {
            filter.process(frame);
        }
    }

    /// Undo the headroom shift with make-up gain, saturating at full scale
    #[inline]
    pub fn restore_headroom(&self, samples: &mut [i32]) {
        let channels = self.channels.min(samples.len());
        for sample in &mut samples[..channels] {
            *sample = sample.saturating_mul(1 << MAKEUP_SHIFT);
        }
    }
}

impl Default for FilterCascade {
    fn default() -> Self {
        Self::reference(crate::DEFAULT_CHANNELS)
    }
}
