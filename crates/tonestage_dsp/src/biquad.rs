//! Fixed-Point BiQuad Filter
//!
//! Second-order IIR section with Q8.24 coefficients and filter memory.
//! Coefficients are derived from analog prototypes with the bilinear
//! transform, following the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook.
//!
//! # Coefficient Updates
//!
//! Every filter holds an **active** coefficient set used by [`BiquadFilter::process`]
//! and an optional **pending** set produced by a redesign. The pending set is
//! latched exactly once per `process()` call, before any channel is touched,
//! so a single call never mixes old and new coefficients.
//!
//! Updates from another thread go through a [`FilterController`], which sends
//! whole coefficient snapshots over a lock-free SPSC ring. The filter drains
//! the ring at the same latch point; a snapshot is either fully visible or
//! not visible at all.
//!
//! The latch does NOT clear filter memory. A large coefficient change while
//! audio is flowing can therefore produce a short transient.

use std::f64::consts::PI;
use std::fmt;

use biquad::Coefficients;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::DspError;
use crate::fixed::{from_q8_24, to_q8_24, ERROR_MASK, FIXED_ONE, FRACTIONAL_BITS};
use crate::{clamp_channels, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};

/// Lowest allowed gain (dB)
pub const MIN_GAIN_DB: f64 = -24.0;

/// Highest allowed gain (dB)
pub const MAX_GAIN_DB: f64 = 24.0;

/// Highest allowed quality factor
pub const MAX_Q: f64 = 30.0;

/// Quality factors below this are raised to it when designing
pub const MIN_DESIGN_Q: f64 = 0.1;

/// Lowest accepted sampling rate (Hz)
pub const MIN_SAMPLE_RATE: f64 = 1.0;

/// Filter response type
///
/// The numeric codes (see `From<u8>`) follow the declaration order, starting
/// at 0 for [`FilterKind::Gain`]. Any unknown code or name maps to
/// [`FilterKind::Identity`], which passes audio through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Gain,
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peaking,
    LowShelf,
    HighShelf,
    /// Low shelf with the slope set by Q instead of the shelf slope S
    LowShelfQ,
    /// High shelf with the slope set by Q instead of the shelf slope S
    HighShelfQ,
    AllPass,
    Identity,
}

impl FilterKind {
    /// All designable kinds, in code order
    pub const ALL: [FilterKind; 11] = [
        FilterKind::Gain,
        FilterKind::LowPass,
        FilterKind::HighPass,
        FilterKind::BandPass,
        FilterKind::Notch,
        FilterKind::Peaking,
        FilterKind::LowShelf,
        FilterKind::HighShelf,
        FilterKind::LowShelfQ,
        FilterKind::HighShelfQ,
        FilterKind::AllPass,
    ];

    /// Stable name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Gain => "gain",
            FilterKind::LowPass => "low_pass",
            FilterKind::HighPass => "high_pass",
            FilterKind::BandPass => "band_pass",
            FilterKind::Notch => "notch",
            FilterKind::Peaking => "peaking",
            FilterKind::LowShelf => "low_shelf",
            FilterKind::HighShelf => "high_shelf",
            FilterKind::LowShelfQ => "low_shelf_q",
            FilterKind::HighShelfQ => "high_shelf_q",
            FilterKind::AllPass => "all_pass",
            FilterKind::Identity => "identity",
        }
    }

    /// Parse a configuration name; unknown names become [`FilterKind::Identity`]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .unwrap_or(FilterKind::Identity)
    }
}

impl From<u8> for FilterKind {
    fn from(code: u8) -> Self {
        Self::ALL
            .get(code as usize)
            .copied()
            .unwrap_or(FilterKind::Identity)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for FilterKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for FilterKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(FilterKind::from_name(&name))
    }
}

/// Design-time description of one biquad section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub kind: FilterKind,
    /// Center/corner frequency in Hz, within [0, sample_rate / 2]
    pub frequency: f64,
    /// Sampling frequency in Hz
    pub sample_rate: f64,
    /// Gain in dB, within [-24, 24]
    pub gain_db: f64,
    /// Quality factor, within [0, 30]
    pub q: f64,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            kind: FilterKind::Peaking,
            frequency: 1000.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain_db: 0.0,
            q: 0.7071,
        }
    }
}

impl FilterSpec {
    /// Create a spec with every field clamped into range
    pub fn new(kind: FilterKind, frequency: f64, sample_rate: f64, gain_db: f64, q: f64) -> Self {
        Self {
            kind,
            frequency,
            sample_rate,
            gain_db,
            q,
        }
        .clamped()
    }

    /// Return a copy with every field clamped into range
    pub fn clamped(mut self) -> Self {
        self.sample_rate = clamp_or(self.sample_rate, MIN_SAMPLE_RATE, f64::MAX, DEFAULT_SAMPLE_RATE);
        self.frequency = clamp_or(self.frequency, 0.0, self.nyquist(), 0.0);
        self.gain_db = clamp_or(self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB, 0.0);
        self.q = clamp_or(self.q, 0.0, MAX_Q, MIN_DESIGN_Q);
        self
    }

    /// Half the sampling frequency
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    pub fn set_kind(&mut self, kind: FilterKind) {
        self.kind = kind;
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = clamp_or(frequency, 0.0, self.nyquist(), 0.0);
    }

    /// Set the sampling frequency, re-clamping the center frequency to the new Nyquist limit
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = clamp_or(sample_rate, MIN_SAMPLE_RATE, f64::MAX, DEFAULT_SAMPLE_RATE);
        self.frequency = self.frequency.min(self.nyquist());
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = clamp_or(gain_db, MIN_GAIN_DB, MAX_GAIN_DB, 0.0);
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = clamp_or(q, 0.0, MAX_Q, MIN_DESIGN_Q);
    }

    /// Normalized real coefficients `[b0, b1, b2, -a1, -a2] / a0`
    ///
    /// Recursive coefficients are returned negated, matching the storage
    /// convention of [`FixedCoefficients`].
    pub fn design(&self) -> [f64; 5] {
        let omega = 2.0 * PI * self.frequency / self.sample_rate;
        let cs = omega.cos();
        let sn = omega.sin();
        let a = 10.0_f64.powf(self.gain_db / 40.0);
        let q = self.q.max(MIN_DESIGN_Q);
        let s = q.min(1.0);
        let alpha = sn * (1.0 / (2.0 * q)).sinh();
        let beta = ((a * a + 1.0) / s - (a - 1.0) * (a - 1.0)).sqrt();

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Gain => (a * a, 0.0, 0.0, 1.0, 0.0, 0.0),
            FilterKind::LowPass => (
                (1.0 - cs) / 2.0,
                1.0 - cs,
                (1.0 - cs) / 2.0,
                1.0 + alpha,
                -2.0 * cs,
                1.0 - alpha,
            ),
            FilterKind::HighPass => (
                (1.0 + cs) / 2.0,
                -1.0 - cs,
                (1.0 + cs) / 2.0,
                1.0 + alpha,
                -2.0 * cs,
                1.0 - alpha,
            ),
            FilterKind::BandPass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterKind::Notch => (1.0, -2.0 * cs, 1.0, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterKind::Peaking => (
                1.0 + alpha * a,
                -2.0 * cs,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cs,
                1.0 - alpha / a,
            ),
            FilterKind::LowShelf => low_shelf(a, cs, beta * sn),
            FilterKind::HighShelf => high_shelf(a, cs, beta * sn),
            FilterKind::LowShelfQ => low_shelf(a, cs, 2.0 * a.sqrt() * alpha),
            FilterKind::HighShelfQ => high_shelf(a, cs, 2.0 * a.sqrt() * alpha),
            FilterKind::AllPass => (
                1.0 - alpha,
                -2.0 * cs,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cs,
                1.0 - alpha,
            ),
            FilterKind::Identity => (1.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        };

        [b0 / a0, b1 / a0, b2 / a0, -a1 / a0, -a2 / a0]
    }
}

/// Shelf numerator/denominator with `k` standing in for `β·sin ω` or `2√A·α`
fn low_shelf(a: f64, cs: f64, k: f64) -> (f64, f64, f64, f64, f64, f64) {
    (
        a * ((a + 1.0) - (a - 1.0) * cs + k),
        2.0 * a * ((a - 1.0) - (a + 1.0) * cs),
        a * ((a + 1.0) - (a - 1.0) * cs - k),
        (a + 1.0) + (a - 1.0) * cs + k,
        -2.0 * ((a - 1.0) + (a + 1.0) * cs),
        (a + 1.0) + (a - 1.0) * cs - k,
    )
}

fn high_shelf(a: f64, cs: f64, k: f64) -> (f64, f64, f64, f64, f64, f64) {
    (
        a * ((a + 1.0) + (a - 1.0) * cs + k),
        -2.0 * a * ((a - 1.0) + (a + 1.0) * cs),
        a * ((a + 1.0) + (a - 1.0) * cs - k),
        (a + 1.0) - (a - 1.0) * cs + k,
        2.0 * ((a - 1.0) - (a + 1.0) * cs),
        (a + 1.0) - (a - 1.0) * cs - k,
    )
}

/// Clamp into `[lo, hi]`, replacing NaN with `fallback`
fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.max(lo).min(hi)
    }
}

/// Normalized biquad coefficients in Q8.24
///
/// `H(z) = (b0 + b1·z⁻¹ + b2·z⁻²) / (1 - a1·z⁻¹ - a2·z⁻²)`: the recursive
/// coefficients are stored negated so processing is a pure multiply-accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedCoefficients {
    pub b0: i32,
    pub b1: i32,
    pub b2: i32,
    pub a1: i32,
    pub a2: i32,
}

impl FixedCoefficients {
    /// Pass-through section
    pub const IDENTITY: FixedCoefficients = FixedCoefficients {
        b0: FIXED_ONE,
        b1: 0,
        b2: 0,
        a1: 0,
        a2: 0,
    };

    /// Quantize `[b0, b1, b2, -a1, -a2]` to Q8.24
    pub fn from_f64(values: [f64; 5]) -> Self {
        let [b0, b1, b2, a1, a2] = values.map(to_q8_24);
        Self { b0, b1, b2, a1, a2 }
    }

    /// Design and quantize coefficients for a spec
    pub fn design(spec: &FilterSpec) -> Self {
        Self::from_f64(spec.design())
    }

    /// Real values `[b0, b1, b2, -a1, -a2]`
    pub fn to_f64(&self) -> [f64; 5] {
        [self.b0, self.b1, self.b2, self.a1, self.a2].map(from_q8_24)
    }

    /// Floating-point coefficients in the `biquad` crate's sign convention
    /// (`y = b0·x + b1·x1 + b2·x2 - a1·y1 - a2·y2`)
    pub fn to_biquad(&self) -> Coefficients<f64> {
        let [b0, b1, b2, a1, a2] = self.to_f64();
        Coefficients {
            a1: -a1,
            a2: -a2,
            b0,
            b1,
            b2,
        }
    }
}

impl Default for FixedCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per-channel filter memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    /// x[n-1]
    pub x1: i32,
    /// x[n-2]
    pub x2: i32,
    /// y[n-1]
    pub y1: i32,
    /// y[n-2]
    pub y2: i32,
    /// Fractional bits discarded by the last quantization (error feedback only)
    pub error: i32,
}

/// A coefficient snapshot sent from a [`FilterController`]
#[derive(Debug, Clone, Copy)]
struct CoefficientUpdate {
    spec: FilterSpec,
    coefficients: FixedCoefficients,
}

/// Fixed-point biquad filter for up to [`crate::MAX_CHANNELS`] channels
pub struct BiquadFilter {
    spec: FilterSpec,
    stale: bool,
    active: FixedCoefficients,
    pending: Option<FixedCoefficients>,
    updates: Option<Consumer<CoefficientUpdate>>,
    states: [FilterState; crate::MAX_CHANNELS],
    channels: usize,
    error_feedback: bool,
}

impl BiquadFilter {
    /// Create a filter from a spec and design its coefficients
    ///
    /// `channels` is clamped to `1..=MAX_CHANNELS`.
    pub fn new(spec: FilterSpec, channels: usize) -> Self {
        let spec = spec.clamped();
        let active = FixedCoefficients::design(&spec);
        debug!(
            "Designed {} filter: f0={}Hz fs={}Hz gain={}dB Q={} -> {:?}",
            spec.kind, spec.frequency, spec.sample_rate, spec.gain_db, spec.q, active
        );

        Self {
            spec,
            stale: false,
            active,
            pending: None,
            updates: None,
            states: [FilterState::default(); crate::MAX_CHANNELS],
            channels: clamp_channels(channels),
            error_feedback: false,
        }
    }

    /// Enable or disable quantization-error feedback (noise shaping)
    pub fn with_error_feedback(mut self, enabled: bool) -> Self {
        self.error_feedback = enabled;
        self
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn error_feedback(&self) -> bool {
        self.error_feedback
    }

    /// Whether a parameter changed since the last redesign
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Coefficients currently used by `process()`
    pub fn active_coefficients(&self) -> FixedCoefficients {
        self.active
    }

    /// Coefficients waiting to be latched by the next `process()` call
    pub fn pending_coefficients(&self) -> Option<FixedCoefficients> {
        self.pending
    }

    pub fn set_kind(&mut self, kind: FilterKind, auto_redesign: bool) {
        self.spec.set_kind(kind);
        self.changed(auto_redesign);
    }

    pub fn set_frequency(&mut self, frequency: f64, auto_redesign: bool) {
        self.spec.set_frequency(frequency);
        self.changed(auto_redesign);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64, auto_redesign: bool) {
        self.spec.set_sample_rate(sample_rate);
        self.changed(auto_redesign);
    }

    pub fn set_gain_db(&mut self, gain_db: f64, auto_redesign: bool) {
        self.spec.set_gain_db(gain_db);
        self.changed(auto_redesign);
    }

    pub fn set_q(&mut self, q: f64, auto_redesign: bool) {
        self.spec.set_q(q);
        self.changed(auto_redesign);
    }

    fn changed(&mut self, auto_redesign: bool) {
        self.stale = true;
        if auto_redesign {
            self.redesign();
        }
    }

    /// Recompute coefficients from the current spec and stage them as pending
    pub fn redesign(&mut self) {
        let coefficients = FixedCoefficients::design(&self.spec);
        debug!("Redesigned {} filter -> {:?}", self.spec.kind, coefficients);
        self.pending = Some(coefficients);
        self.stale = false;
    }

    /// Stage arbitrary normalized coefficients `[b0, b1, b2, -a1, -a2]`
    ///
    /// The spec is left untouched and no longer describes the response.
    pub fn set_float_coefficients(&mut self, values: [f64; 5]) {
        self.pending = Some(FixedCoefficients::from_f64(values));
        self.stale = false;
    }

    /// Create a controller for updating this filter from another thread
    ///
    /// `capacity` bounds the number of snapshots in flight. Creating a new
    /// controller disconnects the previous one.
    pub fn controller(&mut self, capacity: usize) -> FilterController {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        if self.updates.replace(consumer).is_some() {
            debug!("Replaced existing controller for {} filter", self.spec.kind);
        }
        FilterController {
            spec: self.spec,
            producer,
        }
    }

    /// Clear all per-channel memory; coefficients are untouched
    pub fn reset_states(&mut self) {
        self.states = [FilterState::default(); crate::MAX_CHANNELS];
    }

    /// Latch remote snapshots and pending coefficients into the active set
    #[inline]
    fn latch(&mut self) {
        if let Some(updates) = self.updates.as_mut() {
            // Newest snapshot wins
            while let Ok(update) = updates.pop() {
                self.spec = update.spec;
                self.pending = Some(update.coefficients);
                self.stale = false;
            }
        }
        if let Some(next) = self.pending.take() {
            self.active = next;
        }
    }

    /// Filter one frame in place, one sample per channel
    ///
    /// # Real-time Safety
    /// No allocations, no locks, O(channels).
    #[inline]
    pub fn process(&mut self, samples: &mut [i32]) {
        self.latch();

        let c = self.active;
        let error_feedback = self.error_feedback;
        let channels = self.channels.min(samples.len());

        for (sample, state) in samples[..channels].iter_mut().zip(self.states.iter_mut()) {
            let x = *sample;

            // 32x32 products fit in 62 bits; the sum wraps like a hardware MAC
            let mut acc = (c.b0 as i64 * x as i64)
                .wrapping_add(c.b1 as i64 * state.x1 as i64)
                .wrapping_add(c.b2 as i64 * state.x2 as i64)
                .wrapping_add(c.a1 as i64 * state.y1 as i64)
                .wrapping_add(c.a2 as i64 * state.y2 as i64);
            if error_feedback {
                acc = acc.wrapping_add(state.error as i64);
            }

            state.x2 = state.x1;
            state.x1 = x;

            let y = (acc >> FRACTIONAL_BITS) as i32;

            state.y2 = state.y1;
            state.y1 = y;

            if error_feedback {
                state.error = (acc & ERROR_MASK) as i32;
            }

            *sample = y;
        }
    }
}

impl Default for BiquadFilter {
    /// 0 dB peaking section with exact identity coefficients
    fn default() -> Self {
        Self {
            spec: FilterSpec::default(),
            stale: false,
            active: FixedCoefficients::IDENTITY,
            pending: None,
            updates: None,
            states: [FilterState::default(); crate::MAX_CHANNELS],
            channels: DEFAULT_CHANNELS,
            error_feedback: false,
        }
    }
}

/// Control-side handle that redesigns a [`BiquadFilter`] owned by another thread
///
/// Setters mirror the filter's own setters. Each redesign sends a complete
/// snapshot; the filter picks up the newest one at its next `process()` call.
pub struct FilterController {
    spec: FilterSpec,
    producer: Producer<CoefficientUpdate>,
}

impl FilterController {
    /// The spec as last set through this controller
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn set_kind(&mut self, kind: FilterKind, auto_redesign: bool) -> Result<(), DspError> {
        self.spec.set_kind(kind);
        self.changed(auto_redesign)
    }

    pub fn set_frequency(&mut self, frequency: f64, auto_redesign: bool) -> Result<(), DspError> {
        self.spec.set_frequency(frequency);
        self.changed(auto_redesign)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64, auto_redesign: bool) -> Result<(), DspError> {
        self.spec.set_sample_rate(sample_rate);
        self.changed(auto_redesign)
    }

    pub fn set_gain_db(&mut self, gain_db: f64, auto_redesign: bool) -> Result<(), DspError> {
        self.spec.set_gain_db(gain_db);
        self.changed(auto_redesign)
    }

    pub fn set_q(&mut self, q: f64, auto_redesign: bool) -> Result<(), DspError> {
        self.spec.set_q(q);
        self.changed(auto_redesign)
    }

    fn changed(&mut self, auto_redesign: bool) -> Result<(), DspError> {
        if auto_redesign {
            self.redesign()
        } else {
            Ok(())
        }
    }

    /// Design coefficients for the current spec and send them to the filter
    pub fn redesign(&mut self) -> Result<(), DspError> {
        if self.producer.is_abandoned() {
            return Err(DspError::FilterDropped);
        }
        let update = CoefficientUpdate {
            spec: self.spec,
            coefficients: FixedCoefficients::design(&self.spec),
        };
        self.producer.push(update).map_err(|_| {
            warn!("Coefficient update for {} filter dropped: queue full", self.spec.kind);
            DspError::UpdateQueueFull
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biquad::{Biquad, DirectForm1};

    const FS: f64 = 48000.0;

    fn sine(n: usize, freq: f64, amplitude: f64) -> i32 {
        ((2.0 * PI * freq * n as f64 / FS).sin() * amplitude).round() as i32
    }

    fn assert_close(actual: [f64; 5], expected: [f64; 5]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{:?} != {:?}", actual, expected);
        }
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> [f64; 5] {
        [b0 / a0, b1 / a0, b2 / a0, -a1 / a0, -a2 / a0]
    }

    #[test]
    fn test_default_filter_is_identity() {
        let mut filter = BiquadFilter::default();
        assert_eq!(filter.active_coefficients(), FixedCoefficients::IDENTITY);
        assert_eq!(filter.spec().kind, FilterKind::Peaking);
        assert_eq!(filter.spec().gain_db, 0.0);

        for x in [0, 1, -1, 123_456, -7_654_321, i32::MAX, i32::MIN] {
            let mut frame = [x, -x.saturating_add(1)];
            let expected = frame;
            filter.process(&mut frame);
            assert_eq!(frame, expected);
        }
    }

    #[test]
    fn test_design_matches_cookbook_formulas() {
        let (f0, gain_db, q): (f64, f64, f64) = (1000.0, 6.0, 0.9);
        let w = 2.0 * PI * f0 / FS;
        let (cs, sn) = (w.cos(), w.sin());
        let a = 10.0_f64.powf(gain_db / 40.0);
        let alpha = sn * (1.0 / (2.0 * q)).sinh();
        let beta = ((a * a + 1.0) / q - (a - 1.0) * (a - 1.0)).sqrt();
        let ksq = 2.0 * a.sqrt() * alpha;

        let expected = |kind: FilterKind| match kind {
            FilterKind::Gain => normalize(a * a, 0.0, 0.0, 1.0, 0.0, 0.0),
            FilterKind::LowPass => normalize(
                (1.0 - cs) / 2.0, 1.0 - cs, (1.0 - cs) / 2.0,
                1.0 + alpha, -2.0 * cs, 1.0 - alpha,
            ),
            FilterKind::HighPass => normalize(
                (1.0 + cs) / 2.0, -(1.0 + cs), (1.0 + cs) / 2.0,
                1.0 + alpha, -2.0 * cs, 1.0 - alpha,
            ),
            FilterKind::BandPass => normalize(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterKind::Notch => normalize(1.0, -2.0 * cs, 1.0, 1.0 + alpha, -2.0 * cs, 1.0 - alpha),
            FilterKind::Peaking => normalize(
                1.0 + alpha * a, -2.0 * cs, 1.0 - alpha * a,
                1.0 + alpha / a, -2.0 * cs, 1.0 - alpha / a,
            ),
            FilterKind::LowShelf => normalize(
                a * (a + 1.0 - (a - 1.0) * cs + beta * sn),
                2.0 * a * (a - 1.0 - (a + 1.0) * cs),
                a * (a + 1.0 - (a - 1.0) * cs - beta * sn),
                a + 1.0 + (a - 1.0) * cs + beta * sn,
                -2.0 * ((a - 1.0) + (a + 1.0) * cs),
                a + 1.0 + (a - 1.0) * cs - beta * sn,
            ),
            FilterKind::HighShelf => normalize(
                a * (a + 1.0 + (a - 1.0) * cs + beta * sn),
                -2.0 * a * (a - 1.0 + (a + 1.0) * cs),
                a * (a + 1.0 + (a - 1.0) * cs - beta * sn),
                a + 1.0 - (a - 1.0) * cs + beta * sn,
                2.0 * ((a - 1.0) - (a + 1.0) * cs),
                a + 1.0 - (a - 1.0) * cs - beta * sn,
            ),
            FilterKind::LowShelfQ => normalize(
                a * (a + 1.0 - (a - 1.0) * cs + ksq),
                2.0 * a * (a - 1.0 - (a + 1.0) * cs),
                a * (a + 1.0 - (a - 1.0) * cs - ksq),
                a + 1.0 + (a - 1.0) * cs + ksq,
                -2.0 * ((a - 1.0) + (a + 1.0) * cs),
                a + 1.0 + (a - 1.0) * cs - ksq,
            ),
            FilterKind::HighShelfQ => normalize(
                a * (a + 1.0 + (a - 1.0) * cs + ksq),
                -2.0 * a * (a - 1.0 + (a + 1.0) * cs),
                a * (a + 1.0 + (a - 1.0) * cs - ksq),
                a + 1.0 - (a - 1.0) * cs + ksq,
                2.0 * ((a - 1.0) - (a + 1.0) * cs),
                a + 1.0 - (a - 1.0) * cs - ksq,
            ),
            FilterKind::AllPass => normalize(
                1.0 - alpha, -2.0 * cs, 1.0 + alpha,
                1.0 + alpha, -2.0 * cs, 1.0 - alpha,
            ),
            FilterKind::Identity => normalize(1.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        };

        for kind in FilterKind::ALL.into_iter().chain([FilterKind::Identity]) {
            let spec = FilterSpec::new(kind, f0, FS, gain_db, q);
            let real = spec.design();
            assert_close(real, expected(kind));

            let fixed = FixedCoefficients::design(&spec);
            let quantized = [fixed.b0, fixed.b1, fixed.b2, fixed.a1, fixed.a2];
            for (q, v) in quantized.iter().zip(real.iter()) {
                let expected = (v * FIXED_ONE as f64)
                    .round()
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                assert_eq!(*q, expected, "{} quantization", kind);
            }
        }
    }

    #[test]
    fn test_q_is_floored_during_design() {
        let low = FilterSpec::new(FilterKind::LowPass, 500.0, FS, 0.0, 0.0);
        let floor = FilterSpec::new(FilterKind::LowPass, 500.0, FS, 0.0, MIN_DESIGN_Q);
        assert_eq!(low.q, 0.0, "stored Q keeps the clamped value");
        assert_eq!(low.design(), floor.design());
    }

    #[test]
    fn test_setters_clamp_values() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);

        filter.set_gain_db(100.0, true);
        assert_eq!(filter.spec().gain_db, MAX_GAIN_DB);
        filter.set_gain_db(-100.0, true);
        assert_eq!(filter.spec().gain_db, MIN_GAIN_DB);

        filter.set_frequency(30_000.0, true);
        assert_eq!(filter.spec().frequency, FS / 2.0);
        filter.set_frequency(-5.0, true);
        assert_eq!(filter.spec().frequency, 0.0);

        filter.set_q(99.0, true);
        assert_eq!(filter.spec().q, MAX_Q);
        filter.set_q(-1.0, true);
        assert_eq!(filter.spec().q, 0.0);

        filter.set_frequency(20_000.0, true);
        filter.set_sample_rate(16_000.0, true);
        assert_eq!(filter.spec().frequency, 8_000.0);
    }

    #[test]
    fn test_deferred_redesign_marks_stale() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let before = filter.active_coefficients();

        filter.set_gain_db(6.0, false);
        filter.set_frequency(2000.0, false);
        assert!(filter.is_stale());
        assert!(filter.pending_coefficients().is_none());

        let mut frame = [0, 0];
        filter.process(&mut frame);
        assert_eq!(filter.active_coefficients(), before);

        filter.redesign();
        assert!(!filter.is_stale());
        let expected = FixedCoefficients::design(&FilterSpec::new(FilterKind::Peaking, 2000.0, FS, 6.0, 0.7071));
        assert_eq!(filter.pending_coefficients(), Some(expected));
    }

    #[test]
    fn test_pending_latched_at_process_boundary() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let old = filter.active_coefficients();

        filter.set_gain_db(9.0, true);
        let new = filter.pending_coefficients().unwrap();
        assert_ne!(old, new);
        assert_eq!(filter.active_coefficients(), old);

        let mut frame = [1000, -1000];
        filter.process(&mut frame);
        assert_eq!(filter.active_coefficients(), new);
        assert!(filter.pending_coefficients().is_none());
    }

    #[test]
    fn test_latch_keeps_filter_memory() {
        let mut filter = BiquadFilter::new(FilterSpec::new(FilterKind::LowPass, 1000.0, FS, 0.0, 0.7), 1);
        for n in 0..100 {
            filter.process(&mut [sine(n, 440.0, 1_000_000.0)]);
        }
        let memory = filter.states[0];
        assert_ne!(memory, FilterState::default());

        filter.set_frequency(3000.0, true);
        filter.latch();
        assert_eq!(filter.states[0], memory);
    }

    #[test]
    fn test_peaking_gain_at_center_frequency() {
        let spec = FilterSpec::new(FilterKind::Peaking, 55.0, FS, 11.0, 1.0);
        let mut filter = BiquadFilter::new(spec, 1);
        let amplitude = (1 << 22) as f64;

        let mut peak = 0_i32;
        for n in 0..48_000 {
            let mut frame = [sine(n, 55.0, amplitude)];
            filter.process(&mut frame);
            if n >= 46_000 {
                peak = peak.max(frame[0].abs());
            }
        }

        let ratio = peak as f64 / amplitude;
        let expected = 10.0_f64.powf(11.0 / 20.0);
        assert!(
            (ratio - expected).abs() / expected < 0.01,
            "gain at 55Hz was {} (expected {})",
            ratio,
            expected
        );
    }

    #[test]
    fn test_high_pass_rejects_dc() {
        let spec = FilterSpec::new(FilterKind::HighPass, 40.0, FS, 0.0, 0.85);
        let mut filter = BiquadFilter::new(spec, 1);
        let step = FIXED_ONE;

        let mut first = [step];
        filter.process(&mut first);
        assert!(first[0] > step / 2, "step edge should pass: {}", first[0]);

        // Ten time constants of the corner frequency
        let settle = (10.0 * FS / 40.0) as usize;
        let mut last = 0;
        for _ in 0..settle {
            let mut frame = [step];
            filter.process(&mut frame);
            last = frame[0];
        }
        assert!(last.abs() < step / 100, "DC not rejected: {}", last);
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let kind = FilterKind::from(42);
        assert_eq!(kind, FilterKind::Identity);

        let mut filter = BiquadFilter::new(FilterSpec::new(kind, 1000.0, FS, 12.0, 2.0), 2);
        for n in 0..2000 {
            let input = [sine(n, 997.0, 8.0e8), sine(n, 31.0, -3.0e8)];
            let mut frame = input;
            filter.process(&mut frame);
            for (out, inp) in frame.iter().zip(input.iter()) {
                assert!((out - inp).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_zero_db_peaking_passes_through() {
        let spec = FilterSpec::new(FilterKind::Peaking, 55.0, FS, 0.0, 1.0);
        let mut filter = BiquadFilter::new(spec, 1).with_error_feedback(true);
        for n in 0..5000 {
            let input = sine(n, 1234.0, 5.0e8);
            let mut frame = [input];
            filter.process(&mut frame);
            assert!((frame[0] - input).abs() <= 1, "sample {}: {} vs {}", n, frame[0], input);
        }
    }

    #[test]
    fn test_error_feedback_silence_stays_silent() {
        let spec = FilterSpec::new(FilterKind::HighShelf, 8000.0, FS, 3.0, 0.71);
        let mut filter = BiquadFilter::new(spec, 2).with_error_feedback(true);
        assert!(filter.error_feedback());
        for _ in 0..10_000 {
            let mut frame = [0, 0];
            filter.process(&mut frame);
            assert_eq!(frame, [0, 0]);
        }
    }

    #[test]
    fn test_tracks_floating_point_reference() {
        let spec = FilterSpec::new(FilterKind::Peaking, 1000.0, FS, 6.0, 1.0);
        let mut filter = BiquadFilter::new(spec, 1);
        let mut reference = DirectForm1::<f64>::new(filter.active_coefficients().to_biquad());

        let amplitude = FIXED_ONE as f64;
        for n in 0..4800 {
            let x = sine(n, 700.0, amplitude);
            let mut frame = [x];
            filter.process(&mut frame);
            let expected = reference.run(x as f64);
            assert!(
                (frame[0] as f64 - expected).abs() < amplitude * 1e-4,
                "sample {}: fixed {} vs float {}",
                n,
                frame[0],
                expected
            );
        }
    }

    #[test]
    fn test_channels_are_independent() {
        let spec = FilterSpec::new(FilterKind::LowPass, 2000.0, FS, 0.0, 0.7071);
        let mut stereo = BiquadFilter::new(spec, 2);
        let mut left = BiquadFilter::new(spec, 1);
        let mut right = BiquadFilter::new(spec, 1);

        for n in 0..1000 {
            let (l, r) = (sine(n, 300.0, 1.0e8), sine(n, 5000.0, -2.0e8));
            let mut frame = [l, r];
            stereo.process(&mut frame);
            let mut lf = [l];
            let mut rf = [r];
            left.process(&mut lf);
            right.process(&mut rf);
            assert_eq!(frame, [lf[0], rf[0]]);
        }
    }

    #[test]
    fn test_extra_samples_beyond_channel_count_untouched() {
        let spec = FilterSpec::new(FilterKind::Gain, 1000.0, FS, 6.0, 1.0);
        let mut filter = BiquadFilter::new(spec, 1);
        let mut frame = [1 << 20, 1 << 20];
        filter.process(&mut frame);
        assert_ne!(frame[0], 1 << 20);
        assert_eq!(frame[1], 1 << 20);
    }

    #[test]
    fn test_reset_states() {
        let mut filter = BiquadFilter::new(FilterSpec::new(FilterKind::LowPass, 500.0, FS, 0.0, 0.7), 2);
        for n in 0..100 {
            filter.process(&mut [sine(n, 100.0, 1.0e8), 5]);
        }
        let coefficients = filter.active_coefficients();
        filter.reset_states();
        assert!(filter.states.iter().all(|s| *s == FilterState::default()));
        assert_eq!(filter.active_coefficients(), coefficients);
    }

    #[test]
    fn test_set_float_coefficients() {
        let mut filter = BiquadFilter::default();
        filter.set_float_coefficients([0.5, 0.0, 0.0, 0.0, 0.0]);

        let mut frame = [1000, -1000];
        filter.process(&mut frame);
        assert_eq!(frame, [500, -500]);
        assert_eq!(filter.active_coefficients().to_f64(), [0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_to_biquad_sign_convention() {
        let spec = FilterSpec::new(FilterKind::LowPass, 1000.0, FS, 0.0, 0.7071);
        let fixed = FixedCoefficients::design(&spec);
        let float = fixed.to_biquad();
        assert!((float.a1 + from_q8_24(fixed.a1)).abs() < 1e-15);
        assert!((float.a2 + from_q8_24(fixed.a2)).abs() < 1e-15);
        assert!(float.a1 < 0.0, "low-pass a1 is negative in the biquad convention");
    }

    #[test]
    fn test_controller_updates_apply_at_boundary() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let mut controller = filter.controller(4);

        controller.set_gain_db(6.0, true).unwrap();
        assert!(filter.pending_coefficients().is_none());
        assert_eq!(filter.spec().gain_db, 0.0);

        filter.process(&mut [0, 0]);
        let expected = FixedCoefficients::design(controller.spec());
        assert_eq!(filter.active_coefficients(), expected);
        assert_eq!(filter.spec().gain_db, 6.0);
    }

    #[test]
    fn test_controller_deferred_changes_are_not_sent() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let before = filter.active_coefficients();
        let mut controller = filter.controller(1);

        controller.set_q(3.0, false).unwrap();
        controller.set_frequency(250.0, false).unwrap();
        filter.process(&mut [0, 0]);
        assert_eq!(filter.active_coefficients(), before);

        controller.redesign().unwrap();
        filter.process(&mut [0, 0]);
        assert_eq!(filter.spec().q, 3.0);
        assert_eq!(filter.spec().frequency, 250.0);
    }

    #[test]
    fn test_newest_remote_update_wins() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let mut controller = filter.controller(8);

        for gain in [1.0, 2.0, 3.0] {
            controller.set_gain_db(gain, true).unwrap();
        }
        filter.process(&mut [0, 0]);
        assert_eq!(filter.spec().gain_db, 3.0);
        assert_eq!(filter.active_coefficients(), FixedCoefficients::design(controller.spec()));
    }

    #[test]
    fn test_controller_queue_full() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let mut controller = filter.controller(1);

        controller.set_gain_db(1.0, true).unwrap();
        let err = controller.set_gain_db(2.0, true).unwrap_err();
        assert!(matches!(err, DspError::UpdateQueueFull));

        // Draining makes room again
        filter.process(&mut [0, 0]);
        controller.set_gain_db(2.0, true).unwrap();
    }

    #[test]
    fn test_controller_detects_dropped_filter() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let mut controller = filter.controller(2);
        drop(filter);
        assert!(matches!(controller.redesign(), Err(DspError::FilterDropped)));
    }

    #[test]
    fn test_new_controller_disconnects_previous() {
        let mut filter = BiquadFilter::new(FilterSpec::default(), 2);
        let mut first = filter.controller(2);
        let _second = filter.controller(2);
        assert!(matches!(first.set_gain_db(3.0, true), Err(DspError::FilterDropped)));
    }

    #[test]
    fn test_filter_kind_codes_and_names() {
        assert_eq!(FilterKind::from(0), FilterKind::Gain);
        assert_eq!(FilterKind::from(5), FilterKind::Peaking);
        assert_eq!(FilterKind::from(10), FilterKind::AllPass);
        assert_eq!(FilterKind::from(11), FilterKind::Identity);

        for kind in FilterKind::ALL {
            assert_eq!(FilterKind::from_name(kind.name()), kind);
        }
        assert_eq!(FilterKind::from_name("tilt"), FilterKind::Identity);
    }

    #[test]
    fn test_spec_serialization() {
        let spec = FilterSpec::new(FilterKind::HighShelf, 8000.0, FS, 3.0, 0.71);
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"high_shelf\""));
        let back: FilterSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);

        let unknown: FilterSpec = serde_json::from_str(
            r#"{"kind":"tilt","frequency":100.0,"sample_rate":48000.0,"gain_db":0.0,"q":1.0}"#,
        )
        .unwrap();
        assert_eq!(unknown.kind, FilterKind::Identity);
    }
}
