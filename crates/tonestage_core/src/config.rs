//! Pipeline and Engine Configuration

use serde::{Deserialize, Serialize};
use tonestage_dsp::{reference_specs, FilterSpec, LimiterConfig, MAX_CHANNELS};

use crate::codec::CodecConfig;
use crate::error::{EngineError, EngineResult};

/// Ceiling of the shipped limiter (dBFS)
pub const REFERENCE_THRESHOLD_DB: f64 = -30.2;

/// Attack (and lookahead) of the shipped limiter (seconds)
pub const REFERENCE_ATTACK_SECONDS: f64 = 0.001;

/// Hold time of the shipped limiter (seconds)
pub const REFERENCE_HOLD_SECONDS: f64 = 0.1;

/// Release time of the shipped limiter (seconds)
pub const REFERENCE_RELEASE_SECONDS: f64 = 1.0;

/// Longest accepted limiter attack (lookahead) time (seconds)
pub const MAX_ATTACK_SECONDS: f64 = 0.5;

/// Longest accepted limiter hold or release time (seconds)
pub const MAX_ENVELOPE_SECONDS: f64 = 10.0;

/// Largest accepted transport ring, in frames per direction
pub const MAX_TRANSPORT_FRAMES: usize = 1 << 20;

/// Limiter settings the pipeline ships with
///
/// The ceiling sits below full scale to leave room for the make-up shift
/// applied after the limiter.
pub fn reference_limiter(channels: usize, sample_rate: f64) -> LimiterConfig {
    LimiterConfig::new(
        REFERENCE_THRESHOLD_DB,
        REFERENCE_ATTACK_SECONDS,
        REFERENCE_HOLD_SECONDS,
        REFERENCE_RELEASE_SECONDS,
        channels,
        sample_rate,
    )
}

/// Signal chain configuration: filter sections followed by the limiter
///
/// `sample_rate` and `channels` are authoritative; they override the values
/// carried by individual filter specs and the limiter settings when the
/// pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Number of interleaved channels
    pub channels: usize,

    /// Feed quantization error back into every filter section
    pub error_feedback: bool,

    /// Filter sections in processing order
    pub filters: Vec<FilterSpec>,

    pub limiter: LimiterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let sample_rate = 48000.0;
        let channels = 2;
        Self {
            sample_rate,
            channels,
            error_feedback: false,
            filters: reference_specs(sample_rate).to_vec(),
            limiter: reference_limiter(channels, sample_rate),
        }
    }
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if !(8000.0..=192000.0).contains(&self.sample_rate) {
            return Err(EngineError::ConfigError(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EngineError::ConfigError(format!(
                "Invalid channel count: {}",
                self.channels
            )));
        }

        let nyquist = self.sample_rate / 2.0;
        for (index, spec) in self.filters.iter().enumerate() {
            if !(0.0..=nyquist).contains(&spec.frequency) {
                return Err(EngineError::ConfigError(format!(
                    "Filter {}: frequency {}Hz outside 0..={}Hz",
                    index, spec.frequency, nyquist
                )));
            }
            if !spec.gain_db.is_finite() || !spec.q.is_finite() || spec.q < 0.0 {
                return Err(EngineError::ConfigError(format!(
                    "Filter {}: invalid gain {}dB or Q {}",
                    index, spec.gain_db, spec.q
                )));
            }
        }

        let limiter = &self.limiter;
        if limiter.threshold_db.is_nan() {
            return Err(EngineError::ConfigError("Limiter threshold is NaN".into()));
        }
        for (name, seconds, max) in [
            ("attack", limiter.attack_seconds, MAX_ATTACK_SECONDS),
            ("hold", limiter.hold_seconds, MAX_ENVELOPE_SECONDS),
            ("release", limiter.release_seconds, MAX_ENVELOPE_SECONDS),
        ] {
            if !(0.0..=max).contains(&seconds) {
                return Err(EngineError::ConfigError(format!(
                    "Invalid limiter {} time: {}",
                    name, seconds
                )));
            }
        }
        Ok(())
    }

    /// Filter specs with the pipeline sample rate applied
    pub fn filter_specs(&self) -> Vec<FilterSpec> {
        self.filters
            .iter()
            .map(|spec| {
                let mut spec = *spec;
                spec.set_sample_rate(self.sample_rate);
                spec
            })
            .collect()
    }

    /// Limiter settings with the pipeline sample rate and channel count applied
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            channels: self.channels,
            sample_rate: self.sample_rate,
            ..self.limiter
        }
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,

    pub codec: CodecConfig,

    /// Ring buffer capacity in frames, per direction
    pub transport_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            codec: CodecConfig::default(),
            transport_frames: 512 * 4,
        }
    }
}

impl EngineConfig {
    /// Validate every section and their agreement
    pub fn validate(&self) -> EngineResult<()> {
        self.pipeline.validate()?;
        self.codec.validate()?;

        if self.codec.sample_rate as f64 != self.pipeline.sample_rate {
            return Err(EngineError::ConfigError(format!(
                "Codec runs at {}Hz but pipeline expects {}Hz",
                self.codec.sample_rate, self.pipeline.sample_rate
            )));
        }
        if self.transport_frames == 0 || self.transport_frames > MAX_TRANSPORT_FRAMES {
            return Err(EngineError::ConfigError(format!(
                "Invalid transport size: {} frames",
                self.transport_frames
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
