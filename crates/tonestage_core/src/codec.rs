//! Hardware Codec Boundary
//!
//! The converter that feeds and drains the pipeline is configured once at
//! startup over its control bus. The pipeline itself never talks to the
//! codec; platforms supply a [`CodecSetup`] implementation and the engine
//! calls it before any audio flows.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Default control-bus address of the codec
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x48;

/// Default master clock (512 × 48 kHz)
pub const DEFAULT_MASTER_CLOCK_HZ: u32 = 24_576_000;

/// Which side drives the serial audio clocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecMode {
    /// The codec generates bit and word clocks
    Master,
    /// The host generates bit and word clocks
    #[default]
    Slave,
}

/// Codec startup parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// 7-bit control-bus address
    pub device_address: u8,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Master clock frequency in Hz; must be a whole multiple of the sample rate
    pub master_clock_hz: u32,

    pub mode: CodecMode,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_DEVICE_ADDRESS,
            sample_rate: 48000,
            master_clock_hz: DEFAULT_MASTER_CLOCK_HZ,
            mode: CodecMode::Slave,
        }
    }
}

impl CodecConfig {
    /// Master clock to sample rate ratio, if the clocks divide evenly
    pub fn clock_ratio(&self) -> Option<u32> {
        if self.sample_rate == 0 || self.master_clock_hz % self.sample_rate != 0 {
            None
        } else {
            Some(self.master_clock_hz / self.sample_rate)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.device_address > 0x7F {
            return Err(EngineError::ConfigError(format!(
                "Invalid codec address: {:#04x}",
                self.device_address
            )));
        }
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(EngineError::ConfigError(format!(
                "Invalid codec sample rate: {}",
                self.sample_rate
            )));
        }
        if self.clock_ratio().is_none() {
            return Err(EngineError::ConfigError(format!(
                "Master clock {}Hz is not a multiple of sample rate {}Hz",
                self.master_clock_hz, self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Platform hook for bringing up the audio codec
///
/// Called exactly once, before the first frame is processed.
pub trait CodecSetup {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Program the codec for the given clocks and mode
    fn configure(&mut self, config: &CodecConfig) -> EngineResult<()>;
}

/// Codec stand-in for offline processing: accepts any valid configuration
#[derive(Debug, Default)]
pub struct NullCodec {
    configured: Option<CodecConfig>,
}

impl NullCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration applied by the last `configure` call
    pub fn configured(&self) -> Option<&CodecConfig> {
        self.configured.as_ref()
    }
}

impl CodecSetup for NullCodec {
    fn name(&self) -> &'static str {
        "null"
    }

    fn configure(&mut self, config: &CodecConfig) -> EngineResult<()> {
        config.validate()?;
        info!(
            "Null codec: address {:#04x}, {}Hz, MCLK {}Hz, {:?} mode",
            config.device_address, config.sample_rate, config.master_clock_hz, config.mode
        );
        self.configured = Some(*config);
        Ok(())
    }
}
