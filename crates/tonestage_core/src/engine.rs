//! Audio Engine - Main Entry Point
//!
//! Brings the system up in a fixed order and then runs the signal path:
//!
//! ```text
//!   1. Validate configuration
//!   2. Configure the codec (exactly once)
//!   3. Build the pipeline (all allocation happens here)
//!   4. Create the capture/playback rings
//!   5. run_cycle() from the audio context, once per transport period
//! ```
//!
//! The engine owns the pipeline. Control threads reach into it through the
//! handles it hands out (filter controllers, limiter threshold handle)
//! rather than through shared references.

use rtrb::{Consumer, Producer};
use tonestage_dsp::{FilterController, ThresholdHandle};
use tracing::{error, info};

use crate::codec::CodecSetup;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::pipeline::Pipeline;
use crate::transport::FrameTransport;

/// Host-side ends of the engine's sample rings
pub struct HostPorts {
    /// Push captured interleaved samples here
    pub capture: Producer<i32>,
    /// Pop processed interleaved samples from here
    pub playback: Consumer<i32>,
}

/// Running signal path: pipeline plus frame transport
pub struct AudioEngine {
    config: EngineConfig,
    pipeline: Pipeline,
    transport: FrameTransport,
}

impl AudioEngine {
    /// Validate `config`, configure the codec and build the signal path
    pub fn start<C: CodecSetup + ?Sized>(
        config: EngineConfig,
        codec: &mut C,
    ) -> EngineResult<(Self, HostPorts)> {
        config.validate()?;

        info!("Configuring codec '{}'", codec.name());
        if let Err(e) = codec.configure(&config.codec) {
            error!("Codec setup failed: {}", e);
            return Err(e);
        }

        let pipeline = Pipeline::from_config(&config.pipeline)?;
        let (transport, capture, playback) =
            FrameTransport::new(pipeline.channels(), config.transport_frames);

        info!(
            "Audio engine started: {} channels at {}Hz, {} filters, {} frames latency",
            pipeline.channels(),
            config.pipeline.sample_rate,
            pipeline.cascade().len(),
            pipeline.latency_frames()
        );

        let engine = Self {
            config,
            pipeline,
            transport,
        };
        Ok((engine, HostPorts { capture, playback }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Total frames processed since start
    pub fn frames_processed(&self) -> u64 {
        self.transport.frames_processed()
    }

    /// Handle for changing the limiter ceiling from a control thread
    pub fn threshold_handle(&self) -> ThresholdHandle {
        self.pipeline.limiter().threshold_handle()
    }

    /// Controller for redesigning filter `index` from a control thread
    pub fn filter_controller(
        &mut self,
        index: usize,
        capacity: usize,
    ) -> EngineResult<FilterController> {
        let filter = self.pipeline.cascade_mut().filter_mut(index)?;
        Ok(filter.controller(capacity))
    }

    /// Process every frame that is waiting and fits the playback ring
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no logging.
    pub fn run_cycle(&mut self) -> EngineResult<usize> {
        self.transport.pump(&mut self.pipeline)
    }

    /// Clear all processing state, keeping configuration and handles
    pub fn reset(&mut self) {
        self.pipeline.reset();
    }
}
