//! Frame Transport
//!
//! Moves interleaved frames from a capture ring, through a processor, into a
//! playback ring. The host side owns the other ends of both rings: it pushes
//! captured samples into the input [`Producer`] and drains processed samples
//! from the output [`Consumer`].
//!
//! ```text
//!   Capture ──rtrb──▶ FrameTransport::pump(processor) ──rtrb──▶ Playback
//! ```
//!
//! Frames leave in the order they arrived; a frame is only taken from the
//! input once there is room for it in the output.

use rtrb::{Consumer, Producer, RingBuffer};
use tonestage_dsp::{clamp_channels, FrameProcessor, MAX_CHANNELS};
use tracing::debug;

use crate::config::MAX_TRANSPORT_FRAMES;
use crate::error::{EngineError, EngineResult};

/// Pumps whole frames between two lock-free rings
pub struct FrameTransport {
    input: Consumer<i32>,
    output: Producer<i32>,
    channels: usize,
    scratch: [i32; MAX_CHANNELS],
    frames_processed: u64,
}

impl FrameTransport {
    /// Create a transport with room for `frames` frames in each direction
    ///
    /// `frames` is clamped to `1..=MAX_TRANSPORT_FRAMES`.
    ///
    /// Returns the transport together with the host-side ends: the input
    /// producer (capture) and the output consumer (playback).
    pub fn new(channels: usize, frames: usize) -> (Self, Producer<i32>, Consumer<i32>) {
        let channels = clamp_channels(channels);
        let frames = frames.clamp(1, MAX_TRANSPORT_FRAMES);
        let capacity = frames * channels;

        let (input_producer, input_consumer) = RingBuffer::new(capacity);
        let (output_producer, output_consumer) = RingBuffer::new(capacity);

        debug!(
            "Frame transport: {} channels, {} frames per direction",
            channels, frames
        );

        let transport = Self {
            input: input_consumer,
            output: output_producer,
            channels,
            scratch: [0; MAX_CHANNELS],
            frames_processed: 0,
        };
        (transport, input_producer, output_consumer)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total frames moved since creation
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Whole frames waiting in the input ring
    pub fn pending_frames(&self) -> usize {
        self.input.slots() / self.channels
    }

    /// Process every whole frame that is both available and fits the output
    ///
    /// Returns the number of frames moved. Fails with
    /// [`EngineError::BufferOverflow`] when input is waiting but the output
    /// ring is full, and with [`EngineError::ChannelMismatch`] when the
    /// processor's frame width differs from the transport's.
    ///
    /// # Real-time Safety
    /// No allocations and no locks; safe to call from the audio thread.
    pub fn pump<P: FrameProcessor + ?Sized>(&mut self, processor: &mut P) -> EngineResult<usize> {
        let channels = self.channels;
        if processor.channels() != channels {
            return Err(EngineError::ChannelMismatch {
                expected: channels,
                got: processor.channels(),
            });
        }

        let available = self.input.slots() / channels;
        let room = self.output.slots() / channels;
        let frames = available.min(room);
        if frames == 0 {
            return if available > 0 {
                Err(EngineError::BufferOverflow)
            } else {
                Ok(0)
            };
        }

        let samples = frames * channels;
        let read = self
            .input
            .read_chunk(samples)
            .map_err(|_| EngineError::BufferUnderflow)?;
        let mut write = self
            .output
            .write_chunk(samples)
            .map_err(|_| EngineError::BufferOverflow)?;

        {
            let (first, second) = read.as_slices();
            let mut source = first.iter().chain(second.iter()).copied();
            let (out_first, out_second) = write.as_mut_slices();
            let mut sink = out_first.iter_mut().chain(out_second.iter_mut());

            let frame = &mut self.scratch[..channels];
            for _ in 0..frames {
                for (slot, value) in frame.iter_mut().zip(source.by_ref()) {
                    *slot = value;
                }
                processor.process_frame(frame);
                for (value, slot) in frame.iter().zip(sink.by_ref()) {
                    *slot = *value;
                }
            }
        }

        write.commit_all();
        read.commit_all();
        self.frames_processed += frames as u64;
        Ok(frames)
    }
}
