//! DSP Error Types

use thiserror::Error;

/// Errors returned by the control surfaces of the DSP components
///
/// Per-frame processing never fails; these only come from setup and
/// parameter paths.
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Invalid filter index: {0}")]
    InvalidFilterIndex(usize),

    #[error("Coefficient update queue is full")]
    UpdateQueueFull,

    #[error("Filter receiving coefficient updates has been dropped")]
    FilterDropped,
}
