//! # Error Types
//!
//! The error taxonomy for the capture/analysis pipeline. Device-level
//! failures surface from `start` and leave the engine stopped; per-quantum
//! hiccups stay local and only cost a dropped frame.

use thiserror::Error;

/// Errors produced by the engine and its processing stages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The platform refused microphone access. The engine stays stopped;
    /// the user has to grant input permission and start again.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable input device, or the device vanished while opening the
    /// stream. Distinct from a permission problem so the host can show an
    /// actionable message.
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(String),

    /// A configuration value failed validation. Reported before any
    /// processing starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The analysis window does not yet hold enough samples for the
    /// requested lag range. Local and recoverable: the current frame is
    /// skipped and processing continues on the next quantum.
    #[error("insufficient samples for pitch analysis: got {got}, need {need}")]
    InsufficientSamples { got: usize, need: usize },
}

impl EngineError {
    /// Whether the error is fatal for the stream (as opposed to a
    /// per-quantum condition the pipeline absorbs).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EngineError::InsufficientSamples { .. })
    }
}
