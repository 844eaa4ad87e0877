// voce-core/src/lib.rs

//! The core logic for the voice-to-synth control pipeline.
//! This crate turns a live monophonic input (sung or hummed voice) into a
//! continuous stream of musical control frames: pitch, loudness, timbre
//! and articulation. It is completely headless and contains no GUI code;
//! a host application consumes the frames over a channel and maps them
//! onto synthesizer parameters.

pub mod config;
pub mod correction;
pub mod engine;
pub mod error;
pub mod features;
pub mod fft;
pub mod latency;
pub mod onset;
pub mod pitch;
pub mod smoothing;
pub mod tuning;

use std::time::Instant;

pub use config::{EngineConfig, OnsetConfig, SmoothingConfig};
pub use correction::{PitchCorrector, ScaleDefinition, ScaleType};
pub use engine::{CaptureEngine, CaptureMode};
pub use error::EngineError;
pub use latency::LatencyStats;
pub use onset::Articulation;
pub use pitch::PitchEstimate;

/// A fixed-length run of mono samples handed from the capture callback to
/// the analysis worker. Consumed read-only by every downstream stage.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono samples in the range [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate the device actually delivered, in Hz.
    pub sample_rate: u32,
    /// Monotonic timestamp taken when the device callback produced the
    /// first sample of this chunk.
    pub captured_at: Instant,
}

/// One frame of musical control data, produced once per audio quantum
/// (or per processed buffer in fallback mode). Immutable once built.
#[derive(Debug, Clone)]
pub struct ControlFrame {
    /// Corrected fundamental frequency in Hz, or `None` while unvoiced.
    pub frequency: Option<f32>,
    /// Pitch clarity in [0, 1]. Zero for silence and unvoiced input.
    pub confidence: f32,
    /// Name of the nearest note ("A4"-style), when a pitch is present.
    pub note_name: Option<String>,
    /// Octave of the nearest note, when a pitch is present.
    pub octave: Option<i32>,
    /// Smoothed loudness in dBFS.
    pub volume_db: f32,
    /// Normalized spectral brightness in [0, 1].
    pub brightness: f32,
    /// Normalized breath-noise content in [0, 1].
    pub breathiness: f32,
    /// Where the voice currently sits in its attack/sustain/release arc.
    pub articulation: Articulation,
    /// Capture timestamp of the quantum this frame was computed from.
    pub captured_at: Instant,
    /// Monotonically increasing index of delivered frames.
    pub sequence: u64,
}
