//! # Pitch Correction Module
//!
//! Scale-based pitch quantization ("auto-tune") with hysteresis and a
//! time-constant glide. The corrector locks onto the nearest in-scale
//! note, refuses to re-lock for input hovering inside a 0.6-semitone
//! band around the lock, and slides its output toward the locked target
//! at a rate set by a single speed parameter.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::tuning;

/// Semitones of deviation from the locked note required before the lock
/// moves. Keeps vibrato and scoops from flickering the target.
const HYSTERESIS_SEMITONES: f32 = 0.6;

/// Glide time constant at full speed, in seconds.
const MAX_TAU_SECONDS: f32 = 0.2;

/// Interval sets available for correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    Chromatic,
    Major,
    NaturalMinor,
    HarmonicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
}

impl ScaleType {
    /// Semitone offsets from the root, within one octave.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleType::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            ScaleType::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleType::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleType::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleType::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleType::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleType::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }
}

/// A root pitch class plus the interval set built from it.
///
/// The interval set is never empty: every [`ScaleType`] carries at least
/// the root, and membership is evaluated modulo 12.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleDefinition {
    root: u8,
    intervals: &'static [u8],
}

impl ScaleDefinition {
    /// Builds a scale from a root pitch class (0 = C .. 11 = B) and type.
    pub fn new(root: u8, scale_type: ScaleType) -> Self {
        Self {
            root: root % 12,
            intervals: scale_type.intervals(),
        }
    }

    /// Whether the given note number's pitch class is in the scale.
    pub fn contains(&self, note: i32) -> bool {
        let pc = (note - self.root as i32).rem_euclid(12) as u8;
        self.intervals.contains(&pc)
    }

    /// Nearest in-scale semitone to a continuous note number.
    ///
    /// Candidates are ranked by circular (mod-12) distance from the
    /// chromatic nearest integer, with ties broken by smaller absolute
    /// distance from the input and then by the lower note number.
    pub fn nearest_note(&self, note: f32) -> i32 {
        let chromatic = note.round() as i32;
        let mut best: Option<(i32, f32, i32)> = None;

        // Any pitch class is within six semitones circularly, so this
        // range always holds at least one in-scale candidate.
        for candidate in (chromatic - 6)..=(chromatic + 6) {
            if !self.contains(candidate) {
                continue;
            }
            let circular = (candidate - chromatic).abs();
            let absolute = (note - candidate as f32).abs();
            let better = match best {
                None => true,
                Some((best_circ, best_abs, best_note)) => {
                    (circular, absolute, candidate) < (best_circ, best_abs, best_note)
                }
            };
            if better {
                best = Some((circular, absolute, candidate));
            }
        }

        // The scan window is never empty (see above).
        best.map(|(_, _, n)| n).unwrap_or(chromatic)
    }
}

/// Stateful scale quantizer with hysteresis and glide.
pub struct PitchCorrector {
    scale: ScaleDefinition,
    enabled: bool,
    speed: f32,
    min_frequency: f32,
    max_frequency: f32,

    // Correction state, reset on explicit silence.
    output_note: Option<f32>,
    locked_note: Option<i32>,
    last_update: Option<Instant>,
}

impl PitchCorrector {
    pub fn new(
        scale: ScaleDefinition,
        enabled: bool,
        speed: f32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Self {
        Self {
            scale,
            enabled,
            speed: speed.clamp(0.0, 1.0),
            min_frequency,
            max_frequency,
            output_note: None,
            locked_note: None,
            last_update: None,
        }
    }

    /// Swaps the correction scale. The current lock is re-evaluated on
    /// the next voiced input; the glide state is kept so the output does
    /// not jump at the swap.
    pub fn set_scale(&mut self, scale: ScaleDefinition) {
        if scale != self.scale {
            self.scale = scale;
            self.locked_note = None;
        }
    }

    /// Enables or disables quantization and sets the retune speed.
    pub fn set_auto_tune(&mut self, enabled: bool, speed: f32) {
        self.enabled = enabled;
        self.speed = speed.clamp(0.0, 1.0);
    }

    /// The note the corrector is currently locked on, if any.
    pub fn locked_note(&self) -> Option<i32> {
        self.locked_note
    }

    /// Corrects one smoothed pitch reading.
    ///
    /// Unvoiced input (`None`) changes nothing and yields `None`. Input
    /// with zero confidence never moves the lock, but an existing glide
    /// still progresses. Disabled correction passes the input through,
    /// clamped to the detectable range.
    pub fn correct(
        &mut self,
        frequency: Option<f32>,
        confidence: f32,
        min_confidence: f32,
        now: Instant,
    ) -> Option<f32> {
        let input = frequency?;

        if !self.enabled {
            return Some(input.clamp(self.min_frequency, self.max_frequency));
        }

        let note = tuning::note_from_frequency(input);

        if confidence > 0.0 && confidence >= min_confidence {
            let deviates = match self.locked_note {
                None => true,
                Some(locked) => (note - locked as f32).abs() > HYSTERESIS_SEMITONES,
            };
            if deviates {
                self.locked_note = Some(self.scale.nearest_note(note));
            }
        }

        let Some(target) = self.locked_note else {
            // Nothing to quantize toward yet; pass the voice through.
            return Some(input.clamp(self.min_frequency, self.max_frequency));
        };
        let target = target as f32;

        // Exponential convergence using the real elapsed time, so the
        // glide rate is identical across quantum sizes.
        let current = self.output_note.unwrap_or(note);
        let tau = MAX_TAU_SECONDS * self.speed * self.speed;
        let alpha = if tau <= f32::EPSILON {
            1.0
        } else {
            match self.last_update {
                // First voiced frame: the glide starts at the sung pitch.
                None => 0.0,
                Some(previous) => {
                    let dt = now.duration_since(previous).as_secs_f32();
                    1.0 - (-dt / tau).exp()
                }
            }
        };
        let next = current + (target - current) * alpha;

        self.output_note = Some(next);
        self.last_update = Some(now);

        Some(tuning::frequency_from_note(next).clamp(self.min_frequency, self.max_frequency))
    }

    /// Clears the correction state. Called on explicit silence so the
    /// next onset starts from the sung pitch, not a stale lock.
    pub fn reset(&mut self) {
        self.output_note = None;
        self.locked_note = None;
        self.last_update = None;
    }
}
