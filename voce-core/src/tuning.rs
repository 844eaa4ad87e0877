//! # Musical Tuning Module
//!
//! Conversions between frequency, continuous note numbers and note names
//! for equal temperament with A4 = 440 Hz. The pitch corrector works in
//! note-number space (semitones on a log2 frequency axis), so these
//! conversions sit on the hot path of every voiced quantum.
//!
//! ## Features
//! - Frequency to fractional note number and back (MIDI numbering, A4 = 69)
//! - Note name and octave lookup via a precomputed table
//! - Cent deviation calculations

use once_cell::sync::Lazy;

/// Reference pitch for A4 in Hz.
pub const A4_HZ: f32 = 440.0;
/// Note number of A4 in the MIDI convention.
pub const A4_NOTE: f32 = 69.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Precomputed names for every note number the pipeline can emit.
///
/// Built once on first use so voiced frames can label themselves without
/// formatting on the audio thread.
static NAME_TABLE: Lazy<Vec<String>> = Lazy::new(|| {
    (0..128)
        .map(|n| {
            let name = NOTE_NAMES[(n % 12) as usize];
            let octave = (n / 12) as i32 - 1;
            format!("{}{}", name, octave)
        })
        .collect()
});

/// Converts a frequency in Hz to a continuous note number.
///
/// The fractional part carries the deviation from the nearest semitone;
/// `note_from_frequency(440.0)` is exactly 69.0.
pub fn note_from_frequency(freq: f32) -> f32 {
    A4_NOTE + 12.0 * (freq / A4_HZ).log2()
}

/// Converts a continuous note number back to a frequency in Hz.
pub fn frequency_from_note(note: f32) -> f32 {
    A4_HZ * 2.0_f32.powf((note - A4_NOTE) / 12.0)
}

/// Deviation of `freq` from `target_freq` in cents.
///
/// Positive values are sharp, negative values flat. 100 cents make one
/// semitone.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Name and octave of the note nearest to the given frequency.
///
/// Returns `None` for frequencies that round outside the note table
/// (non-positive input included).
pub fn name_and_octave(freq: f32) -> Option<(&'static str, i32)> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let nearest = note_from_frequency(freq).round();
    if !(0.0..=127.0).contains(&nearest) {
        return None;
    }
    let n = nearest as usize;
    Some((NOTE_NAMES[n % 12], (n / 12) as i32 - 1))
}

/// Full note label ("A4"-style) of the note nearest to the frequency.
pub fn note_label(freq: f32) -> Option<String> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let nearest = note_from_frequency(freq).round();
    if !(0.0..=127.0).contains(&nearest) {
        return None;
    }
    Some(NAME_TABLE[nearest as usize].clone())
}
