//! # Onset Detection Module
//!
//! A loudness-driven articulation state machine. Two thresholds split the
//! dynamic range (one marks a note starting, a lower one marks true
//! silence) and two duration guards debounce the transitions so a single
//! noisy quantum can never flip the state back and forth.

use std::time::{Duration, Instant};

/// Where the voice sits in its envelope, as reported on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Articulation {
    /// No voice present.
    Silence,
    /// A note has just started and is still inside the attack window.
    Attack,
    /// The note has settled.
    Sustain,
    /// Loudness has fallen off but silence has not been confirmed yet.
    Release,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Silence,
    Attack { since: Instant },
    Sustain,
    Release { quiet_since: Option<Instant> },
}

/// Attack/sustain/release tracking over per-quantum loudness readings.
pub struct OnsetDetector {
    energy_threshold_db: f32,
    silence_threshold_db: f32,
    attack_duration: Duration,
    min_silence: Duration,
    state: State,
}

impl OnsetDetector {
    pub fn new(
        energy_threshold_db: f32,
        silence_threshold_db: f32,
        attack_duration: Duration,
        min_silence: Duration,
    ) -> Self {
        Self {
            energy_threshold_db,
            silence_threshold_db,
            attack_duration,
            min_silence,
            state: State::Silence,
        }
    }

    /// Current articulation without feeding a new reading.
    pub fn articulation(&self) -> Articulation {
        match self.state {
            State::Silence => Articulation::Silence,
            State::Attack { .. } => Articulation::Attack,
            State::Sustain => Articulation::Sustain,
            State::Release { .. } => Articulation::Release,
        }
    }

    /// Feeds one loudness reading and returns the resulting articulation.
    ///
    /// `now` is the capture timestamp of the quantum the reading came
    /// from; the duration guards compare real timestamps, not call
    /// counts, so the machine behaves the same at any quantum size.
    pub fn update(&mut self, loudness_db: f32, now: Instant) -> Articulation {
        let loud = loudness_db > self.energy_threshold_db;
        let quiet = loudness_db < self.silence_threshold_db;

        self.state = match self.state {
            State::Silence => {
                if loud {
                    State::Attack { since: now }
                } else {
                    State::Silence
                }
            }
            State::Attack { since } => {
                if !loud {
                    // The attack never completed; fall into release and
                    // let the silence guard decide from there.
                    State::Release {
                        quiet_since: if quiet { Some(now) } else { None },
                    }
                } else if now.duration_since(since) >= self.attack_duration {
                    State::Sustain
                } else {
                    State::Attack { since }
                }
            }
            State::Sustain => {
                if loud {
                    State::Sustain
                } else {
                    State::Release {
                        quiet_since: if quiet { Some(now) } else { None },
                    }
                }
            }
            State::Release { quiet_since } => {
                if loud {
                    // Re-attack before silence was reached.
                    State::Attack { since: now }
                } else if quiet {
                    let since = quiet_since.unwrap_or(now);
                    if now.duration_since(since) >= self.min_silence {
                        State::Silence
                    } else {
                        State::Release {
                            quiet_since: Some(since),
                        }
                    }
                } else {
                    // Between the two thresholds: still releasing, and
                    // the silence clock starts over.
                    State::Release { quiet_since: None }
                }
            }
        };

        self.articulation()
    }

    /// Returns the machine to silence, dropping any pending timers.
    pub fn reset(&mut self) {
        self.state = State::Silence;
    }
}
