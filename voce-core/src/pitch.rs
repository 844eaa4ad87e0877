//! # Pitch Estimation Module
//!
//! Autocorrelation-based (YIN-family) fundamental frequency estimation
//! for monophonic voice. The estimator owns preallocated lag buffers
//! sized from the configured frequency range, so a call never allocates
//! on the audio path.
//!
//! ## Features
//! - Normalized difference function with cumulative-mean normalization
//! - Absolute-threshold dip search to avoid octave errors
//! - Parabolic interpolation for sub-sample lag precision
//! - RMS gating so silence and breath noise read as unvoiced, not as
//!   a bogus pitch

use crate::error::EngineError;

/// Outcome of one pitch analysis pass.
///
/// An absent frequency is a valid terminal value: it means the window
/// held no discernible pitch, which downstream stages treat as unvoiced
/// rather than as a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, or `None` for silence/unvoiced input.
    pub frequency: Option<f32>,
    /// Clarity of the estimate in [0, 1]. Always 0 when unvoiced.
    pub confidence: f32,
}

impl PitchEstimate {
    /// The silence/unvoiced outcome.
    pub fn silent() -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
        }
    }

    /// Whether the window carried a usable pitch.
    pub fn is_voiced(&self) -> bool {
        self.frequency.is_some()
    }
}

/// YIN-style pitch estimator with a fixed lag range.
pub struct PitchEstimator {
    sample_rate: f32,
    min_lag: usize,
    max_lag: usize,
    min_frequency: f32,
    max_frequency: f32,
    clarity_threshold: f32,
    min_rms: f32,

    // Lag-indexed scratch, allocated once.
    difference: Vec<f32>,
    cmnd: Vec<f32>,
}

impl PitchEstimator {
    /// Builds an estimator for the given rate and detectable range.
    ///
    /// `clarity_threshold` is the normalized-difference value a dip must
    /// fall below to count as periodic; `min_volume_db` gates out windows
    /// whose RMS sits below that level.
    pub fn new(
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
        clarity_threshold: f32,
        min_volume_db: f32,
    ) -> Self {
        let sample_rate = sample_rate as f32;
        // f0 = sr / lag, so the frequency bounds fix the lag bounds.
        let min_lag = ((sample_rate / max_frequency).floor() as usize).max(2);
        let max_lag = ((sample_rate / min_frequency).ceil() as usize).max(min_lag + 1);

        Self {
            sample_rate,
            min_lag,
            max_lag,
            min_frequency,
            max_frequency,
            clarity_threshold,
            min_rms: 10.0_f32.powf(min_volume_db / 20.0),
            difference: vec![0.0; max_lag + 1],
            cmnd: vec![0.0; max_lag + 1],
        }
    }

    /// Samples a window must hold: two periods of the lowest frequency.
    pub fn required_samples(&self) -> usize {
        self.max_lag * 2
    }

    /// Estimates the fundamental of the most recent samples in `window`.
    ///
    /// Returns the silence outcome for quiet or aperiodic input and for
    /// windows containing NaN/Infinity; fails with
    /// [`EngineError::InsufficientSamples`] when the window cannot cover
    /// the configured lag range.
    pub fn estimate(&mut self, window: &[f32]) -> Result<PitchEstimate, EngineError> {
        let need = self.required_samples();
        if window.len() < need {
            return Err(EngineError::InsufficientSamples {
                got: window.len(),
                need,
            });
        }
        // Analyze the newest samples so estimates track the voice, not
        // the tail of the previous note.
        let frame = &window[window.len() - need..];

        if frame.iter().any(|s| !s.is_finite()) {
            return Ok(PitchEstimate::silent());
        }

        let rms =
            (frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / need as f64).sqrt();
        if (rms as f32) < self.min_rms {
            return Ok(PitchEstimate::silent());
        }

        self.compute_difference(frame);
        self.compute_cmnd();

        let Some(lag) = self.find_first_dip() else {
            return Ok(PitchEstimate::silent());
        };

        let refined = self.interpolate_lag(lag);
        let frequency = self.sample_rate / refined;

        // Interpolation can nudge the result slightly past the lag
        // bounds; anything further out is a mis-track, not a voice.
        if !frequency.is_finite()
            || frequency < self.min_frequency * 0.9
            || frequency > self.max_frequency * 1.1
        {
            return Ok(PitchEstimate::silent());
        }

        let confidence = (1.0 - self.cmnd[lag]).clamp(0.0, 1.0);
        Ok(PitchEstimate {
            frequency: Some(frequency),
            confidence,
        })
    }

    /// Difference function d(tau) = sum over j of (x[j] - x[j+tau])^2,
    /// evaluated over a window of `max_lag` samples.
    fn compute_difference(&mut self, frame: &[f32]) {
        let w = self.max_lag;
        self.difference[0] = 0.0;
        for tau in 1..=self.max_lag {
            let mut acc = 0.0f64;
            for j in 0..w {
                let delta = (frame[j] - frame[j + tau]) as f64;
                acc += delta * delta;
            }
            self.difference[tau] = acc as f32;
        }
    }

    /// Cumulative mean normalized difference: d'(tau) = d(tau) * tau / sum(d(1..=tau)).
    fn compute_cmnd(&mut self) {
        self.cmnd[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..=self.max_lag {
            running_sum += self.difference[tau];
            self.cmnd[tau] = if running_sum > f32::EPSILON {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// First local minimum below the clarity threshold, scanning upward
    /// from the shortest lag. Taking the first qualifying dip instead of
    /// the global minimum is what keeps subharmonics (octave errors) out.
    fn find_first_dip(&self) -> Option<usize> {
        let mut tau = self.min_lag;
        while tau <= self.max_lag {
            if self.cmnd[tau] < self.clarity_threshold {
                while tau + 1 <= self.max_lag && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    /// Parabolic fit through the dip and its neighbors for sub-sample
    /// lag precision.
    fn interpolate_lag(&self, lag: usize) -> f32 {
        if lag <= 1 || lag >= self.max_lag {
            return lag as f32;
        }
        let left = self.cmnd[lag - 1];
        let mid = self.cmnd[lag];
        let right = self.cmnd[lag + 1];

        let denom = 2.0 * (2.0 * mid - right - left);
        if denom.abs() < f32::EPSILON {
            return lag as f32;
        }
        lag as f32 + (right - left) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48_000;

    fn estimator() -> PitchEstimator {
        PitchEstimator::new(SAMPLE_RATE, 70.0, 1600.0, 0.15, -60.0)
    }

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    #[test]
    fn pure_sines_track_within_one_percent() {
        let mut est = estimator();
        let len = est.required_samples();
        for freq in [80.0_f32, 146.83, 220.0, 440.0, 880.0, 1500.0] {
            let result = est.estimate(&sine(freq, 0.5, len)).unwrap();
            let detected = result.frequency.expect("sine should be voiced");
            let error = (detected - freq).abs() / freq;
            assert!(error < 0.01, "{freq} Hz detected as {detected} Hz");
            assert!(
                result.confidence > 0.15,
                "confidence {} too low for {freq} Hz",
                result.confidence
            );
        }
    }

    #[test]
    fn silence_is_unvoiced_with_zero_confidence() {
        let mut est = estimator();
        let len = est.required_samples();
        let result = est.estimate(&vec![0.0; len]).unwrap();
        assert_eq!(result, PitchEstimate::silent());
    }

    #[test]
    fn sub_threshold_amplitude_is_unvoiced() {
        let mut est = estimator();
        let len = est.required_samples();
        // -60 dBFS gate; a 0.0002 amplitude sine sits well below it.
        let result = est.estimate(&sine(220.0, 0.0002, len)).unwrap();
        assert!(!result.is_voiced());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn nan_input_reads_as_silence() {
        let mut est = estimator();
        let len = est.required_samples();
        let mut samples = sine(220.0, 0.5, len);
        samples[len / 2] = f32::NAN;
        let result = est.estimate(&samples).unwrap();
        assert_eq!(result, PitchEstimate::silent());
    }

    #[test]
    fn short_window_is_rejected() {
        let mut est = estimator();
        let need = est.required_samples();
        let err = est.estimate(&sine(220.0, 0.5, need / 2)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientSamples { need: n, .. } if n == need
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn white_noise_is_unvoiced() {
        let mut est = estimator();
        let len = est.required_samples();
        // Deterministic pseudo-noise, loud enough to pass the RMS gate.
        let mut state = 0x12345678u32;
        let noise: Vec<f32> = (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 8) as f32 / (1 << 24) as f32 - 0.5
            })
            .collect();
        let result = est.estimate(&noise).unwrap();
        assert!(!result.is_voiced(), "noise produced {:?}", result.frequency);
    }
}
