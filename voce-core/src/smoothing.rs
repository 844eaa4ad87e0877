//! # Smoothing Filters
//!
//! Per-signal temporal smoothing: a scalar predict/correct recursive
//! filter for pitch and one-pole exponential moving averages for the
//! slower control signals. Each instance owns its own state; on every
//! transition into silence the engine resets the pitch filter so a stale
//! estimate can never color the next onset.

/// Scalar recursive filter over pitch measurements.
///
/// `process_noise` (Q) widens the prediction each step, `measurement_noise`
/// (R) discounts new readings. Larger Q tracks faster; larger R smooths
/// harder.
pub struct PitchFilter {
    process_noise: f32,
    measurement_noise: f32,
    estimate: Option<f32>,
    covariance: f32,
}

impl PitchFilter {
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            process_noise,
            measurement_noise,
            estimate: None,
            covariance: 0.0,
        }
    }

    /// Folds in one measurement and returns the new estimate.
    ///
    /// The first measurement after construction or [`reset`](Self::reset)
    /// is adopted as-is; there is no prior worth predicting from.
    pub fn update(&mut self, measurement: f32) -> f32 {
        match self.estimate {
            None => {
                self.estimate = Some(measurement);
                self.covariance = self.measurement_noise;
                measurement
            }
            Some(previous) => {
                // Predict: the model is "pitch stays put", so only the
                // uncertainty grows.
                let predicted_cov = self.covariance + self.process_noise;
                // Correct.
                let gain = predicted_cov / (predicted_cov + self.measurement_noise);
                let estimate = previous + gain * (measurement - previous);
                self.covariance = (1.0 - gain) * predicted_cov;
                self.estimate = Some(estimate);
                estimate
            }
        }
    }

    /// Current estimate, if any measurement has arrived since the last
    /// reset.
    pub fn value(&self) -> Option<f32> {
        self.estimate
    }

    /// Forgets the estimate and its uncertainty.
    pub fn reset(&mut self) {
        self.estimate = None;
        self.covariance = 0.0;
    }
}

/// One-pole exponential moving average.
///
/// `output = alpha * input + (1 - alpha) * previous`, with the first
/// input adopted directly.
pub struct EmaFilter {
    alpha: f32,
    state: Option<f32>,
}

impl EmaFilter {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            state: None,
        }
    }

    pub fn update(&mut self, input: f32) -> f32 {
        let next = match self.state {
            None => input,
            Some(previous) => self.alpha * input + (1.0 - self.alpha) * previous,
        };
        self.state = Some(next);
        next
    }

    pub fn value(&self) -> Option<f32> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
