//! # Engine Configuration
//!
//! A validated, strongly-typed configuration for the whole pipeline. The
//! host supplies it as data (every field has an explicit default, so a
//! partial JSON document works); `validate` runs once at `configure` /
//! `start` time, before any audio is touched. No component ever falls
//! back to an ad-hoc default at its use site.

use serde::{Deserialize, Serialize};

use crate::correction::ScaleType;
use crate::error::EngineError;

/// Top-level configuration for [`crate::engine::CaptureEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested sample rate in Hz. The device may land on the closest
    /// rate it supports; all analysis uses the actual rate.
    pub sample_rate: u32,
    /// Samples per quantum in low-latency mode.
    pub quantum: usize,
    /// Samples per processed buffer in fallback mode.
    pub fallback_buffer: usize,
    /// Ask for the fixed small-quantum path when the device offers it.
    /// The decision is made once at `start` and never revisited.
    pub prefer_low_latency: bool,
    /// Samples of recent audio the pitch estimator looks at. Must cover
    /// two periods of the lowest detectable frequency.
    pub analysis_window: usize,

    /// Lowest fundamental the estimator searches for, in Hz.
    pub min_frequency: f32,
    /// Highest fundamental the estimator searches for, in Hz.
    pub max_frequency: f32,
    /// Normalized-difference dip a lag must fall below to count as a
    /// pitch. Lower is stricter.
    pub clarity_threshold: f32,
    /// RMS level (dBFS) below which input is treated as unvoiced.
    pub min_volume_db: f32,
    /// Confidence a pitch estimate needs before the corrector will move
    /// its note lock.
    pub min_confidence: f32,

    /// FFT length for spectral features. Power of two.
    pub fft_size: usize,
    /// Spectral features are recomputed every this many quanta; held
    /// constant in between.
    pub spectral_interval: u32,
    /// Upper edge of the analysis band used for brightness, in Hz.
    pub max_band_frequency: f32,
    /// Gamma curve applied to normalized brightness. Values below one
    /// spread the low end apart.
    pub brightness_gamma: f32,
    /// Frequency above which energy counts as breath noise, in Hz.
    pub breathiness_split_hz: f32,

    /// Attack/sustain/release thresholds and debounce durations.
    pub onset: OnsetConfig,
    /// Filter coefficients for pitch, volume and brightness smoothing.
    pub smoothing: SmoothingConfig,

    /// Root pitch class of the correction scale, 0 (C) through 11 (B).
    pub scale_root: u8,
    /// Interval set used for pitch correction.
    pub scale_type: ScaleType,
    /// Whether scale quantization is applied at all. When off the
    /// corrector passes pitch through, clamped to the detectable range.
    pub auto_tune: bool,
    /// Retune speed in [0, 1]: 0 snaps instantly, 1 glides with a
    /// ~200 ms time constant.
    pub auto_tune_speed: f32,

    /// Number of per-frame latency samples kept for statistics.
    pub latency_window: usize,
}

/// Thresholds and debounce durations for the articulation state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Loudness (dBFS) that marks the start of a note.
    pub energy_threshold_db: f32,
    /// Loudness (dBFS) below which the voice is considered silent.
    pub silence_threshold_db: f32,
    /// How long loudness must stay above the energy threshold before the
    /// attack settles into sustain, in milliseconds.
    pub attack_duration_ms: f32,
    /// How long loudness must stay below the silence threshold before a
    /// release becomes silence, in milliseconds.
    pub min_silence_ms: f32,
}

/// Coefficients for the per-signal smoothing filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Process noise of the recursive pitch filter. Larger tracks faster.
    pub pitch_process_noise: f32,
    /// Measurement noise of the recursive pitch filter. Larger smooths
    /// harder.
    pub pitch_measurement_noise: f32,
    /// EMA coefficient for loudness, in (0, 1].
    pub volume_alpha: f32,
    /// EMA coefficient for brightness, in (0, 1].
    pub brightness_alpha: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            quantum: 128,
            fallback_buffer: 2048,
            prefer_low_latency: true,
            analysis_window: 2048,
            min_frequency: 70.0,
            max_frequency: 1600.0,
            clarity_threshold: 0.15,
            min_volume_db: -60.0,
            min_confidence: 0.5,
            fft_size: 2048,
            spectral_interval: 4,
            max_band_frequency: 8000.0,
            brightness_gamma: 0.6,
            breathiness_split_hz: 4000.0,
            onset: OnsetConfig::default(),
            smoothing: SmoothingConfig::default(),
            scale_root: 0,
            scale_type: ScaleType::Chromatic,
            auto_tune: true,
            auto_tune_speed: 0.35,
            latency_window: 240,
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            energy_threshold_db: -45.0,
            silence_threshold_db: -55.0,
            attack_duration_ms: 30.0,
            min_silence_ms: 120.0,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            pitch_process_noise: 25.0,
            pitch_measurement_noise: 100.0,
            volume_alpha: 0.3,
            brightness_alpha: 0.25,
        }
    }
}

impl EngineConfig {
    /// Checks every field against its valid range. Called by the engine
    /// before a device is opened; a failure here never leaves a stream
    /// half-started.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "sample_rate {} Hz outside 8000..=192000",
                self.sample_rate
            )));
        }
        if self.quantum < 32 || self.quantum > 8192 {
            return Err(EngineError::InvalidConfig(format!(
                "quantum {} outside 32..=8192",
                self.quantum
            )));
        }
        if self.fallback_buffer < self.quantum {
            return Err(EngineError::InvalidConfig(format!(
                "fallback_buffer {} smaller than quantum {}",
                self.fallback_buffer, self.quantum
            )));
        }
        if !self.fft_size.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "fft_size {} is not a power of two",
                self.fft_size
            )));
        }
        if self.min_frequency <= 0.0 || self.min_frequency >= self.max_frequency {
            return Err(EngineError::InvalidConfig(format!(
                "frequency range {}..{} Hz is empty or negative",
                self.min_frequency, self.max_frequency
            )));
        }
        if self.max_frequency > self.sample_rate as f32 / 2.0 {
            return Err(EngineError::InvalidConfig(format!(
                "max_frequency {} Hz above the Nyquist limit for {} Hz",
                self.max_frequency, self.sample_rate
            )));
        }
        // The estimator needs two full periods of the lowest frequency.
        let max_lag = (self.sample_rate as f32 / self.min_frequency).ceil() as usize;
        if self.analysis_window < max_lag * 2 {
            return Err(EngineError::InvalidConfig(format!(
                "analysis_window {} cannot cover two periods of {} Hz (needs {})",
                self.analysis_window,
                self.min_frequency,
                max_lag * 2
            )));
        }
        if !(0.0..=1.0).contains(&self.clarity_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "clarity_threshold {} outside [0, 1]",
                self.clarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::InvalidConfig(format!(
                "min_confidence {} outside [0, 1]",
                self.min_confidence
            )));
        }
        if self.spectral_interval == 0 {
            return Err(EngineError::InvalidConfig(
                "spectral_interval must be at least 1".into(),
            ));
        }
        if self.brightness_gamma <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "brightness_gamma {} must be positive",
                self.brightness_gamma
            )));
        }
        if self.onset.silence_threshold_db >= self.onset.energy_threshold_db {
            return Err(EngineError::InvalidConfig(format!(
                "silence threshold {} dB must sit below energy threshold {} dB",
                self.onset.silence_threshold_db, self.onset.energy_threshold_db
            )));
        }
        if self.onset.attack_duration_ms < 0.0 || self.onset.min_silence_ms < 0.0 {
            return Err(EngineError::InvalidConfig(
                "onset durations must not be negative".into(),
            ));
        }
        for (name, alpha) in [
            ("volume_alpha", self.smoothing.volume_alpha),
            ("brightness_alpha", self.smoothing.brightness_alpha),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} {alpha} outside (0, 1]"
                )));
            }
        }
        if self.smoothing.pitch_process_noise <= 0.0
            || self.smoothing.pitch_measurement_noise <= 0.0
        {
            return Err(EngineError::InvalidConfig(
                "pitch filter noise parameters must be positive".into(),
            ));
        }
        if self.scale_root > 11 {
            return Err(EngineError::InvalidConfig(format!(
                "scale_root {} outside 0..=11",
                self.scale_root
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_tune_speed) {
            return Err(EngineError::InvalidConfig(format!(
                "auto_tune_speed {} outside [0, 1]",
                self.auto_tune_speed
            )));
        }
        if self.latency_window == 0 {
            return Err(EngineError::InvalidConfig(
                "latency_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let cfg = EngineConfig {
            fft_size: 1000,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_inverted_frequency_range() {
        let cfg = EngineConfig {
            min_frequency: 2000.0,
            max_frequency: 100.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let cfg = EngineConfig {
            clarity_threshold: 1.5,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            smoothing: SmoothingConfig {
                volume_alpha: 0.0,
                ..SmoothingConfig::default()
            },
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_window_too_small_for_range() {
        let cfg = EngineConfig {
            analysis_window: 256,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"sample_rate": 44100, "auto_tune": false}"#).unwrap();
        assert_eq!(cfg.sample_rate, 44_100);
        assert!(!cfg.auto_tune);
        assert_eq!(cfg.quantum, EngineConfig::default().quantum);
        assert!(cfg.validate().is_ok());
    }
}
