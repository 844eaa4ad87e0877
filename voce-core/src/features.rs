//! # Spectral Feature Extraction
//!
//! Brightness and breathiness from the magnitude spectrum of the most
//! recent audio. Both are pure functions of the analysis window, but the
//! FFT only runs every Nth quantum; between runs the previous values are
//! held constant so the control stream stays continuous without paying
//! the transform cost on every callback.

use std::collections::VecDeque;

use crate::fft::SpectralTransform;

/// Timbre descriptors for one control frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralFeatures {
    /// Normalized spectral centroid in [0, 1]; higher reads brighter.
    pub brightness: f32,
    /// High-band energy ratio in [0, 1]; higher reads breathier.
    pub breathiness: f32,
}

/// Derives [`SpectralFeatures`] from a rolling window of recent samples.
pub struct SpectralFeatureExtractor {
    transform: SpectralTransform,
    ring: VecDeque<f32>,
    frame: Vec<f32>,
    magnitudes: Vec<f32>,

    sample_rate: f32,
    interval: u32,
    counter: u32,
    held: SpectralFeatures,

    band_low_hz: f32,
    band_high_hz: f32,
    gamma: f32,
    split_hz: f32,
}

impl SpectralFeatureExtractor {
    pub fn new(
        sample_rate: u32,
        fft_size: usize,
        interval: u32,
        band_low_hz: f32,
        band_high_hz: f32,
        gamma: f32,
        split_hz: f32,
    ) -> Self {
        let transform = SpectralTransform::new(fft_size);
        let bins = transform.bins();
        Self {
            transform,
            ring: VecDeque::with_capacity(fft_size),
            frame: vec![0.0; fft_size],
            magnitudes: vec![0.0; bins],
            sample_rate: sample_rate as f32,
            interval: interval.max(1),
            counter: 0,
            held: SpectralFeatures::default(),
            band_low_hz,
            band_high_hz,
            gamma,
            split_hz,
        }
    }

    /// Feeds one quantum of samples and returns the current features.
    ///
    /// Recomputes on every `interval`-th call once the window has filled;
    /// otherwise returns the held values (zero-order hold, never a
    /// recomputed zero).
    pub fn process(&mut self, samples: &[f32]) -> SpectralFeatures {
        let size = self.transform.size();
        for &s in samples {
            if self.ring.len() == size {
                self.ring.pop_front();
            }
            // Non-finite samples poison the whole spectrum; write them
            // in as silence instead.
            self.ring.push_back(if s.is_finite() { s } else { 0.0 });
        }

        let due = self.counter % self.interval == 0;
        self.counter = self.counter.wrapping_add(1);

        if due && self.ring.len() == size {
            for (slot, &s) in self.frame.iter_mut().zip(self.ring.iter()) {
                *slot = s;
            }
            self.held = self.analyze();
        }
        self.held
    }

    /// Last computed values without feeding new audio.
    pub fn current(&self) -> SpectralFeatures {
        self.held
    }

    fn analyze(&mut self) -> SpectralFeatures {
        self.transform.magnitudes(&self.frame, &mut self.magnitudes);

        let bin_hz = self.sample_rate / self.transform.size() as f32;
        let lo = ((self.band_low_hz / bin_hz).ceil() as usize).min(self.magnitudes.len() - 1);
        let hi = ((self.band_high_hz / bin_hz).floor() as usize)
            .clamp(lo, self.magnitudes.len() - 1);

        let mut weighted = 0.0f64;
        let mut total_mag = 0.0f64;
        let mut total_energy = 0.0f64;
        let mut high_energy = 0.0f64;

        for bin in lo..=hi {
            let mag = self.magnitudes[bin] as f64;
            let freq = bin as f32 * bin_hz;
            weighted += freq as f64 * mag;
            total_mag += mag;
            let energy = mag * mag;
            total_energy += energy;
            if freq >= self.split_hz {
                high_energy += energy;
            }
        }

        if total_mag <= f64::EPSILON {
            // An empty band means silence; both descriptors read as flat.
            return SpectralFeatures::default();
        }

        let centroid = (weighted / total_mag) as f32;
        let span = (self.band_high_hz - self.band_low_hz).max(f32::EPSILON);
        let normalized = ((centroid - self.band_low_hz) / span).clamp(0.0, 1.0);
        let brightness = normalized.powf(self.gamma);

        let breathiness = if total_energy > f64::EPSILON {
            ((high_energy / total_energy) as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        SpectralFeatures {
            brightness,
            breathiness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48_000;
    const FFT_SIZE: usize = 2048;

    fn extractor(interval: u32) -> SpectralFeatureExtractor {
        SpectralFeatureExtractor::new(
            SAMPLE_RATE, FFT_SIZE, interval, 70.0, 8000.0, 0.6, 4000.0,
        )
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn high_tone_reads_brighter_than_low_tone() {
        let mut low = extractor(1);
        let mut high = extractor(1);
        let dark = low.process(&sine(200.0, FFT_SIZE));
        let bright = high.process(&sine(6000.0, FFT_SIZE));
        assert!(
            bright.brightness > dark.brightness + 0.2,
            "bright {} vs dark {}",
            bright.brightness,
            dark.brightness
        );
    }

    #[test]
    fn tone_above_split_reads_breathy() {
        let mut ext = extractor(1);
        let tonal = ext.process(&sine(200.0, FFT_SIZE));
        assert!(tonal.breathiness < 0.1, "pure tone {}", tonal.breathiness);

        let mut ext = extractor(1);
        let airy = ext.process(&sine(6000.0, FFT_SIZE));
        assert!(airy.breathiness > 0.9, "high tone {}", airy.breathiness);
    }

    #[test]
    fn values_hold_between_analysis_quanta() {
        let mut ext = extractor(4);
        // Fill the window with a low tone; first call computes.
        let first = ext.process(&sine(200.0, FFT_SIZE));
        assert!(first.brightness > 0.0);

        // Quanta 1..3 push a bright tone but must not recompute.
        let quantum = sine(7000.0, 128);
        for _ in 0..3 {
            let held = ext.process(&quantum);
            assert_eq!(held, first, "hold broke before the interval elapsed");
        }

        // Quantum 4 is due and sees mostly the original window; keep
        // pushing bright quanta until the window has turned over.
        let mut latest = ext.process(&quantum);
        for _ in 0..(FFT_SIZE / 128 + 4) {
            latest = ext.process(&quantum);
        }
        assert!(
            latest.brightness > first.brightness,
            "recompute never picked up the brighter signal"
        );
    }

    #[test]
    fn silence_reads_flat() {
        let mut ext = extractor(1);
        let features = ext.process(&vec![0.0; FFT_SIZE]);
        assert_eq!(features, SpectralFeatures::default());
    }
}
