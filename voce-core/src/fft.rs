//! # Fast Fourier Transform (FFT) Module
//!
//! Fixed-size spectral transform for the feature extractor. The plan, the
//! Hann window and the complex scratch buffer are all built once at
//! construction so the per-quantum path never allocates or re-plans.
//!
//! ## Features
//! - Forward FFT via RustFFT with a cached plan
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate low-bin magnitudes
//! - Half-spectrum magnitude output (Nyquist and below)

use rustfft::{FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Windowed forward FFT of a fixed size.
pub struct SpectralTransform {
    size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralTransform {
    /// Builds the plan and window for the given transform length.
    ///
    /// The length must be a power of two; [`crate::config::EngineConfig::validate`]
    /// enforces that before a transform is ever constructed.
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        // Hann window, computed once.
        let n_minus_1 = (size - 1) as f32;
        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
            .collect();

        Self {
            size,
            fft,
            window,
            scratch: vec![Complex { re: 0.0, im: 0.0 }; size],
        }
    }

    /// Transform length in samples.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of magnitude bins produced per transform.
    pub fn bins(&self) -> usize {
        self.size / 2
    }

    /// Runs DC removal, windowing and the forward FFT over `frame`,
    /// writing half-spectrum magnitudes into `out`.
    ///
    /// `frame` must be exactly [`size`](Self::size) samples and `out`
    /// exactly [`bins`](Self::bins) long; both are sized by the caller at
    /// construction time.
    pub fn magnitudes(&mut self, frame: &[f32], out: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.size);
        debug_assert_eq!(out.len(), self.bins());

        // Remove the DC offset so a constant bias does not leak a large
        // 0 Hz component into the centroid.
        let mean = frame.iter().sum::<f32>() / self.size as f32;

        for (i, (&sample, &w)) in frame.iter().zip(self.window.iter()).enumerate() {
            self.scratch[i] = Complex {
                re: (sample - mean) * w,
                im: 0.0,
            };
        }

        self.fft.process(&mut self.scratch);

        for (slot, c) in out.iter_mut().zip(self.scratch.iter()) {
            *slot = c.norm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn peak_bin_matches_input_frequency() {
        let sample_rate = 48_000.0;
        let size = 2048;
        let freq = 1000.0;
        let mut transform = SpectralTransform::new(size);
        let mut mags = vec![0.0; transform.bins()];
        transform.magnitudes(&sine(freq, sample_rate, size), &mut mags);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap();
        let bin_hz = sample_rate / size as f32;
        let peak_hz = peak as f32 * bin_hz;
        assert!(
            (peak_hz - freq).abs() <= bin_hz,
            "peak at {peak_hz} Hz for {freq} Hz input"
        );
    }

    #[test]
    fn dc_offset_is_removed() {
        let size = 1024;
        let mut transform = SpectralTransform::new(size);
        let mut mags = vec![0.0; transform.bins()];
        // Pure DC: without offset removal this would dominate bin 0.
        transform.magnitudes(&vec![0.75; size], &mut mags);
        assert!(mags[0] < 1e-3, "DC bin magnitude {}", mags[0]);
    }
}
