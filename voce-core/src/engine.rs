//! # Capture Engine Module
//!
//! Owns the audio ingestion lifecycle and the per-quantum processing
//! pipeline. The device callback never does DSP: it re-frames incoming
//! samples and hands chunks to a dedicated worker thread over a bounded
//! channel. The worker runs estimation, articulation, feature
//! extraction, smoothing and correction for each quantum, assembles one
//! control frame and delivers it to the consumer channel without ever
//! blocking.
//!
//! ## Capture modes
//! - **Low latency**: a fixed small quantum requested from the device
//!   (`cpal::BufferSize::Fixed`). Chosen once at `start` when the device
//!   advertises a buffer-size range covering the configured quantum.
//! - **Fallback**: the device's default callback size, re-framed into
//!   larger buffers. Higher baseline latency, reported openly through
//!   `mode()` and the latency statistics rather than hidden.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::config::EngineConfig;
use crate::correction::{PitchCorrector, ScaleDefinition, ScaleType};
use crate::error::EngineError;
use crate::features::SpectralFeatureExtractor;
use crate::latency::{LatencyMonitor, LatencyStats};
use crate::onset::{Articulation, OnsetDetector};
use crate::pitch::PitchEstimator;
use crate::smoothing::{EmaFilter, PitchFilter};
use crate::{AudioChunk, ControlFrame, tuning};

/// Chunks the device callback may queue ahead of the worker.
const RAW_QUEUE: usize = 8;
/// Frames the worker may queue ahead of the consumer.
const FRAME_QUEUE: usize = 64;
/// How long `start` waits for the worker to open the device.
const START_TIMEOUT: Duration = Duration::from_secs(5);
/// Loudness reported for an all-zero quantum, in dBFS.
const SILENCE_FLOOR_DB: f32 = -100.0;

/// Which ingestion path the engine settled on at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Fixed small-quantum callbacks straight from the device.
    LowLatency,
    /// Larger re-framed buffers over the device's default callback size.
    Fallback,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::LowLatency => "low-latency",
            CaptureMode::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime parameter updates, applied by the worker at the next quantum
/// boundary.
enum ControlCommand {
    SetScale { root: u8, scale_type: ScaleType },
    SetAutoTune { enabled: bool, speed: f32 },
}

struct WorkerReady {
    mode: CaptureMode,
    sample_rate: u32,
}

struct Running {
    shutdown_tx: Sender<()>,
    command_tx: Sender<ControlCommand>,
    worker: JoinHandle<()>,
}

/// The public face of the capture/analysis pipeline.
pub struct CaptureEngine {
    config: EngineConfig,
    frame_tx: Sender<ControlFrame>,
    frame_rx: Receiver<ControlFrame>,
    latency: Arc<Mutex<LatencyMonitor>>,
    mode: Option<CaptureMode>,
    sample_rate: Option<u32>,
    running: Option<Running>,
}

impl CaptureEngine {
    /// Validates the configuration and prepares the delivery channel.
    /// No device is touched until [`start`](Self::start).
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE);
        let latency = Arc::new(Mutex::new(LatencyMonitor::new(config.latency_window)));
        Ok(Self {
            config,
            frame_tx,
            frame_rx,
            latency,
            mode: None,
            sample_rate: None,
            running: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Validates and stores a new configuration.
    ///
    /// While running the stored config only takes effect at the next
    /// `start`; the in-flight stream is never touched.
    pub fn configure(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        if self.running.is_some() {
            log::warn!("configure() while running: stored for the next start");
        } else if let Ok(mut monitor) = self.latency.lock() {
            *monitor = LatencyMonitor::new(config.latency_window);
        }
        self.config = config;
        Ok(())
    }

    /// Opens the audio source and begins emitting control frames.
    ///
    /// The capture mode is decided here, once; see the module docs.
    /// Calling `start` while already running is a no-op with a warning.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running.is_some() {
            log::warn!("start() called while already running; ignoring");
            return Ok(());
        }
        self.config.validate()?;

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        if let Ok(mut monitor) = self.latency.lock() {
            monitor.clear();
        }

        let config = self.config.clone();
        let frame_tx = self.frame_tx.clone();
        let latency = Arc::clone(&self.latency);
        let worker = thread::Builder::new()
            .name("voce-capture".into())
            .spawn(move || run_worker(config, frame_tx, latency, ready_tx, shutdown_rx, command_rx))
            .map_err(|e| {
                EngineError::DeviceUnavailable(format!("failed to spawn capture worker: {e}"))
            })?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(ready)) => {
                log::info!(
                    "capture running in {} mode at {} Hz",
                    ready.mode,
                    ready.sample_rate
                );
                self.mode = Some(ready.mode);
                self.sample_rate = Some(ready.sample_rate);
                self.running = Some(Running {
                    shutdown_tx,
                    command_tx,
                    worker,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = shutdown_tx.try_send(());
                let _ = worker.join();
                Err(EngineError::DeviceUnavailable(
                    "audio worker did not report readiness in time".into(),
                ))
            }
        }
    }

    /// Releases the audio source and halts frame emission. Safe to call
    /// when not running; stopping is honored at a quantum boundary, an
    /// in-progress quantum is never cancelled.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            log::debug!("stop() called while not running");
            return;
        };
        let _ = running.shutdown_tx.try_send(());
        if running.worker.join().is_err() {
            log::error!("capture worker panicked during shutdown");
        }
        self.mode = None;
        self.sample_rate = None;
    }

    /// The frame delivery channel. One [`ControlFrame`] per processed
    /// quantum; the worker drops frames rather than block when the
    /// consumer falls behind.
    pub fn frames(&self) -> &Receiver<ControlFrame> {
        &self.frame_rx
    }

    /// The active capture mode, `None` while stopped.
    pub fn mode(&self) -> Option<CaptureMode> {
        self.mode
    }

    /// The sample rate the device actually delivered, `None` while
    /// stopped.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Latency summary over the sliding window, `None` until the first
    /// frame has been delivered.
    pub fn latency_stats(&self) -> Option<LatencyStats> {
        self.latency.lock().ok().and_then(|monitor| monitor.stats())
    }

    /// Registers the host's latency estimate for the external synthesis
    /// stage, reported alongside (never folded into) the measured values.
    pub fn set_external_latency_estimate(&mut self, estimate: Option<Duration>) {
        if let Ok(mut monitor) = self.latency.lock() {
            monitor.set_external_estimate(estimate);
        }
    }

    /// Swaps the correction scale, effective at the next quantum.
    pub fn set_scale(&mut self, root: u8, scale_type: ScaleType) {
        self.config.scale_root = root % 12;
        self.config.scale_type = scale_type;
        if let Some(running) = &self.running {
            let _ = running.command_tx.send(ControlCommand::SetScale {
                root: root % 12,
                scale_type,
            });
        }
    }

    /// Enables/disables auto-tune and sets the retune speed, effective
    /// at the next quantum.
    pub fn set_auto_tune(&mut self, enabled: bool, speed: f32) {
        let speed = speed.clamp(0.0, 1.0);
        self.config.auto_tune = enabled;
        self.config.auto_tune_speed = speed;
        if let Some(running) = &self.running {
            let _ = running
                .command_tx
                .send(ControlCommand::SetAutoTune { enabled, speed });
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decides the capture mode from the device's advertised buffer sizes.
/// Made once per `start`; never re-evaluated mid-stream.
fn select_mode(
    prefer_low_latency: bool,
    quantum: usize,
    supported: &cpal::SupportedBufferSize,
) -> CaptureMode {
    if !prefer_low_latency {
        return CaptureMode::Fallback;
    }
    match supported {
        cpal::SupportedBufferSize::Range { min, max } => {
            if (*min..=*max).contains(&(quantum as u32)) {
                CaptureMode::LowLatency
            } else {
                CaptureMode::Fallback
            }
        }
        cpal::SupportedBufferSize::Unknown => CaptureMode::Fallback,
    }
}

/// Finds the best mono f32 configuration closest to the target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            min_diff.min(max_diff)
        })
}

fn map_build_error(err: cpal::BuildStreamError) -> EngineError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            EngineError::DeviceUnavailable("the input device is no longer available".into())
        }
        cpal::BuildStreamError::BackendSpecific { err } => {
            let description = err.description;
            let lowered = description.to_lowercase();
            if lowered.contains("permission") || lowered.contains("denied") {
                EngineError::PermissionDenied(description)
            } else {
                EngineError::DeviceUnavailable(description)
            }
        }
        other => EngineError::DeviceUnavailable(other.to_string()),
    }
}

fn map_play_error(err: cpal::PlayStreamError) -> EngineError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => {
            EngineError::DeviceUnavailable("the input device disappeared before playback".into())
        }
        cpal::PlayStreamError::BackendSpecific { err } => {
            EngineError::DeviceUnavailable(err.description)
        }
    }
}

/// Opens the device and builds the input stream. Runs on the worker
/// thread so the (non-`Send`) stream never crosses threads.
fn open_capture(
    config: &EngineConfig,
) -> Result<(cpal::Stream, Receiver<AudioChunk>, CaptureMode, u32), EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| EngineError::DeviceUnavailable("no input device available".into()))?;

    match device.name() {
        Ok(name) => log::info!("using audio input device: {name}"),
        Err(_) => log::info!("using unnamed audio input device"),
    }

    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| EngineError::DeviceUnavailable(format!("cannot query input formats: {e}")))?
        .collect();
    let range = find_supported_config(ranges, config.sample_rate).ok_or_else(|| {
        EngineError::DeviceUnavailable("no mono f32 input format available".into())
    })?;

    let rate = config
        .sample_rate
        .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    let supported = range.with_sample_rate(cpal::SampleRate(rate));

    let mode = select_mode(
        config.prefer_low_latency,
        config.quantum,
        supported.buffer_size(),
    );
    let (frame_len, buffer_size) = match mode {
        CaptureMode::LowLatency => (
            config.quantum,
            cpal::BufferSize::Fixed(config.quantum as u32),
        ),
        CaptureMode::Fallback => {
            if config.prefer_low_latency {
                log::warn!(
                    "fixed {}-sample quanta unsupported on this device; \
                     falling back to {}-sample buffered capture",
                    config.quantum,
                    config.fallback_buffer
                );
            }
            (config.fallback_buffer, cpal::BufferSize::Default)
        }
    };

    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(rate),
        buffer_size,
    };

    let (raw_tx, raw_rx) = bounded(RAW_QUEUE);
    // Accumulates callback data until a full frame is available; in
    // low-latency mode this usually forwards one chunk per callback.
    let mut accumulator: Vec<f32> = Vec::with_capacity(frame_len * 2);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let received_at = Instant::now();
                accumulator.extend_from_slice(data);
                while accumulator.len() >= frame_len {
                    let chunk = AudioChunk {
                        samples: accumulator[..frame_len].to_vec(),
                        sample_rate: rate,
                        captured_at: received_at,
                    };
                    // Never block the device callback; a full queue
                    // costs a chunk, not a stall.
                    let _ = raw_tx.try_send(chunk);
                    accumulator.drain(..frame_len);
                }
            },
            |err| log::error!("input stream error: {err}"),
            None,
        )
        .map_err(map_build_error)?;

    Ok((stream, raw_rx, mode, rate))
}

/// Worker entry point: opens the device, reports readiness, then runs
/// the per-quantum loop until shutdown.
fn run_worker(
    config: EngineConfig,
    frame_tx: Sender<ControlFrame>,
    latency: Arc<Mutex<LatencyMonitor>>,
    ready_tx: Sender<Result<WorkerReady, EngineError>>,
    shutdown_rx: Receiver<()>,
    command_rx: Receiver<ControlCommand>,
) {
    let (stream, raw_rx, mode, sample_rate) = match open_capture(&config) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(map_play_error(e)));
        return;
    }

    let mut pipeline = Pipeline::new(&config, sample_rate);
    let _ = ready_tx.send(Ok(WorkerReady { mode, sample_rate }));

    loop {
        select! {
            recv(raw_rx) -> msg => match msg {
                Ok(chunk) => {
                    // Parameter updates land exactly at quantum
                    // boundaries, never mid-quantum.
                    while let Ok(command) = command_rx.try_recv() {
                        pipeline.apply(command);
                    }
                    if let Some(frame) = pipeline.process(&chunk) {
                        let captured_at = frame.captured_at;
                        if frame_tx.try_send(frame).is_err() {
                            log::debug!("frame queue full; dropping frame");
                        }
                        if let Ok(mut monitor) = latency.lock() {
                            monitor.record(captured_at.elapsed());
                        }
                    }
                }
                Err(_) => {
                    log::error!("capture stream closed unexpectedly");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => break,
        }
    }

    if let Err(e) = stream.pause() {
        log::warn!("error pausing input stream: {e}");
    }
    drop(stream);
}

/// The per-quantum processing chain, owned exclusively by the worker.
struct Pipeline {
    estimator: PitchEstimator,
    onset: OnsetDetector,
    features: SpectralFeatureExtractor,
    pitch_filter: PitchFilter,
    volume_ema: EmaFilter,
    brightness_ema: EmaFilter,
    corrector: PitchCorrector,

    window: VecDeque<f32>,
    window_len: usize,
    scratch: Vec<f32>,
    min_confidence: f32,
    previous_articulation: Articulation,
    sequence: u64,
}

impl Pipeline {
    fn new(config: &EngineConfig, sample_rate: u32) -> Self {
        let estimator = PitchEstimator::new(
            sample_rate,
            config.min_frequency,
            config.max_frequency,
            config.clarity_threshold,
            config.min_volume_db,
        );
        let window_len = config.analysis_window.max(estimator.required_samples());

        let nyquist = sample_rate as f32 / 2.0;
        let features = SpectralFeatureExtractor::new(
            sample_rate,
            config.fft_size,
            config.spectral_interval,
            config.min_frequency,
            config.max_band_frequency.min(nyquist),
            config.brightness_gamma,
            config.breathiness_split_hz.min(nyquist),
        );

        let onset = OnsetDetector::new(
            config.onset.energy_threshold_db,
            config.onset.silence_threshold_db,
            Duration::from_secs_f32(config.onset.attack_duration_ms / 1000.0),
            Duration::from_secs_f32(config.onset.min_silence_ms / 1000.0),
        );

        let corrector = PitchCorrector::new(
            ScaleDefinition::new(config.scale_root, config.scale_type),
            config.auto_tune,
            config.auto_tune_speed,
            config.min_frequency,
            config.max_frequency,
        );

        Self {
            estimator,
            onset,
            features,
            pitch_filter: PitchFilter::new(
                config.smoothing.pitch_process_noise,
                config.smoothing.pitch_measurement_noise,
            ),
            volume_ema: EmaFilter::new(config.smoothing.volume_alpha),
            brightness_ema: EmaFilter::new(config.smoothing.brightness_alpha),
            corrector,
            window: VecDeque::with_capacity(window_len),
            window_len,
            scratch: Vec::with_capacity(window_len),
            min_confidence: config.min_confidence,
            previous_articulation: Articulation::Silence,
            sequence: 0,
        }
    }

    fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetScale { root, scale_type } => {
                self.corrector
                    .set_scale(ScaleDefinition::new(root, scale_type));
            }
            ControlCommand::SetAutoTune { enabled, speed } => {
                self.corrector.set_auto_tune(enabled, speed);
            }
        }
    }

    /// Runs the full per-quantum chain. Returns `None` when the frame is
    /// dropped (analysis window still warming up); the next quantum
    /// proceeds normally.
    fn process(&mut self, chunk: &AudioChunk) -> Option<ControlFrame> {
        // Loudness comes from this quantum alone so articulation reacts
        // within one callback. Non-finite samples count as silence.
        let mut sum_sq = 0.0f64;
        for &s in &chunk.samples {
            if s.is_finite() {
                sum_sq += (s as f64) * (s as f64);
            }
        }
        let rms = (sum_sq / chunk.samples.len().max(1) as f64).sqrt() as f32;
        let loudness_db = if rms > 0.0 {
            (20.0 * rms.log10()).max(SILENCE_FLOOR_DB)
        } else {
            SILENCE_FLOOR_DB
        };

        let articulation = self.onset.update(loudness_db, chunk.captured_at);
        if articulation == Articulation::Silence
            && self.previous_articulation != Articulation::Silence
        {
            // A rest ends the note: forget the old pitch so the next
            // onset starts clean instead of gliding from stale state.
            self.pitch_filter.reset();
            self.corrector.reset();
        }
        self.previous_articulation = articulation;

        for &s in &chunk.samples {
            if self.window.len() == self.window_len {
                self.window.pop_front();
            }
            self.window.push_back(if s.is_finite() { s } else { 0.0 });
        }

        let spectral = self.features.process(&chunk.samples);
        let volume_db = self.volume_ema.update(loudness_db);
        let brightness = self.brightness_ema.update(spectral.brightness).clamp(0.0, 1.0);

        self.scratch.clear();
        self.scratch.extend(self.window.iter().copied());
        let estimate = match self.estimator.estimate(&self.scratch) {
            Ok(estimate) => estimate,
            Err(e) => {
                // Window still filling right after start; skip the frame.
                log::debug!("dropping frame: {e}");
                return None;
            }
        };

        let (smoothed, confidence) = match estimate.frequency {
            Some(f) => (Some(self.pitch_filter.update(f)), estimate.confidence),
            None => (None, 0.0),
        };
        let corrected =
            self.corrector
                .correct(smoothed, confidence, self.min_confidence, chunk.captured_at);

        let (note_name, octave) = match corrected {
            Some(f) => (
                tuning::note_label(f),
                tuning::name_and_octave(f).map(|(_, octave)| octave),
            ),
            None => (None, None),
        };

        let frame = ControlFrame {
            frequency: corrected,
            confidence,
            note_name,
            octave,
            volume_db,
            brightness,
            breathiness: spectral.breathiness,
            articulation,
            captured_at: chunk.captured_at,
            sequence: self.sequence,
        };
        self.sequence += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selection_honors_device_support() {
        let wide = cpal::SupportedBufferSize::Range { min: 64, max: 4096 };
        let narrow = cpal::SupportedBufferSize::Range {
            min: 256,
            max: 4096,
        };
        let unknown = cpal::SupportedBufferSize::Unknown;

        assert_eq!(select_mode(true, 128, &wide), CaptureMode::LowLatency);
        // Device cannot do 128-sample callbacks: degrade, don't fail.
        assert_eq!(select_mode(true, 128, &narrow), CaptureMode::Fallback);
        assert_eq!(select_mode(true, 128, &unknown), CaptureMode::Fallback);
        assert_eq!(select_mode(false, 128, &wide), CaptureMode::Fallback);
    }

    const SAMPLE_RATE: u32 = 48_000;

    fn chunk_at(samples: Vec<f32>, t: Instant) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate: SAMPLE_RATE,
            captured_at: t,
        }
    }

    fn sine_quanta(freq: f32, amplitude: f32, quantum: usize, count: usize) -> Vec<Vec<f32>> {
        let mut phase = 0.0f32;
        let step = 2.0 * std::f32::consts::PI * freq / SAMPLE_RATE as f32;
        (0..count)
            .map(|_| {
                (0..quantum)
                    .map(|_| {
                        let s = amplitude * phase.sin();
                        phase += step;
                        s
                    })
                    .collect()
            })
            .collect()
    }

    fn run_quanta(
        pipeline: &mut Pipeline,
        quanta: Vec<Vec<f32>>,
        start: Instant,
        offset: usize,
    ) -> Vec<ControlFrame> {
        let quantum_time = Duration::from_secs_f64(128.0 / SAMPLE_RATE as f64);
        quanta
            .into_iter()
            .enumerate()
            .filter_map(|(i, samples)| {
                let t = start + quantum_time * (offset + i) as u32;
                pipeline.process(&chunk_at(samples, t))
            })
            .collect()
    }

    #[test]
    fn sung_note_produces_corrected_voiced_frames() {
        let config = EngineConfig::default();
        let mut pipeline = Pipeline::new(&config, SAMPLE_RATE);
        let t0 = Instant::now();

        // 220 Hz (A3) is exactly on the chromatic grid.
        let frames = run_quanta(
            &mut pipeline,
            sine_quanta(220.0, 0.5, config.quantum, 60),
            t0,
            0,
        );

        assert!(!frames.is_empty(), "warmup never completed");
        let voiced: Vec<_> = frames.iter().filter(|f| f.frequency.is_some()).collect();
        assert!(!voiced.is_empty(), "no voiced frames for a loud sine");

        let last = voiced.last().unwrap();
        let freq = last.frequency.unwrap();
        assert!((freq - 220.0).abs() / 220.0 < 0.01, "landed at {freq} Hz");
        assert_eq!(last.note_name.as_deref(), Some("A3"));
        assert_eq!(last.octave, Some(3));
        assert!(last.volume_db > -20.0, "volume {}", last.volume_db);
        assert_eq!(last.articulation, Articulation::Sustain);

        // The articulation arc passed through attack before sustain.
        assert!(
            frames
                .iter()
                .any(|f| f.articulation == Articulation::Attack),
            "attack phase was skipped"
        );

        // Sequence indices are contiguous.
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
        }
    }

    #[test]
    fn silence_after_a_note_resets_the_correction_state() {
        let config = EngineConfig::default();
        let mut pipeline = Pipeline::new(&config, SAMPLE_RATE);
        let t0 = Instant::now();

        run_quanta(
            &mut pipeline,
            sine_quanta(220.0, 0.5, config.quantum, 60),
            t0,
            0,
        );
        assert!(pipeline.corrector.locked_note().is_some());

        // Enough silent quanta to pass the 120 ms silence guard.
        let silent = vec![vec![0.0; config.quantum]; 80];
        let frames = run_quanta(&mut pipeline, silent, t0, 60);

        let last = frames.last().unwrap();
        assert_eq!(last.articulation, Articulation::Silence);
        assert_eq!(last.frequency, None);
        assert_eq!(last.confidence, 0.0);
        assert_eq!(pipeline.corrector.locked_note(), None);
        assert_eq!(pipeline.pitch_filter.value(), None);
    }

    #[test]
    fn nan_quanta_read_as_silence_not_poison() {
        let config = EngineConfig::default();
        let mut pipeline = Pipeline::new(&config, SAMPLE_RATE);
        let t0 = Instant::now();

        let mut quanta = sine_quanta(220.0, 0.5, config.quantum, 40);
        quanta.push(vec![f32::NAN; config.quantum]);
        let frames = run_quanta(&mut pipeline, quanta, t0, 0);

        let last = frames.last().unwrap();
        assert!(last.volume_db.is_finite());
        assert!(last.brightness.is_finite());
        // A later clean quantum still produces a sane frame.
        let more = run_quanta(
            &mut pipeline,
            sine_quanta(220.0, 0.5, config.quantum, 20),
            t0,
            41,
        );
        let freq = more.last().unwrap().frequency;
        assert!(freq.is_some(), "pipeline never recovered after NaN input");
    }

    #[test]
    fn runtime_commands_swap_scale_and_tune_settings() {
        let config = EngineConfig::default();
        let mut pipeline = Pipeline::new(&config, SAMPLE_RATE);

        pipeline.apply(ControlCommand::SetAutoTune {
            enabled: false,
            speed: 0.0,
        });
        let t0 = Instant::now();
        let frames = run_quanta(
            &mut pipeline,
            sine_quanta(223.0, 0.5, config.quantum, 60),
            t0,
            0,
        );
        // Correction disabled: the 223 Hz input passes through instead
        // of being pulled onto 220.
        let freq = frames.last().unwrap().frequency.unwrap();
        assert!((freq - 223.0).abs() < 3.0, "pass-through gave {freq} Hz");

        pipeline.apply(ControlCommand::SetScale {
            root: 0,
            scale_type: ScaleType::Major,
        });
        pipeline.apply(ControlCommand::SetAutoTune {
            enabled: true,
            speed: 0.0,
        });
        let frames = run_quanta(
            &mut pipeline,
            sine_quanta(223.0, 0.5, config.quantum, 40),
            t0 + Duration::from_secs(1),
            0,
        );
        // 223 Hz sits near A3 (220), which C major contains.
        let freq = frames.last().unwrap().frequency.unwrap();
        assert!((freq - 220.0).abs() < 1.0, "correction gave {freq} Hz");
    }

    #[test]
    fn engine_rejects_invalid_config_before_touching_a_device() {
        let config = EngineConfig {
            fft_size: 1234,
            ..EngineConfig::default()
        };
        assert!(matches!(
            CaptureEngine::new(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn latency_stats_absent_before_any_frame() {
        let engine = CaptureEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.latency_stats().is_none());
        assert_eq!(engine.mode(), None);
        assert!(!engine.is_running());
    }
}
