//! # Voce - headless control-stream monitor
//!
//! A minimal consumer for the capture engine: starts it from an optional
//! JSON configuration file, prints a sample of the delivered control
//! frames, then reports the active capture mode and the latency summary.
//! This binary sits on the consumer side of the frame channel; all DSP
//! runs inside `voce-core`'s worker thread.
//!
//! Usage: `voce-cli [config.json] [seconds]`

use std::env;
use std::fs;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use voce_core::{CaptureEngine, ControlFrame, EngineConfig};

/// Print every Nth frame so a low-latency stream does not flood the
/// terminal.
const PRINT_EVERY: u64 = 16;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => load_config(&path)?,
        None => EngineConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid duration '{raw}'"))?,
        None => 10,
    };

    let mut engine = CaptureEngine::new(config).context("configuration rejected")?;
    engine.start().context("failed to start capture")?;

    match (engine.mode(), engine.sample_rate()) {
        (Some(mode), Some(rate)) => println!("capturing in {mode} mode at {rate} Hz"),
        _ => println!("capturing"),
    }

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        match engine.frames().recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                if frame.sequence % PRINT_EVERY == 0 {
                    println!("{}", describe(&frame));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("frame channel closed; stopping early");
                break;
            }
        }
    }

    if let Some(stats) = engine.latency_stats() {
        println!(
            "latency over {} frames: min {:.2?} avg {:.2?} p50 {:.2?} p95 {:.2?} p99 {:.2?} max {:.2?}",
            stats.count, stats.min, stats.average, stats.p50, stats.p95, stats.p99, stats.max
        );
        if let Some(total) = stats.estimated_total {
            println!("estimated total with synthesis stage: {total:.2?}");
        }
    } else {
        println!("no frames were delivered");
    }

    engine.stop();
    Ok(())
}

fn load_config(path: &str) -> Result<EngineConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("cannot read config file '{path}'"))?;
    serde_json::from_str(&data).with_context(|| format!("cannot parse config file '{path}'"))
}

fn describe(frame: &ControlFrame) -> String {
    let pitch = match (frame.frequency, frame.note_name.as_deref()) {
        (Some(freq), Some(name)) => format!("{freq:7.1} Hz {name:<4}"),
        (Some(freq), None) => format!("{freq:7.1} Hz     "),
        _ => "     -- Hz     ".to_string(),
    };
    format!(
        "#{:>6} {pitch} conf {:.2} {:>6.1} dB bright {:.2} breath {:.2} {:?}",
        frame.sequence,
        frame.confidence,
        frame.volume_db,
        frame.brightness,
        frame.breathiness,
        frame.articulation
    )
}
