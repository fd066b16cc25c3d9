// src/clock/mod.rs

pub mod tempo;

pub use tempo::TempoMap;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// The clock that scheduled times are expressed in. For real audio this is
/// the output device's own sample counter, never wall-clock time.
pub trait DeviceClock: Send + Sync {
    /// Seconds since the clock started.
    fn now(&self) -> f64;
}

pub type SharedClock = Arc<dyn DeviceClock>;

/// Lock-free sample counter advanced by the audio callback.
/// The audio thread writes, everybody else reads.
#[derive(Clone)]
pub struct SampleClock {
    samples: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    /// Called once per output block by the audio callback.
    pub fn advance(&self, frames: u64) {
        self.samples.fetch_add(frames, Ordering::AcqRel);
    }

    /// Absolute device time -> absolute frame index.
    pub fn frame_at(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl DeviceClock for SampleClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Free-running clock used when no audio device exists. Game timing keeps
/// working, it just is not tied to any sound.
#[derive(Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for tests and offline simulation.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { bits: Arc::new(AtomicU64::new(start.to_bits())) }
    }

    pub fn set(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, secs: f64) {
        let now = self.now();
        self.set(now + secs);
    }
}

impl DeviceClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
