// src/audio/mod.rs

pub mod output;
pub mod synth;

pub use output::{AudioOutput, CpalSink, open_output};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// What to play. Waveforms are incidental; only their timing matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundKind {
    /// Downbeat accent.
    Accent,
    Tick,
    Kick,
    Snare,
    HiHat,
    /// Count-in / notification cue.
    Cue,
}

impl SoundKind {
    pub const ALL: [SoundKind; 6] = [
        SoundKind::Accent,
        SoundKind::Tick,
        SoundKind::Kick,
        SoundKind::Snare,
        SoundKind::HiHat,
        SoundKind::Cue,
    ];

    pub fn index(self) -> usize {
        match self {
            SoundKind::Accent => 0,
            SoundKind::Tick => 1,
            SoundKind::Kick => 2,
            SoundKind::Snare => 3,
            SoundKind::HiHat => 4,
            SoundKind::Cue => 5,
        }
    }
}

/// A sound committed to the backend at an absolute device-clock time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledSound {
    pub kind: SoundKind,
    pub at: f64,
}

/// Anything that can play a sound at a future device time.
/// Implementations must accept times in the past and play them immediately.
pub trait AudioSink: Send {
    fn schedule(&mut self, sound: ScheduledSound);

    /// Drop every sound that has been scheduled but not started yet.
    fn cancel_pending(&mut self);

    /// False for sinks that never produce sound.
    fn is_audible(&self) -> bool {
        true
    }
}

/// Used when no output device exists: accepts everything, plays nothing.
#[derive(Default)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn schedule(&mut self, _sound: ScheduledSound) {}

    fn cancel_pending(&mut self) {}

    fn is_audible(&self) -> bool {
        false
    }
}

/// Records every scheduled sound. Lets tests and tools inspect the exact
/// timeline the scheduler produced.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<ScheduledSound>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sounds(&self) -> Vec<ScheduledSound> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl AudioSink for RecordingSink {
    fn schedule(&mut self, sound: ScheduledSound) {
        if let Ok(mut log) = self.log.lock() {
            log.push(sound);
        }
    }

    fn cancel_pending(&mut self) {}
}
