// src/judge/sequence.rs

use rand::Rng;

use crate::config::JudgeConfig;

/// Smallest and largest settable target. Zero fingers is never asked for.
pub const MIN_TARGET: u8 = 1;
pub const MAX_TARGET: u8 = 5;

/// `length` targets drawn uniformly from 1..=5.
pub fn generate_sequence<R: Rng>(rng: &mut R, length: usize) -> Vec<u8> {
    (0..length).map(|_| rng.random_range(MIN_TARGET..=MAX_TARGET)).collect()
}

/// Maps a round number (1-based) to its sequence length and tempo.
#[derive(Clone, Debug, PartialEq)]
pub struct DifficultyCurve {
    pub base_length: usize,
    pub base_bpm: f64,
    pub bpm_step: f64,
    pub max_bpm: f64,
    pub length_step_every: u32,
    pub max_length: usize,
}

impl DifficultyCurve {
    pub fn from_config(cfg: &JudgeConfig) -> Self {
        Self {
            base_length: cfg.base_length.max(1),
            base_bpm: cfg.base_bpm,
            bpm_step: cfg.bpm_step,
            max_bpm: cfg.max_bpm.max(cfg.base_bpm),
            length_step_every: cfg.length_step_every,
            max_length: cfg.max_length.max(cfg.base_length.max(1)),
        }
    }

    /// (length, bpm) for `round`.
    pub fn at(&self, round: u32) -> (usize, f64) {
        let cleared = round.saturating_sub(1);
        let bpm = (self.base_bpm + self.bpm_step * cleared as f64).min(self.max_bpm);
        let extra = if self.length_step_every == 0 { 0 } else { (cleared / self.length_step_every) as usize };
        let length = (self.base_length + extra).min(self.max_length);
        (length, bpm)
    }
}
