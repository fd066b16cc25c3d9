// src/clock/tempo.rs

use serde::{Deserialize, Serialize};

/// Relates device seconds to musical beats and bars.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    pub bpm: f64,
    pub beats_per_bar: u32,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self { bpm: 120.0, beats_per_bar: 4 }
    }
}

impl TempoMap {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Self {
        Self {
            bpm: if bpm > 0.0 { bpm } else { 120.0 },
            beats_per_bar: beats_per_bar.max(1),
        }
    }

    /// Seconds per beat (e.g., 120 BPM -> 0.5s)
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Seconds per bar (e.g., 4/4 @ 120 BPM -> 2.0s)
    pub fn seconds_per_bar(&self) -> f64 {
        self.seconds_per_beat() * self.beats_per_bar as f64
    }

    /// Position of a beat index inside the bar grid: (measure, beat_in_bar).
    /// Both are 0-indexed.
    pub fn locate(&self, beat_index: u64) -> (u64, u32) {
        let bar = self.beats_per_bar as u64;
        (beat_index / bar, (beat_index % bar) as u32)
    }

    pub fn is_downbeat(&self, beat_index: u64) -> bool {
        beat_index % self.beats_per_bar as u64 == 0
    }

    /// Beats between `beat_index` and the next bar start strictly after it,
    /// or 0 if `beat_index` already is a bar start.
    pub fn beats_to_bar_start(&self, beat_index: u64) -> u64 {
        let bar = self.beats_per_bar as u64;
        (bar - beat_index % bar) % bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_follow_bpm() {
        let map = TempoMap::new(150.0, 4);
        assert!((map.seconds_per_beat() - 0.4).abs() < 1e-12);
        assert!((map.seconds_per_bar() - 1.6).abs() < 1e-12);
    }

    #[test]
    fn locate_wraps_into_bar() {
        let map = TempoMap::new(120.0, 3);
        assert_eq!(map.locate(7), (2, 1));
        assert!(map.is_downbeat(6));
        assert_eq!(map.beats_to_bar_start(7), 2);
        assert_eq!(map.beats_to_bar_start(6), 0);
    }
}
