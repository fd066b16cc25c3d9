// src/gesture/policy.rs

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::config::{SamplingConfig, SmootherConfig};

/// Slack after a beat's scheduled time during which the window stays critical.
const POST_BEAT_SLACK: f64 = 0.05;

/// What the game is doing, as far as detection cost is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GamePhase {
    Idle,
    Countdown,
    Playing,
    /// Round over, waiting for a verdict or the player.
    Review,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhaseState {
    pub phase: GamePhase,
    /// Device time of the next judged beat, if one is scheduled.
    pub next_beat: Option<f64>,
    pub bpm: f64,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self { phase: GamePhase::Idle, next_beat: None, bpm: 0.0 }
    }
}

impl PhaseState {
    /// Inside the window right before (or just after) a judged beat.
    pub fn is_critical(&self, now: f64, cfg: &SamplingConfig) -> bool {
        if self.phase != GamePhase::Playing {
            return false;
        }
        let window = cfg.pre_beat_window_ms as f64 / 1000.0;
        self.next_beat.is_some_and(|t| {
            let until = t - now;
            until <= window && until >= -POST_BEAT_SLACK
        })
    }
}

/// Shared, game-owned description of the current phase. The pipeline reads
/// it every cycle; the game writes it on transitions and after each beat.
#[derive(Clone, Default)]
pub struct PhaseCell {
    inner: Arc<Mutex<PhaseState>>,
}

impl PhaseCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> PhaseState {
        match self.inner.lock() {
            Ok(s) => *s,
            Err(_) => PhaseState::default(),
        }
    }

    pub fn set_phase(&self, phase: GamePhase) {
        if let Ok(mut s) = self.inner.lock() {
            s.phase = phase;
            if phase != GamePhase::Playing {
                s.next_beat = None;
            }
        }
    }

    pub fn set_next_beat(&self, next_beat: Option<f64>, bpm: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.next_beat = next_beat;
            s.bpm = bpm;
        }
    }

    pub fn set(&self, state: PhaseState) {
        if let Ok(mut s) = self.inner.lock() {
            *s = state;
        }
    }
}

/// Minimum seconds between two full detections for the current phase.
/// Evaluated every cycle.
pub fn min_detection_interval(state: &PhaseState, now: f64, cfg: &SamplingConfig) -> f64 {
    let ms = if state.is_critical(now, cfg) {
        cfg.imminent_interval_ms
    } else {
        match state.phase {
            GamePhase::Playing => cfg.playing_interval_ms,
            GamePhase::Countdown => cfg.countdown_interval_ms,
            GamePhase::Idle | GamePhase::Review => cfg.idle_interval_ms,
        }
    };
    ms as f64 / 1000.0
}

/// History length for the mode filter: short at high tempo for latency,
/// longer when slow or idle for stability.
pub fn smoothing_window(state: &PhaseState, cfg: &SmootherConfig) -> usize {
    let window = match state.phase {
        GamePhase::Playing | GamePhase::Countdown => {
            if state.bpm >= cfg.fast_bpm {
                cfg.fast_window
            } else if state.bpm >= cfg.mid_bpm {
                cfg.mid_window
            } else {
                cfg.slow_window
            }
        }
        GamePhase::Idle | GamePhase::Review => cfg.idle_window,
    };
    window.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(next_beat: f64, bpm: f64) -> PhaseState {
        PhaseState { phase: GamePhase::Playing, next_beat: Some(next_beat), bpm }
    }

    #[test]
    fn interval_tightens_as_the_beat_approaches() {
        let cfg = SamplingConfig::default();
        let s = playing(10.0, 100.0);
        assert_eq!(min_detection_interval(&s, 9.0, &cfg), 0.05);
        assert_eq!(min_detection_interval(&s, 9.8, &cfg), 0.016);
        assert_eq!(min_detection_interval(&s, 10.02, &cfg), 0.016);
        assert_eq!(min_detection_interval(&s, 10.2, &cfg), 0.05);
    }

    #[test]
    fn idle_is_loosest_and_countdown_in_between() {
        let cfg = SamplingConfig::default();
        let idle = PhaseState::default();
        let countdown = PhaseState { phase: GamePhase::Countdown, ..idle };
        assert_eq!(min_detection_interval(&idle, 0.0, &cfg), 0.25);
        assert_eq!(min_detection_interval(&countdown, 0.0, &cfg), 0.1);
    }

    #[test]
    fn smoothing_shrinks_with_tempo() {
        let cfg = SmootherConfig::default();
        assert_eq!(smoothing_window(&playing(0.0, 170.0), &cfg), 1);
        assert_eq!(smoothing_window(&playing(0.0, 120.0), &cfg), 3);
        assert_eq!(smoothing_window(&playing(0.0, 80.0), &cfg), 5);
        assert_eq!(smoothing_window(&PhaseState::default(), &cfg), 5);
    }

    #[test]
    fn leaving_play_clears_the_next_beat() {
        let cell = PhaseCell::new();
        cell.set(playing(3.0, 100.0));
        cell.set_phase(GamePhase::Review);
        assert_eq!(cell.get().next_beat, None);
        assert!(!cell.get().is_critical(2.9, &SamplingConfig::default()));
    }
}
