// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::Result;

/// Everything tunable about a game, persisted as pretty JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct GameConfig {
    pub scheduler: SchedulerConfig,
    pub gesture: GestureConfig,
    pub judge: JudgeConfig,
}

impl GameConfig {
    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: GameConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        use crate::error::CoreError;

        if self.scheduler.beats_per_bar == 0 {
            return Err(CoreError::Config("beats_per_bar must be at least 1".into()));
        }
        if !(self.scheduler.initial_bpm > 0.0) || !(self.judge.base_bpm > 0.0) {
            return Err(CoreError::Config("tempo must be positive".into()));
        }
        if self.scheduler.lookahead_secs <= 0.0 {
            return Err(CoreError::Config("lookahead must be positive".into()));
        }
        if self.judge.base_length == 0 {
            return Err(CoreError::Config("round length must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Horizon within which events are committed to the audio sink.
    pub lookahead_secs: f64,
    /// Nominal period of the driver thread. Jitter here must not move beats.
    pub tick_interval_ms: u64,
    pub beats_per_bar: u32,
    pub initial_bpm: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.1,
            tick_interval_ms: 25,
            beats_per_bar: 4,
            initial_bpm: 100.0,
        }
    }
}

/// Squared-distance ratios used by the finger counter. Empirically tuned;
/// keep them here so they can be adjusted without touching the geometry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FingerThresholds {
    /// Thumb tip vs. pinky knuckle, relative to the thumb IP joint.
    pub thumb_edge: f32,
    /// Fingertip vs. wrist, relative to the finger's knuckle.
    pub finger: f32,
    /// Thumb tip vs. index knuckle, relative to the thumb IP joint.
    pub thumb_index: f32,
    /// Thumb tip vs. wrist, relative to the thumb IP joint.
    pub thumb_wrist: f32,
}

impl Default for FingerThresholds {
    fn default() -> Self {
        Self {
            thumb_edge: 1.3225,
            finger: 1.8225,
            thumb_index: 0.7,
            thumb_wrist: 1.1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    /// How long before a scheduled beat the pipeline switches to full rate.
    pub pre_beat_window_ms: u64,
    pub imminent_interval_ms: u64,
    pub playing_interval_ms: u64,
    pub countdown_interval_ms: u64,
    pub idle_interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            pre_beat_window_ms: 300,
            imminent_interval_ms: 16,
            playing_interval_ms: 50,
            countdown_interval_ms: 100,
            idle_interval_ms: 250,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MotionConfig {
    pub enabled: bool,
    pub check_interval_ms: u64,
    /// Mean absolute luma difference (0..255) below which a sample counts as still.
    pub threshold: f32,
    /// Consecutive still checks before detection may be skipped.
    pub still_checks: u32,
    /// Hard cap on consecutive skipped detections.
    pub max_skipped: u32,
    /// Edge length of the downscaled luma grid.
    pub sample_size: usize,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 16,
            threshold: 2.0,
            still_checks: 3,
            max_skipped: 8,
            sample_size: 16,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SmootherConfig {
    /// Window used outside of play.
    pub idle_window: usize,
    /// At or above this tempo smoothing is disabled.
    pub fast_bpm: f64,
    /// At or above this tempo the short window is used.
    pub mid_bpm: f64,
    pub fast_window: usize,
    pub mid_window: usize,
    pub slow_window: usize,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            idle_window: 5,
            fast_bpm: 150.0,
            mid_bpm: 110.0,
            fast_window: 1,
            mid_window: 3,
            slow_window: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GestureConfig {
    pub thresholds: FingerThresholds,
    /// Frame width / height; x coordinates are stretched by this before measuring.
    pub aspect_ratio: f32,
    pub sampling: SamplingConfig,
    pub motion: MotionConfig,
    pub smoother: SmootherConfig,
    pub worker_timeout_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            thresholds: FingerThresholds::default(),
            aspect_ratio: 4.0 / 3.0,
            sampling: SamplingConfig::default(),
            motion: MotionConfig::default(),
            smoother: SmootherConfig::default(),
            worker_timeout_ms: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    /// Partial credit; success above the ratio threshold.
    #[default]
    Fixed,
    /// First miss ends the run; a perfect round speeds things up.
    Escalating,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JudgeConfig {
    pub mode: RoundMode,
    pub success_ratio: f64,
    pub base_length: usize,
    pub base_bpm: f64,
    pub bpm_step: f64,
    pub max_bpm: f64,
    /// Escalating mode adds one beat to the sequence every N cleared rounds.
    pub length_step_every: u32,
    pub max_length: usize,
    pub countdown_beats: u32,
    pub remote_timeout_ms: u64,
    pub remote_url: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            mode: RoundMode::Fixed,
            success_ratio: 0.6,
            base_length: 4,
            base_bpm: 90.0,
            bpm_step: 10.0,
            max_bpm: 160.0,
            length_step_every: 2,
            max_length: 8,
            countdown_beats: 4,
            remote_timeout_ms: 8000,
            remote_url: None,
        }
    }
}
