// src/gesture/motion.rs

use super::frame::Frame;
use crate::config::MotionConfig;

/// Cheap scene-change detector. Compares a tiny luma grid against the
/// previous one at a fixed rate; a still scene lets the pipeline reuse its
/// last snapshot instead of running the detector.
pub struct MotionGate {
    cfg: MotionConfig,
    previous: Option<Vec<f32>>,
    last_check: Option<f64>,
    still_checks: u32,
    skipped: u32,
    last_diff: f32,
}

impl MotionGate {
    pub fn new(cfg: MotionConfig) -> Self {
        Self {
            cfg,
            previous: None,
            last_check: None,
            still_checks: 0,
            skipped: 0,
            last_diff: f32::MAX,
        }
    }

    /// Sample the frame if the check interval has elapsed since the last sample.
    pub fn observe(&mut self, frame: &Frame, now: f64) {
        if !self.cfg.enabled {
            return;
        }
        let interval = self.cfg.check_interval_ms as f64 / 1000.0;
        if let Some(last) = self.last_check {
            if now - last < interval {
                return;
            }
        }
        self.last_check = Some(now);

        let grid = frame.luma_grid(self.cfg.sample_size);
        if let Some(prev) = self.previous.as_ref().filter(|p| p.len() == grid.len()) {
            let sum: f32 = prev.iter().zip(&grid).map(|(a, b)| (a - b).abs()).sum();
            self.last_diff = sum / grid.len().max(1) as f32;
            if self.last_diff < self.cfg.threshold {
                self.still_checks = self.still_checks.saturating_add(1);
            } else {
                self.still_checks = 0;
            }
        }
        self.previous = Some(grid);
    }

    /// Decide whether to skip detection this cycle. Never skips inside a
    /// critical timing window, and never more than `max_skipped` in a row.
    pub fn should_skip(&mut self, critical: bool) -> bool {
        let still = self.cfg.enabled && self.still_checks >= self.cfg.still_checks;
        if critical || !still || self.skipped >= self.cfg.max_skipped {
            self.skipped = 0;
            return false;
        }
        self.skipped += 1;
        true
    }

    pub fn last_diff(&self) -> f32 {
        self.last_diff
    }
}
