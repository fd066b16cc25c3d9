// src/scheduler/mod.rs

pub mod driver;
pub mod pattern;

pub use driver::{BeatReceiver, SchedulerHandle, spawn_scheduler};
pub use pattern::PatternId;

use serde::Serialize;

use crate::audio::SoundKind;
use crate::clock::TempoMap;
use crate::config::SchedulerConfig;

/// One scheduled beat. Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BeatEvent {
    /// Monotonic beat counter since `start`.
    pub index: u64,
    /// `index` wrapped into the bar.
    pub bar_position: u32,
    pub measure_index: u64,
    /// Absolute device-clock time the beat sounds at.
    pub time: f64,
    pub bpm: f64,
    pub sounds: Vec<SoundKind>,
}

/// A bar start on the beat grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Downbeat {
    pub index: u64,
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Active,
}

/// Lookahead beat scheduler. Pure state: the caller supplies the device time
/// on every tick, so the cadence of ticks never moves a beat.
///
/// Beat times are derived from an anchor (`anchor_index`, `anchor_time`)
/// rather than accumulated, so long sessions do not drift. The anchor only
/// moves when a tempo change lands on a bar boundary.
pub struct BeatScheduler {
    state: SchedulerState,
    lookahead: f64,
    tempo: TempoMap,
    pending_bpm: Option<f64>,
    pattern: PatternId,
    anchor_index: u64,
    anchor_time: f64,
    next_index: u64,
    last_downbeat: Option<Downbeat>,
}

impl BeatScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            state: SchedulerState::Idle,
            lookahead: config.lookahead_secs,
            tempo: TempoMap::new(config.initial_bpm, config.beats_per_bar),
            pending_bpm: None,
            pattern: PatternId::default(),
            anchor_index: 0,
            anchor_time: 0.0,
            next_index: 0,
            last_downbeat: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SchedulerState::Active
    }

    pub fn tempo(&self) -> TempoMap {
        self.tempo
    }

    /// (Re)start the beat grid. Any previous schedule is discarded. Beat 0
    /// lands on `start_time`, or on `now` if none is given.
    pub fn start(&mut self, bpm: f64, pattern: PatternId, start_time: Option<f64>, now: f64) {
        self.tempo = TempoMap::new(bpm, self.tempo.beats_per_bar);
        self.pending_bpm = None;
        self.pattern = pattern;
        self.anchor_index = 0;
        self.anchor_time = start_time.unwrap_or(now);
        self.next_index = 0;
        self.last_downbeat = None;
        self.state = SchedulerState::Active;
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
        self.pending_bpm = None;
        self.last_downbeat = None;
    }

    /// Change tempo for future beats. While active the change waits for the
    /// next bar start; beats already emitted never move.
    pub fn set_bpm(&mut self, bpm: f64) {
        if !(bpm > 0.0) {
            return;
        }
        if self.is_active() {
            self.pending_bpm = Some(bpm);
        } else {
            self.tempo.bpm = bpm;
        }
    }

    pub fn pending_bpm(&self) -> Option<f64> {
        self.pending_bpm
    }

    fn time_of(&self, index: u64) -> f64 {
        self.anchor_time + (index - self.anchor_index) as f64 * self.tempo.seconds_per_beat()
    }

    pub fn next_event_index(&self) -> u64 {
        self.next_index
    }

    /// Emit every beat due before `now + lookahead`, each with its exact
    /// scheduled time.
    pub fn tick(&mut self, now: f64) -> Vec<BeatEvent> {
        let mut events = Vec::new();
        if !self.is_active() {
            return events;
        }

        let horizon = now + self.lookahead;
        loop {
            if self.tempo.is_downbeat(self.next_index) {
                if let Some(bpm) = self.pending_bpm.take() {
                    // downbeat keeps the old period; its bar uses the new one
                    self.anchor_time = self.time_of(self.next_index);
                    self.anchor_index = self.next_index;
                    self.tempo.bpm = bpm;
                }
            }
            let time = self.time_of(self.next_index);
            if time >= horizon {
                break;
            }
            let index = self.next_index;
            let (measure_index, bar_position) = self.tempo.locate(index);
            if bar_position == 0 {
                self.last_downbeat = Some(Downbeat { index, time });
            }
            events.push(BeatEvent {
                index,
                bar_position,
                measure_index,
                time,
                bpm: self.tempo.bpm,
                sounds: self.pattern.sounds_at(bar_position).to_vec(),
            });

            self.next_index += 1;
        }
        events
    }

    /// Next bar start at least `min_delay` seconds after `now`. Accounts for a
    /// tempo change that is queued for the coming bar.
    pub fn next_downbeat(&self, now: f64, min_delay: f64) -> Option<Downbeat> {
        if !self.is_active() {
            return None;
        }
        let target = now + min_delay.max(0.0);

        // A downbeat already committed inside the lookahead can still qualify.
        if let Some(db) = self.last_downbeat {
            if db.time >= target {
                return Some(db);
            }
        }

        let mut index = self.next_index;
        let mut time = self.time_of(index);
        let mut tempo = self.tempo;

        let to_bar = tempo.beats_to_bar_start(index);
        time += to_bar as f64 * tempo.seconds_per_beat();
        index += to_bar;
        if let Some(bpm) = self.pending_bpm {
            tempo.bpm = bpm;
        }

        if time < target {
            let bar_secs = tempo.seconds_per_bar();
            let bars = ((target - time) / bar_secs - 1e-9).ceil().max(0.0) as u64;
            time += bars as f64 * bar_secs;
            index += bars * tempo.beats_per_bar as u64;
            // guard against rounding leaving us a hair short
            if time < target {
                time += bar_secs;
                index += tempo.beats_per_bar as u64;
            }
        }
        Some(Downbeat { index, time })
    }
}
