// src/game.rs

use std::sync::Arc;

use crate::audio::{ScheduledSound, SoundKind};
use crate::clock::SharedClock;
use crate::config::{GameConfig, RoundMode};
use crate::error::{CoreError, Result};
use crate::gesture::{GamePhase, PhaseCell, PhaseState, SnapshotReader};
use crate::judge::{
    BeatOutcome, Judgment, RemoteJudge, RoundJudge, RoundSession, RoundStatus, RoundSummary, Verdict, VerdictSource,
    resolve_verdict,
};
use crate::scheduler::{BeatReceiver, PatternId, SchedulerHandle};

/// Gap between asking the scheduler to start and its first beat.
const START_LEAD: f64 = 0.05;

#[derive(Clone, Debug)]
pub enum GameEvent {
    Countdown { beats_left: u64 },
    Beat { position: usize, target: u8, detected: Option<u8>, judgment: Judgment },
    /// Round over, the remote judge is looking at it.
    Analyzing,
    /// The remote judge failed; the verdict that follows is the local one.
    Degraded { reason: String },
    Verdict { verdict: Verdict, summary: RoundSummary },
    NextRound { round: u32, bpm: f64 },
}

/// Drives rounds from the scheduler's due beats and the pipeline's latest
/// snapshot. Call [`update`](Self::update) from the main loop.
pub struct Game {
    cfg: GameConfig,
    scheduler: SchedulerHandle,
    beats: BeatReceiver,
    snapshots: SnapshotReader,
    phase: PhaseCell,
    clock: SharedClock,
    judge: RoundJudge,
    pattern: PatternId,
    remote: Option<Arc<dyn RemoteJudge>>,
    runtime: Option<tokio::runtime::Runtime>,
    pending: Option<tokio::task::JoinHandle<Verdict>>,
}

impl Game {
    pub fn new(
        cfg: GameConfig,
        (scheduler, beats): (SchedulerHandle, BeatReceiver),
        snapshots: SnapshotReader,
        phase: PhaseCell,
        clock: SharedClock,
        seed: u64,
    ) -> Self {
        let judge = RoundJudge::new(cfg.judge.clone(), seed);
        Self {
            cfg,
            scheduler,
            beats,
            snapshots,
            phase,
            clock,
            judge,
            pattern: PatternId::default(),
            remote: None,
            runtime: None,
            pending: None,
        }
    }

    /// Consult `remote` for every finished round. It runs on a small
    /// background runtime so the game loop never waits on the network.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteJudge>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("remote-judge")
            .enable_all()
            .build()?;
        self.runtime = Some(runtime);
        self.remote = Some(remote);
        self.judge.set_remote_enabled(true);
        Ok(self)
    }

    pub fn with_pattern(mut self, pattern: PatternId) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn session(&self) -> &RoundSession {
        self.judge.session()
    }

    pub fn status(&self) -> RoundStatus {
        self.judge.status()
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn snapshots(&self) -> &SnapshotReader {
        &self.snapshots
    }

    /// Idle -> Countdown. The first judged beat lands on a bar start at least
    /// `countdown_beats` beats away.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(None)
    }

    /// Start with a given target sequence instead of a random one.
    pub fn start_with(&mut self, sequence: Option<Vec<u8>>) -> Result<()> {
        self.judge.begin_countdown_with(sequence)?;
        self.launch_round()
    }

    pub fn replay(&mut self) -> Result<()> {
        self.judge.replay()?;
        self.launch_round()
    }

    pub fn next_round(&mut self) -> Result<()> {
        self.judge.next_round()?;
        self.launch_round()
    }

    /// Result -> Idle.
    pub fn exit(&mut self) -> Result<()> {
        self.judge.exit()?;
        self.scheduler.stop();
        self.phase.set_phase(GamePhase::Idle);
        Ok(())
    }

    fn launch_round(&mut self) -> Result<()> {
        let bpm = self.judge.session().bpm;
        let period = 60.0 / bpm;
        let start_time = self.clock.now() + START_LEAD;

        self.phase.set(PhaseState { phase: GamePhase::Countdown, next_beat: None, bpm });
        self.scheduler.start(bpm, self.pattern, Some(start_time));

        let count_in = self.cfg.judge.countdown_beats as f64 * period;
        let downbeat = self
            .scheduler
            .next_downbeat(count_in)
            .ok_or_else(|| CoreError::invalid_state("scheduler did not start"))?;
        self.judge.arm(downbeat)?;

        for k in 1..=self.cfg.judge.countdown_beats {
            let at = downbeat.time - k as f64 * period;
            if at >= start_time - 1e-9 {
                self.scheduler.play_at(ScheduledSound { kind: SoundKind::Cue, at });
            }
        }

        log::info!(
            "🎬 Round {} armed: {} beats at {:.0} BPM, first judged beat {} at {:.3}s",
            self.judge.session().round,
            self.judge.session().len(),
            bpm,
            downbeat.index,
            downbeat.time
        );
        Ok(())
    }

    /// Judge every beat that came due since the last call and pick up a
    /// finished remote verdict.
    pub fn update(&mut self) -> Result<Vec<GameEvent>> {
        let mut events = Vec::new();

        for notice in self.beats.drain() {
            let snapshot = self.snapshots.latest();
            match self.judge.on_beat(&notice, &snapshot)? {
                BeatOutcome::Ignored => {}
                BeatOutcome::CountIn { beats_left } => {
                    if beats_left == 1 {
                        let next_beat = self.judge.session().first_beat_time;
                        self.phase.set(PhaseState { phase: GamePhase::Playing, next_beat, bpm: notice.bpm });
                    }
                    events.push(GameEvent::Countdown { beats_left });
                }
                BeatOutcome::Judged { position, target, detected, judgment, round_over } => {
                    events.push(GameEvent::Beat { position, target, detected, judgment });
                    if round_over {
                        // anything left in this batch belongs to the finished round
                        self.end_round(&mut events)?;
                        break;
                    }
                    let next_beat = notice.scheduled_time + 60.0 / notice.bpm;
                    self.phase.set(PhaseState { phase: GamePhase::Playing, next_beat: Some(next_beat), bpm: notice.bpm });
                }
            }
        }

        self.poll_verdict(&mut events)?;
        Ok(events)
    }

    fn end_round(&mut self, events: &mut Vec<GameEvent>) -> Result<()> {
        self.scheduler.stop();
        self.phase.set_phase(GamePhase::Review);

        if self.judge.status() == RoundStatus::Analyzing {
            if let (Some(runtime), Some(remote)) = (self.runtime.as_ref(), self.remote.as_ref()) {
                let remote = remote.clone();
                let session = self.judge.session().clone();
                let cfg = self.cfg.judge.clone();
                self.pending =
                    Some(runtime.spawn(async move { resolve_verdict(Some(remote.as_ref()), &session, &cfg).await }));
                events.push(GameEvent::Analyzing);
                return Ok(());
            }
        }

        let verdict = self.judge.local_verdict();
        self.after_verdict(verdict, events)
    }

    fn poll_verdict(&mut self, events: &mut Vec<GameEvent>) -> Result<()> {
        if !self.pending.as_ref().is_some_and(|h| h.is_finished()) {
            return Ok(());
        }
        let (Some(handle), Some(runtime)) = (self.pending.take(), self.runtime.as_ref()) else {
            return Ok(());
        };
        let verdict = match runtime.block_on(handle) {
            Ok(verdict) => verdict,
            Err(e) => self.judge.local_verdict().degraded(format!("remote task failed: {e}")),
        };
        self.after_verdict(verdict, events)
    }

    fn after_verdict(&mut self, verdict: Verdict, events: &mut Vec<GameEvent>) -> Result<()> {
        self.judge.apply_verdict(verdict.clone())?;
        if let VerdictSource::LocalFallback { reason } = &verdict.source {
            events.push(GameEvent::Degraded { reason: reason.clone() });
        }
        log::info!("🏁 Round {} verdict: score {} ({})", self.judge.session().round, verdict.score, verdict.feedback);
        let success = verdict.success;
        events.push(GameEvent::Verdict { verdict, summary: self.judge.summary() });

        if self.cfg.judge.mode == RoundMode::Escalating && success {
            self.next_round()?;
            let session = self.judge.session();
            events.push(GameEvent::NextRound { round: session.round, bpm: session.bpm });
        }
        Ok(())
    }
}
