// src/judge/mod.rs

pub mod remote;
pub mod sequence;
pub mod session;
pub mod verdict;

pub use remote::{HttpVisionJudge, RemoteJudge, RemoteRequest, RemoteVerdict, resolve_verdict};
pub use sequence::{DifficultyCurve, generate_sequence};
pub use session::{Judgment, JudgmentRecord, RoundSession, RoundStatus};
pub use verdict::{RoundSummary, Verdict, VerdictSource, local_verdict};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{JudgeConfig, RoundMode};
use crate::error::{CoreError, Result};
use crate::gesture::GestureSnapshot;
use crate::scheduler::Downbeat;
use crate::scheduler::driver::BeatNotice;

/// What a beat meant for the round.
#[derive(Clone, Debug, PartialEq)]
pub enum BeatOutcome {
    /// Not part of a round (not playing, not armed, or already over).
    Ignored,
    /// Count-in beat before the first judged one.
    CountIn { beats_left: u64 },
    Judged {
        /// Position in the sequence.
        position: usize,
        target: u8,
        detected: Option<u8>,
        judgment: Judgment,
        /// This beat ended the round.
        round_over: bool,
    },
}

/// Owns the round session and moves it through its states. Runs on the
/// caller's thread and never blocks.
pub struct RoundJudge {
    cfg: JudgeConfig,
    curve: DifficultyCurve,
    rng: StdRng,
    session: RoundSession,
    remote_enabled: bool,
}

impl RoundJudge {
    pub fn new(cfg: JudgeConfig, seed: u64) -> Self {
        Self {
            curve: DifficultyCurve::from_config(&cfg),
            rng: StdRng::seed_from_u64(seed),
            session: RoundSession::idle(cfg.mode),
            remote_enabled: false,
            cfg,
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.cfg
    }

    pub fn session(&self) -> &RoundSession {
        &self.session
    }

    pub fn status(&self) -> RoundStatus {
        self.session.status
    }

    /// Rounds finishing while enabled go to `Analyzing` instead of `Transition`.
    pub fn set_remote_enabled(&mut self, enabled: bool) {
        self.remote_enabled = enabled;
    }

    fn move_to(&mut self, next: RoundStatus) -> Result<()> {
        let from = self.session.status;
        if !from.can_move_to(next) {
            return Err(CoreError::invalid_state(format!("{from:?} -> {next:?}")));
        }
        log::info!("🎯 Round {}: {:?} -> {:?}", self.session.round, from, next);
        self.session.status = next;
        Ok(())
    }

    fn difficulty(&self, round: u32) -> (usize, f64) {
        match self.cfg.mode {
            RoundMode::Escalating => self.curve.at(round),
            RoundMode::Fixed => self.curve.at(1),
        }
    }

    fn fresh_session(&mut self, round: u32, sequence: Option<Vec<u8>>) {
        let (length, bpm) = self.difficulty(round);
        let sequence = sequence.unwrap_or_else(|| generate_sequence(&mut self.rng, length));
        let status = self.session.status;
        self.session = RoundSession::new(self.cfg.mode, round, bpm, sequence, status);
    }

    /// Idle -> Countdown with a fresh round 1.
    pub fn begin_countdown(&mut self) -> Result<()> {
        self.begin_countdown_with(None)
    }

    /// Like [`begin_countdown`](Self::begin_countdown) but with a given target sequence.
    pub fn begin_countdown_with(&mut self, sequence: Option<Vec<u8>>) -> Result<()> {
        self.move_to(RoundStatus::Countdown)?;
        self.fresh_session(1, sequence);
        Ok(())
    }

    /// Pin the first judged beat to `downbeat`. Beats before it are count-in.
    pub fn arm(&mut self, downbeat: Downbeat) -> Result<()> {
        let armable = matches!(self.session.status, RoundStatus::Countdown | RoundStatus::Playing);
        if !armable || self.session.is_armed() {
            return Err(CoreError::invalid_state(format!("cannot arm while {:?}", self.session.status)));
        }
        self.session.first_beat_index = Some(downbeat.index);
        self.session.first_beat_time = Some(downbeat.time);
        Ok(())
    }

    /// Judge a due beat against the snapshot current at that instant.
    pub fn on_beat(&mut self, beat: &BeatNotice, snapshot: &GestureSnapshot) -> Result<BeatOutcome> {
        let status = self.session.status;
        if !matches!(status, RoundStatus::Countdown | RoundStatus::Playing) {
            return Ok(BeatOutcome::Ignored);
        }
        let Some(first) = self.session.first_beat_index else {
            return Ok(BeatOutcome::Ignored);
        };
        if beat.index < first {
            return Ok(BeatOutcome::CountIn { beats_left: first - beat.index });
        }

        let position = (beat.index - first) as usize;
        let len = self.session.len();
        if position < self.session.current_beat || self.session.current_beat >= len {
            // a beat we already judged, or the round is complete
            return Ok(BeatOutcome::Ignored);
        }
        if status == RoundStatus::Countdown {
            self.move_to(RoundStatus::Playing)?;
        }

        // Notices that never arrived still count, as misses, so the round
        // cannot stall waiting for them.
        let period = 60.0 / beat.bpm;
        while self.session.current_beat < position.min(len) {
            let lost = self.session.current_beat;
            log::warn!("⚠️ Beat {} of round {} was never delivered, counted as a miss", lost, self.session.round);
            let at = beat.scheduled_time - (position - lost) as f64 * period;
            let outcome = self.record(lost, None, at)?;
            if matches!(outcome, BeatOutcome::Judged { round_over: true, .. }) {
                return Ok(outcome);
            }
        }

        self.record(position, Some(snapshot), beat.scheduled_time)
    }

    /// Judge one position of the sequence. `None` means nothing was seen.
    fn record(&mut self, position: usize, snapshot: Option<&GestureSnapshot>, beat_time: f64) -> Result<BeatOutcome> {
        let record = &mut self.session.judgments[position];
        let detected = snapshot.and_then(|s| s.smoothed_count);
        let judgment = if detected == Some(record.target) { Judgment::Hit } else { Judgment::Miss };
        record.judgment = judgment;
        record.detected = detected;
        record.frame_id = snapshot.and_then(|s| (s.frame_id > 0).then_some(s.frame_id));
        record.frame = snapshot.and_then(|s| s.frame.clone());
        record.beat_time = Some(beat_time);
        let target = record.target;
        self.session.current_beat = position + 1;

        log::debug!("beat {} target {} saw {:?}: {:?}", position, target, detected, judgment);

        let failed_run = self.cfg.mode == RoundMode::Escalating && judgment == Judgment::Miss;
        let round_over = failed_run || self.session.current_beat == self.session.len();
        if round_over {
            let next = if self.remote_enabled { RoundStatus::Analyzing } else { RoundStatus::Transition };
            self.move_to(next)?;
        }

        Ok(BeatOutcome::Judged { position, target, detected, judgment, round_over })
    }

    /// The verdict from this judge's own records.
    pub fn local_verdict(&self) -> Verdict {
        local_verdict(&self.session, self.cfg.mode, self.cfg.success_ratio)
    }

    /// Analyzing/Transition -> Result with `verdict`.
    pub fn apply_verdict(&mut self, verdict: Verdict) -> Result<()> {
        self.move_to(RoundStatus::Result)?;
        self.session.verdict = Some(verdict);
        Ok(())
    }

    /// Score locally and move to Result.
    pub fn finish_local(&mut self) -> Result<Verdict> {
        let verdict = self.local_verdict();
        self.apply_verdict(verdict.clone())?;
        Ok(verdict)
    }

    /// Result -> Playing with a fresh sequence. In escalating mode a failed
    /// run starts over from round 1. Call [`arm`](Self::arm) next.
    pub fn replay(&mut self) -> Result<()> {
        self.move_to(RoundStatus::Playing)?;
        let round = match self.cfg.mode {
            RoundMode::Escalating if !self.last_succeeded() => 1,
            _ => self.session.round.max(1),
        };
        self.fresh_session(round, None);
        Ok(())
    }

    /// Result -> Playing one round further. Escalating mode only allows this
    /// after a perfect run.
    pub fn next_round(&mut self) -> Result<()> {
        if self.cfg.mode == RoundMode::Escalating && !self.last_succeeded() {
            return Err(CoreError::invalid_state("escalating run failed; replay instead"));
        }
        self.move_to(RoundStatus::Playing)?;
        let round = self.session.round + 1;
        self.fresh_session(round, None);
        Ok(())
    }

    /// Result -> Idle. The session is dropped.
    pub fn exit(&mut self) -> Result<()> {
        self.move_to(RoundStatus::Idle)?;
        self.session = RoundSession::idle(self.cfg.mode);
        Ok(())
    }

    fn last_succeeded(&self) -> bool {
        self.session.verdict.as_ref().is_some_and(|v| v.success)
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary::from_session(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(index: u64) -> BeatNotice {
        BeatNotice {
            index,
            bar_position: (index % 4) as u32,
            measure_index: index / 4,
            scheduled_time: index as f64 * 0.5,
            bpm: 120.0,
            generation: 1,
        }
    }

    fn showing(count: Option<u8>, frame_id: u64) -> GestureSnapshot {
        GestureSnapshot { frame_id, smoothed_count: count, raw_count: count, ..Default::default() }
    }

    fn armed(mode: RoundMode, sequence: Vec<u8>) -> RoundJudge {
        let mut judge = RoundJudge::new(JudgeConfig { mode, ..JudgeConfig::default() }, 1);
        judge.begin_countdown_with(Some(sequence)).unwrap();
        judge.arm(Downbeat { index: 4, time: 2.0 }).unwrap();
        judge
    }

    #[test]
    fn count_in_beats_are_not_judged() {
        let mut judge = armed(RoundMode::Fixed, vec![2, 4, 1]);
        assert_eq!(judge.on_beat(&beat(1), &showing(Some(2), 1)).unwrap(), BeatOutcome::CountIn { beats_left: 3 });
        assert_eq!(judge.status(), RoundStatus::Countdown);
        judge.on_beat(&beat(4), &showing(Some(2), 2)).unwrap();
        assert_eq!(judge.status(), RoundStatus::Playing);
    }

    #[test]
    fn hit_needs_an_exact_match() {
        let mut judge = armed(RoundMode::Fixed, vec![2, 4, 1]);
        let out = judge.on_beat(&beat(4), &showing(Some(3), 9)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { judgment: Judgment::Miss, detected: Some(3), .. }));
        let out = judge.on_beat(&beat(5), &showing(None, 10)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { judgment: Judgment::Miss, detected: None, .. }));
        assert_eq!(judge.session().judgments[0].frame_id, Some(9));
    }

    #[test]
    fn judgments_are_never_revised() {
        let mut judge = armed(RoundMode::Fixed, vec![2, 4, 1]);
        judge.on_beat(&beat(4), &showing(Some(2), 1)).unwrap();
        // same beat delivered again with a different pose
        assert_eq!(judge.on_beat(&beat(4), &showing(Some(5), 2)).unwrap(), BeatOutcome::Ignored);
        assert_eq!(judge.session().judgments[0].judgment, Judgment::Hit);
    }

    #[test]
    fn a_beat_that_never_arrived_counts_as_a_miss() {
        let mut judge = armed(RoundMode::Fixed, vec![2, 4, 1]);
        judge.on_beat(&beat(4), &showing(Some(2), 1)).unwrap();
        // beat 5 is lost; beat 6 still gets judged
        let out = judge.on_beat(&beat(6), &showing(Some(1), 3)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { position: 2, judgment: Judgment::Hit, round_over: true, .. }));

        let lost = &judge.session().judgments[1];
        assert_eq!((lost.judgment, lost.detected, lost.frame_id), (Judgment::Miss, None, None));
        assert_eq!(lost.beat_time, Some(2.5));
        assert_eq!(judge.status(), RoundStatus::Transition);
    }

    #[test]
    fn losing_the_last_beats_still_ends_the_round() {
        let mut judge = armed(RoundMode::Fixed, vec![2, 4, 1]);
        judge.on_beat(&beat(4), &showing(Some(2), 1)).unwrap();
        let out = judge.on_beat(&beat(9), &showing(Some(1), 2)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { position: 2, judgment: Judgment::Miss, round_over: true, .. }));
        assert_eq!(judge.status(), RoundStatus::Transition);
        assert_eq!(judge.finish_local().unwrap().score, 33);
    }

    #[test]
    fn escalating_run_ends_on_a_lost_beat() {
        let mut judge = armed(RoundMode::Escalating, vec![2, 4, 1]);
        judge.on_beat(&beat(4), &showing(Some(2), 1)).unwrap();
        let out = judge.on_beat(&beat(6), &showing(Some(1), 3)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { position: 1, judgment: Judgment::Miss, round_over: true, .. }));
        assert_eq!(judge.session().judgments[2].judgment, Judgment::Pending);
    }

    #[test]
    fn finished_round_goes_through_transition_to_result() {
        let mut judge = armed(RoundMode::Fixed, vec![1]);
        let out = judge.on_beat(&beat(4), &showing(Some(1), 1)).unwrap();
        assert!(matches!(out, BeatOutcome::Judged { round_over: true, .. }));
        assert_eq!(judge.status(), RoundStatus::Transition);
        let v = judge.finish_local().unwrap();
        assert_eq!((v.success, v.score), (true, 100));
        assert_eq!(judge.status(), RoundStatus::Result);
    }

    #[test]
    fn remote_rounds_wait_in_analyzing() {
        let mut judge = RoundJudge::new(JudgeConfig::default(), 3);
        judge.set_remote_enabled(true);
        judge.begin_countdown_with(Some(vec![3])).unwrap();
        judge.arm(Downbeat { index: 0, time: 0.0 }).unwrap();
        judge.on_beat(&beat(0), &showing(Some(3), 1)).unwrap();
        assert_eq!(judge.status(), RoundStatus::Analyzing);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut judge = RoundJudge::new(JudgeConfig::default(), 3);
        assert!(matches!(judge.replay(), Err(CoreError::InvalidState(_))));
        assert!(matches!(judge.exit(), Err(CoreError::InvalidState(_))));
        judge.begin_countdown().unwrap();
        assert!(judge.begin_countdown().is_err());
        assert!(judge.apply_verdict(judge.local_verdict()).is_err());
    }

    #[test]
    fn escalating_success_speeds_up_and_failure_restarts() {
        let mut judge = armed(RoundMode::Escalating, vec![2]);
        judge.on_beat(&beat(4), &showing(Some(2), 1)).unwrap();
        judge.finish_local().unwrap();
        judge.next_round().unwrap();
        assert_eq!(judge.session().round, 2);
        assert_eq!(judge.session().bpm, 100.0);
        assert!(!judge.session().is_armed());

        judge.arm(Downbeat { index: 8, time: 4.0 }).unwrap();
        let first = judge.session().sequence[0];
        let wrong = if first == 5 { 1 } else { first + 1 };
        judge.on_beat(&beat(8), &showing(Some(wrong), 2)).unwrap();
        judge.finish_local().unwrap();
        assert!(judge.next_round().is_err());
        judge.replay().unwrap();
        assert_eq!(judge.session().round, 1);
    }

    #[test]
    fn exit_returns_to_idle() {
        let mut judge = armed(RoundMode::Fixed, vec![1]);
        judge.on_beat(&beat(4), &showing(Some(1), 1)).unwrap();
        judge.finish_local().unwrap();
        judge.exit().unwrap();
        assert_eq!(judge.status(), RoundStatus::Idle);
        assert!(judge.session().sequence.is_empty());
    }
}
