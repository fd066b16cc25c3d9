// src/judge/session.rs

use serde::{Deserialize, Serialize};

use super::verdict::Verdict;
use crate::config::RoundMode;
use crate::gesture::SharedFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    Idle,
    Countdown,
    Playing,
    /// Round over, scored locally, about to show the result.
    Transition,
    /// Round over, waiting on the remote judge.
    Analyzing,
    Result,
}

impl RoundStatus {
    /// The only legal edges. `Result` is the single place a round can be
    /// restarted or abandoned from.
    pub fn can_move_to(self, next: RoundStatus) -> bool {
        use RoundStatus::*;
        matches!(
            (self, next),
            (Idle, Countdown)
                | (Countdown, Playing)
                | (Playing, Analyzing)
                | (Playing, Transition)
                | (Analyzing, Result)
                | (Transition, Result)
                | (Result, Playing)
                | (Result, Idle)
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Judgment {
    #[default]
    Pending,
    Hit,
    Miss,
}

/// What happened on one beat of the sequence.
#[derive(Clone, Debug, Default, Serialize)]
pub struct JudgmentRecord {
    pub target: u8,
    pub judgment: Judgment,
    /// Smoothed count read at the beat. `None` if no hand was visible.
    pub detected: Option<u8>,
    pub frame_id: Option<u64>,
    pub beat_time: Option<f64>,
    /// Camera frame behind the reading, kept for review and export.
    #[serde(skip)]
    pub frame: Option<SharedFrame>,
}

impl JudgmentRecord {
    fn pending(target: u8) -> Self {
        Self { target, ..Default::default() }
    }
}

/// State of the round in progress. Only the round judge mutates it.
#[derive(Clone, Debug, Serialize)]
pub struct RoundSession {
    pub mode: RoundMode,
    pub round: u32,
    pub bpm: f64,
    pub status: RoundStatus,
    pub sequence: Vec<u8>,
    pub judgments: Vec<JudgmentRecord>,
    /// Beats of the sequence judged so far.
    pub current_beat: usize,
    /// Scheduler index of the first judged beat, once armed.
    pub first_beat_index: Option<u64>,
    pub first_beat_time: Option<f64>,
    pub verdict: Option<Verdict>,
}

impl RoundSession {
    pub fn idle(mode: RoundMode) -> Self {
        Self {
            mode,
            round: 0,
            bpm: 0.0,
            status: RoundStatus::Idle,
            sequence: Vec::new(),
            judgments: Vec::new(),
            current_beat: 0,
            first_beat_index: None,
            first_beat_time: None,
            verdict: None,
        }
    }

    pub fn new(mode: RoundMode, round: u32, bpm: f64, sequence: Vec<u8>, status: RoundStatus) -> Self {
        let judgments = sequence.iter().map(|t| JudgmentRecord::pending(*t)).collect();
        Self { round, bpm, status, sequence, judgments, ..Self::idle(mode) }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.judgments.iter().filter(|j| j.judgment == Judgment::Hit).count()
    }

    pub fn misses(&self) -> usize {
        self.judgments.iter().filter(|j| j.judgment == Judgment::Miss).count()
    }

    pub fn is_armed(&self) -> bool {
        self.first_beat_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_result_leads_back() {
        use RoundStatus::*;
        let all = [Idle, Countdown, Playing, Transition, Analyzing, Result];
        for from in all {
            for to in [Idle, Playing] {
                let back_edge = matches!((from, to), (Result, _) | (Countdown, Playing));
                assert_eq!(from.can_move_to(to), back_edge, "{from:?} -> {to:?}");
            }
        }
        assert!(!Playing.can_move_to(Result));
        assert!(Idle.can_move_to(Countdown));
    }

    #[test]
    fn new_session_has_one_pending_record_per_target() {
        let s = RoundSession::new(RoundMode::Fixed, 1, 90.0, vec![2, 4, 1], RoundStatus::Countdown);
        assert_eq!(s.judgments.len(), 3);
        assert!(s.judgments.iter().all(|j| j.judgment == Judgment::Pending));
        assert_eq!(s.judgments[1].target, 4);
        assert_eq!(s.hits(), 0);
    }
}
