// src/judge/verdict.rs

use serde::{Deserialize, Serialize};

use super::session::{Judgment, RoundSession, RoundStatus};
use crate::config::RoundMode;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VerdictSource {
    Local,
    Remote,
    /// The remote judge was asked but failed; this is the local tally.
    LocalFallback { reason: String },
}

/// Final word on a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    /// 0..=100
    pub score: u32,
    pub per_beat: Vec<bool>,
    pub feedback: String,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, VerdictSource::LocalFallback { .. })
    }

    /// Same tally, marked as a fallback.
    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.source = VerdictSource::LocalFallback { reason: reason.into() };
        self
    }
}

/// round(100 * hits / length)
pub fn score(hits: usize, length: usize) -> u32 {
    if length == 0 {
        return 0;
    }
    (100.0 * hits as f64 / length as f64).round() as u32
}

/// Score the round from the judge's own hit/miss records.
///
/// Fixed mode succeeds when the hit ratio is strictly above `success_ratio`.
/// Escalating mode only accepts a perfect run.
pub fn local_verdict(session: &RoundSession, mode: RoundMode, success_ratio: f64) -> Verdict {
    let length = session.len();
    let hits = session.hits();
    let per_beat: Vec<bool> = session.judgments.iter().map(|j| j.judgment == Judgment::Hit).collect();

    let success = match mode {
        RoundMode::Fixed => length > 0 && hits as f64 / length as f64 > success_ratio,
        RoundMode::Escalating => length > 0 && hits == length,
    };

    let feedback = match mode {
        RoundMode::Fixed => format!("{hits}/{length} on the beat"),
        RoundMode::Escalating => match session.judgments.iter().position(|j| j.judgment == Judgment::Miss) {
            Some(i) => format!("missed beat {} of {}", i + 1, length),
            None => format!("perfect round {}", session.round),
        },
    };

    Verdict { success, score: score(hits, length), per_beat, feedback, source: VerdictSource::Local }
}

/// One beat of a finished round, for export and review screens.
#[derive(Clone, Debug, Serialize)]
pub struct BeatSummary {
    pub position: usize,
    pub target: u8,
    pub detected: Option<u8>,
    pub judgment: Judgment,
    pub frame_id: Option<u64>,
    pub beat_time: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub bpm: f64,
    pub mode: RoundMode,
    pub status: RoundStatus,
    pub beats: Vec<BeatSummary>,
    pub verdict: Option<Verdict>,
}

impl RoundSummary {
    pub fn from_session(session: &RoundSession) -> Self {
        let beats = session
            .judgments
            .iter()
            .enumerate()
            .map(|(position, j)| BeatSummary {
                position,
                target: j.target,
                detected: j.detected,
                judgment: j.judgment,
                frame_id: j.frame_id,
                beat_time: j.beat_time,
            })
            .collect();
        Self {
            round: session.round,
            bpm: session.bpm,
            mode: session.mode,
            status: session.status,
            beats,
            verdict: session.verdict.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(marks: &[Judgment]) -> RoundSession {
        let mut s = RoundSession::new(RoundMode::Fixed, 1, 90.0, vec![1; marks.len()], RoundStatus::Playing);
        for (rec, mark) in s.judgments.iter_mut().zip(marks) {
            rec.judgment = *mark;
        }
        s
    }

    #[test]
    fn fixed_mode_needs_more_than_sixty_percent() {
        use Judgment::*;
        let three_of_five = session(&[Hit, Hit, Hit, Miss, Miss]);
        let v = local_verdict(&three_of_five, RoundMode::Fixed, 0.6);
        assert_eq!(v.score, 60);
        assert!(!v.success);

        let four_of_five = session(&[Hit, Hit, Hit, Hit, Miss]);
        assert!(local_verdict(&four_of_five, RoundMode::Fixed, 0.6).success);
    }

    #[test]
    fn escalating_mode_needs_a_perfect_run() {
        use Judgment::*;
        let v = local_verdict(&session(&[Hit, Miss, Pending]), RoundMode::Escalating, 0.6);
        assert!(!v.success);
        assert_eq!(v.per_beat, vec![true, false, false]);
        assert_eq!(v.feedback, "missed beat 2 of 3");
        assert!(local_verdict(&session(&[Hit, Hit]), RoundMode::Escalating, 0.6).success);
    }

    #[test]
    fn summary_serializes_without_frames() {
        let s = session(&[Judgment::Hit]);
        let json = RoundSummary::from_session(&s).to_json().unwrap();
        assert!(json.contains("\"judgment\": \"Hit\""));
        assert!(!json.contains("frame\""));
    }
}
