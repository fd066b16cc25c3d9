// src/scheduler/pattern.rs

use serde::{Deserialize, Serialize};

use crate::audio::SoundKind;

/// Backing patterns the scheduler can play. Looked up by position in the bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatternId {
    /// Metronome: accent on the downbeat, ticks elsewhere.
    #[default]
    Click,
    /// Kick on odd beats, snare on even beats, hat on top.
    Backbeat,
    /// Kick on every beat.
    Pulse,
}

impl PatternId {
    /// Sounds to trigger on `bar_position` (0 = downbeat).
    pub fn sounds_at(self, bar_position: u32) -> &'static [SoundKind] {
        use SoundKind::*;
        match (self, bar_position) {
            (PatternId::Click, 0) => &[Accent],
            (PatternId::Click, _) => &[Tick],
            (PatternId::Backbeat, 0) => &[Kick, HiHat, Accent],
            (PatternId::Backbeat, p) if p % 2 == 1 => &[Snare, HiHat],
            (PatternId::Backbeat, _) => &[Kick, HiHat],
            (PatternId::Pulse, 0) => &[Kick, Accent],
            (PatternId::Pulse, _) => &[Kick],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_accents_the_downbeat() {
        for p in [PatternId::Click, PatternId::Backbeat, PatternId::Pulse] {
            assert!(p.sounds_at(0).contains(&SoundKind::Accent));
        }
    }

    #[test]
    fn backbeat_alternates_kick_and_snare() {
        assert!(PatternId::Backbeat.sounds_at(1).contains(&SoundKind::Snare));
        assert!(PatternId::Backbeat.sounds_at(2).contains(&SoundKind::Kick));
        assert!(PatternId::Backbeat.sounds_at(3).contains(&SoundKind::Snare));
    }
}
