// src/gesture/fingers.rs

use super::landmarks::*;
use crate::config::FingerThresholds;

/// Squared distance in the image plane, with x stretched by the frame's
/// aspect ratio so that distances are isotropic.
fn dist2(a: Landmark, b: Landmark, aspect: f32) -> f32 {
    let dx = (a.x - b.x) * aspect;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Whether each digit is extended, thumb first.
///
/// Every test is a ratio of two squared distances taken from the same hand,
/// so the result does not depend on hand size, distance to the camera or
/// in-plane rotation. Every detector backend goes through this function.
pub fn extended_fingers(hand: &HandLandmarks, aspect: f32, th: &FingerThresholds) -> [bool; 5] {
    let p = |i: usize| hand.get(i);
    let d2 = |a: usize, b: usize| dist2(p(a), p(b), aspect);

    // A tucked thumb can sit far from the pinky edge yet close to the index
    // knuckle, so all three conditions must hold.
    let thumb = d2(THUMB_TIP, PINKY_MCP) > th.thumb_edge * d2(THUMB_IP, PINKY_MCP)
        && d2(THUMB_TIP, WRIST) > th.thumb_wrist * d2(THUMB_IP, WRIST)
        && d2(THUMB_TIP, INDEX_MCP) > th.thumb_index * d2(THUMB_IP, INDEX_MCP);

    let mut out = [thumb, false, false, false, false];
    for (slot, (mcp, tip)) in FINGERS.iter().enumerate() {
        out[slot + 1] = d2(*tip, WRIST) > th.finger * d2(*mcp, WRIST);
    }
    out
}

/// Number of raised fingers, 0..=5.
pub fn count_fingers(hand: &HandLandmarks, aspect: f32, th: &FingerThresholds) -> u8 {
    extended_fingers(hand, aspect, th).iter().filter(|e| **e).count() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{HandPose, synthetic_hand};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn th() -> FingerThresholds {
        FingerThresholds::default()
    }

    #[test]
    fn canonical_poses_count_correctly() {
        for count in 0..=5u8 {
            let hand = synthetic_hand(&HandPose::showing(count));
            assert_eq!(count_fingers(&hand, 1.0, &th()), count, "pose {count}");
        }
    }

    #[test]
    fn tucked_thumb_is_not_counted() {
        let pose = HandPose { extended: [false, true, true, false, false], ..HandPose::default() };
        let hand = synthetic_hand(&pose);
        assert_eq!(extended_fingers(&hand, 1.0, &th()), [false, true, true, false, false]);
    }

    #[test]
    fn count_is_invariant_under_scale_and_rotation() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..300 {
            let mut extended = [false; 5];
            for e in extended.iter_mut() {
                *e = rng.random_bool(0.5);
            }
            let expected = extended.iter().filter(|e| **e).count() as u8;
            let pose = HandPose {
                extended,
                angle: rng.random_range(-std::f32::consts::PI..std::f32::consts::PI),
                scale: rng.random_range(0.05..0.6),
                center: (rng.random_range(0.3..0.7), rng.random_range(0.3..0.7)),
                aspect: 1.0,
            };
            let hand = synthetic_hand(&pose);
            assert_eq!(count_fingers(&hand, 1.0, &th()), expected, "{pose:?}");
        }
    }

    #[test]
    fn aspect_ratio_is_undone_before_measuring() {
        let pose = HandPose { angle: 0.9, aspect: 16.0 / 9.0, ..HandPose::showing(3) };
        let hand = synthetic_hand(&pose);
        assert_eq!(count_fingers(&hand, 16.0 / 9.0, &th()), 3);
    }
}
