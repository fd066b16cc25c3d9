// src/sim.rs
//
// Stand-ins for the camera and the landmark model, used by the demo binary
// and the tests. The geometry follows the 21-point hand layout closely
// enough for the finger counter to behave as it does on real detections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{CoreError, DetectError, Result};
use crate::gesture::detector::{BackendSpec, DetectorFactory, HandDetector};
use crate::gesture::frame::{Frame, FrameSource, PixelFormat};
use crate::gesture::landmarks::{HandLandmarks, LANDMARK_COUNT, Landmark};

const NO_HAND: u8 = u8::MAX;

/// A hand pose in the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandPose {
    /// Thumb, index, middle, ring, pinky.
    pub extended: [bool; 5],
    /// In-plane rotation, radians.
    pub angle: f32,
    /// Wrist-to-middle-knuckle length as a fraction of frame height.
    pub scale: f32,
    /// Wrist position in normalized image coordinates.
    pub center: (f32, f32),
    /// Frame width / height of the camera that "saw" this hand.
    pub aspect: f32,
}

impl Default for HandPose {
    fn default() -> Self {
        Self { extended: [true; 5], angle: 0.0, scale: 0.25, center: (0.5, 0.7), aspect: 1.0 }
    }
}

impl HandPose {
    /// The usual way of showing `count` fingers: index first, thumb last.
    pub fn showing(count: u8) -> Self {
        let extended = match count {
            0 => [false, false, false, false, false],
            1 => [false, true, false, false, false],
            2 => [false, true, true, false, false],
            3 => [false, true, true, true, false],
            4 => [false, true, true, true, true],
            _ => [true, true, true, true, true],
        };
        Self { extended, ..Self::default() }
    }
}

// Hand-local layout: wrist at the origin, fingers pointing along +y.
const THUMB_BASE: [(f32, f32); 2] = [(-0.25, 0.25), (-0.45, 0.45)];
const THUMB_OPEN: [(f32, f32); 2] = [(-0.65, 0.65), (-0.9, 0.95)];
const THUMB_TUCKED: [(f32, f32); 2] = [(-0.4, 0.65), (-0.1, 0.7)];
const KNUCKLES: [(f32, f32); 4] = [(-0.3, 1.0), (-0.1, 1.05), (0.1, 1.0), (0.3, 0.9)];
const OPEN_JOINTS: [f32; 3] = [0.4, 0.7, 0.95];
const CURLED_JOINTS: [f32; 3] = [0.3, 0.1, -0.15];

/// Landmarks for `pose`, in normalized image coordinates.
pub fn synthetic_hand(pose: &HandPose) -> HandLandmarks {
    let mut local = [(0.0f32, 0.0f32); LANDMARK_COUNT];

    local[1] = THUMB_BASE[0];
    local[2] = THUMB_BASE[1];
    let thumb = if pose.extended[0] { THUMB_OPEN } else { THUMB_TUCKED };
    local[3] = thumb[0];
    local[4] = thumb[1];

    for (finger, (kx, ky)) in KNUCKLES.iter().enumerate() {
        let base = 5 + finger * 4;
        local[base] = (*kx, *ky);
        let joints = if pose.extended[finger + 1] { OPEN_JOINTS } else { CURLED_JOINTS };
        for (j, dy) in joints.iter().enumerate() {
            local[base + 1 + j] = (*kx, ky + dy);
        }
    }

    let (sin, cos) = pose.angle.sin_cos();
    let aspect = if pose.aspect > 0.0 { pose.aspect } else { 1.0 };
    let mut points = [Landmark::default(); LANDMARK_COUNT];
    for (out, (lx, ly)) in points.iter_mut().zip(local) {
        let rx = lx * cos - ly * sin;
        let ry = lx * sin + ly * cos;
        // image y grows downwards
        *out = Landmark::new(pose.center.0 + rx * pose.scale / aspect, pose.center.1 - ry * pose.scale, 0.0);
    }
    HandLandmarks::new(points)
}

/// What the simulated player is showing right now. Shared between the
/// camera and the detector so both see the same scene.
#[derive(Clone, Debug)]
pub struct PoseControl {
    count: Arc<AtomicU8>,
}

impl PoseControl {
    pub fn new(count: Option<u8>) -> Self {
        let control = Self { count: Arc::new(AtomicU8::new(NO_HAND)) };
        control.set(count);
        control
    }

    /// `None` takes the hand out of view.
    pub fn set(&self, count: Option<u8>) {
        let raw = count.map_or(NO_HAND, |c| c.min(5));
        self.count.store(raw, Ordering::Release);
    }

    pub fn get(&self) -> Option<u8> {
        match self.count.load(Ordering::Acquire) {
            NO_HAND => None,
            c => Some(c),
        }
    }
}

/// Renders the current pose as bright dots on a dark background.
pub struct SyntheticCamera {
    pose: PoseControl,
    width: usize,
    height: usize,
    frame_interval: Duration,
    deny: bool,
    opened: bool,
}

impl SyntheticCamera {
    pub fn new(pose: PoseControl, width: usize, height: usize) -> Self {
        Self { pose, width, height, frame_interval: Duration::ZERO, deny: false, opened: false }
    }

    /// A camera whose permission prompt was declined.
    pub fn denied() -> Self {
        Self { deny: true, ..Self::new(PoseControl::new(None), 1, 1) }
    }

    /// Pace frames like a real device would.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    fn render(&self) -> Frame {
        let mut data = vec![16u8; self.width * self.height];
        if let Some(count) = self.pose.get() {
            let aspect = self.width as f32 / self.height.max(1) as f32;
            let hand = synthetic_hand(&HandPose { aspect, ..HandPose::showing(count) });
            for p in hand.points.iter() {
                let cx = (p.x * self.width as f32) as isize;
                let cy = (p.y * self.height as f32) as isize;
                for y in cy - 1..=cy + 1 {
                    for x in cx - 1..=cx + 1 {
                        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
                            data[y as usize * self.width + x as usize] = 235;
                        }
                    }
                }
            }
        }
        Frame::new(self.width, self.height, PixelFormat::Luma8, data)
    }
}

impl FrameSource for SyntheticCamera {
    fn open(&mut self) -> Result<()> {
        if self.deny {
            return Err(CoreError::CameraUnavailable("permission denied".into()));
        }
        self.opened = true;
        log::info!("📷 Synthetic camera {}x{}", self.width, self.height);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Err(CoreError::CameraUnavailable("camera not opened".into()));
        }
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        Ok(Some(self.render()))
    }
}

/// Reports whatever pose the [`PoseControl`] holds, as a landmark model would.
pub struct SimulatedDetector {
    label: String,
    pose: PoseControl,
    aspect: f32,
}

impl SimulatedDetector {
    pub fn new(label: &str, pose: PoseControl, aspect: f32) -> Self {
        Self { label: label.to_string(), pose, aspect }
    }
}

impl HandDetector for SimulatedDetector {
    fn name(&self) -> &str {
        &self.label
    }

    fn detect(&mut self, frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
        if !frame.is_valid() {
            return Err(DetectError::frame(frame.id, "empty frame"));
        }
        let aspect = if frame.height > 0 { frame.aspect_ratio() } else { self.aspect };
        Ok(self.pose.get().map(|count| synthetic_hand(&HandPose { aspect, ..HandPose::showing(count) })))
    }
}

/// A backend that can never start, e.g. a GPU delegate on a machine without one.
pub struct UnavailableDetector {
    label: String,
    reason: String,
}

impl UnavailableDetector {
    pub fn new(label: &str, reason: &str) -> Self {
        Self { label: label.to_string(), reason: reason.to_string() }
    }
}

impl HandDetector for UnavailableDetector {
    fn name(&self) -> &str {
        &self.label
    }

    fn init(&mut self) -> std::result::Result<(), DetectError> {
        Err(DetectError::backend(&self.label, self.reason.clone()))
    }

    fn detect(&mut self, _frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
        Err(DetectError::backend(&self.label, self.reason.clone()))
    }
}

fn simulated(label: &'static str, pose: &PoseControl, aspect: f32) -> DetectorFactory {
    let pose = pose.clone();
    Arc::new(move || -> Box<dyn HandDetector> { Box::new(SimulatedDetector::new(label, pose.clone(), aspect)) })
}

/// The standard fallback order: accelerated, software, software on a
/// worker thread, software inline.
pub fn default_chain(pose: &PoseControl, aspect: f32) -> Vec<BackendSpec> {
    vec![
        BackendSpec::in_process(
            "accelerated",
            Arc::new(|| -> Box<dyn HandDetector> {
                Box::new(UnavailableDetector::new("accelerated", "no GPU delegate"))
            }),
        ),
        BackendSpec::in_process("software", simulated("software", pose, aspect)),
        BackendSpec::worker("software-worker", simulated("software-worker", pose, aspect)),
        BackendSpec::in_process("software-inline", simulated("software-inline", pose, aspect)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerThresholds;
    use crate::gesture::fingers::count_fingers;

    #[test]
    fn detector_follows_the_pose_control() {
        let pose = PoseControl::new(Some(2));
        let mut camera = SyntheticCamera::new(pose.clone(), 32, 24);
        camera.open().unwrap();
        let mut detector = SimulatedDetector::new("sim", pose.clone(), 4.0 / 3.0);

        let frame = camera.next_frame().unwrap().unwrap();
        let hand = detector.detect(&frame).unwrap().unwrap();
        assert_eq!(count_fingers(&hand, frame.aspect_ratio(), &FingerThresholds::default()), 2);

        pose.set(None);
        let frame = camera.next_frame().unwrap().unwrap();
        assert!(detector.detect(&frame).unwrap().is_none());
    }

    #[test]
    fn different_poses_render_different_frames() {
        let pose = PoseControl::new(Some(0));
        let camera = SyntheticCamera::new(pose.clone(), 64, 48);
        let fist = camera.render();
        pose.set(Some(5));
        let open = camera.render();
        assert_ne!(fist.data, open.data);
    }

    #[test]
    fn unopened_camera_refuses_frames() {
        let mut camera = SyntheticCamera::new(PoseControl::new(None), 8, 8);
        assert!(matches!(camera.next_frame(), Err(CoreError::CameraUnavailable(_))));
    }
}
