// tests/worker_offload.rs

use crossbeam_channel::{Receiver, bounded};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use handbeat_core::clock::ManualClock;
use handbeat_core::config::GestureConfig;
use handbeat_core::error::DetectError;
use handbeat_core::gesture::{
    BackendSpec, CycleOutcome, DetectorChain, DetectorFactory, Frame, FrameSource, GesturePipeline, HandDetector,
    HandLandmarks, PhaseCell,
};
use handbeat_core::sim::{HandPose, PoseControl, SyntheticCamera, synthetic_hand};

/// Hangs on the first frame it sees until the test lets it go.
struct HangsOnce {
    release: Arc<Mutex<Receiver<()>>>,
    seen: bool,
}

impl HandDetector for HangsOnce {
    fn name(&self) -> &str {
        "hangs-once"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Option<HandLandmarks>, DetectError> {
        if !self.seen {
            self.seen = true;
            let _ = self.release.lock().unwrap().recv();
        }
        Ok(Some(synthetic_hand(&HandPose { aspect: 4.0 / 3.0, ..HandPose::showing(3) })))
    }
}

#[test]
fn wedged_worker_resolves_to_no_hand_and_later_frames_still_land() {
    let (release_tx, release_rx) = bounded::<()>(1);
    let release = Arc::new(Mutex::new(release_rx));
    let factory: DetectorFactory = Arc::new(move || -> Box<dyn HandDetector> {
        Box::new(HangsOnce { release: release.clone(), seen: false })
    });

    let clock = ManualClock::new(0.0);
    let chain = DetectorChain::new(vec![BackendSpec::worker("slow-worker", factory)], Duration::from_millis(300));
    let mut pipeline = GesturePipeline::new(GestureConfig::default(), chain, PhaseCell::new(), Arc::new(clock.clone()));
    let reader = pipeline.reader();

    let mut camera = SyntheticCamera::new(PoseControl::new(Some(3)), 64, 48);
    camera.open().unwrap();

    // the hung request must not hold up the pipeline thread
    let started = Instant::now();
    let out = pipeline.process_frame(camera.next_frame().unwrap().unwrap()).unwrap();
    assert_eq!(out, CycleOutcome::Submitted { published: 0 });
    assert!(started.elapsed() < Duration::from_millis(100));

    thread::sleep(Duration::from_millis(400));
    clock.advance(0.3);
    let out = pipeline.process_frame(camera.next_frame().unwrap().unwrap()).unwrap();
    assert_eq!(out, CycleOutcome::Submitted { published: 1 });
    let snap = reader.latest();
    assert_eq!(snap.frame_id, 1);
    assert_eq!(snap.raw_count, None);

    release_tx.send(()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while reader.latest().frame_id < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
        pipeline.collect().unwrap();
    }
    let snap = reader.latest();
    assert_eq!(snap.frame_id, 2);
    assert_eq!(snap.raw_count, Some(3));
    assert_eq!(snap.backend.as_deref(), Some("slow-worker"));
}
