// src/gesture/detector.rs

use std::sync::Arc;
use std::time::Duration;

use super::frame::{Frame, SharedFrame};
use super::landmarks::HandLandmarks;
use super::worker::WorkerDetector;
use crate::error::{CoreError, DetectError, Result};

/// Most frames a worker backend may hold before new ones are dropped.
const MAX_IN_FLIGHT: usize = 4;

/// A hand landmark model. Returns at most one hand per frame.
pub trait HandDetector: Send {
    fn name(&self) -> &str;

    /// Load models, acquire delegates. A failure here sends the chain to
    /// the next backend.
    fn init(&mut self) -> std::result::Result<(), DetectError> {
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError>;
}

pub type DetectorFactory = Arc<dyn Fn() -> Box<dyn HandDetector> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Runs on the pipeline thread.
    InProcess,
    /// Runs on a dedicated thread behind a request/response protocol.
    Worker,
}

pub struct BackendSpec {
    pub label: String,
    pub placement: Placement,
    pub factory: DetectorFactory,
}

impl BackendSpec {
    pub fn in_process(label: &str, factory: DetectorFactory) -> Self {
        Self { label: label.to_string(), placement: Placement::InProcess, factory }
    }

    pub fn worker(label: &str, factory: DetectorFactory) -> Self {
        Self { label: label.to_string(), placement: Placement::Worker, factory }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainState {
    Uninit,
    TryNext(usize),
    Ready(usize),
    /// Every backend failed. Terminal.
    Failed,
}

/// A detection result for one frame.
#[derive(Clone, Debug)]
pub struct Detection {
    pub frame_id: u64,
    pub hand: Option<HandLandmarks>,
    pub backend: String,
}

enum Active {
    Inline(Box<dyn HandDetector>),
    Worker(WorkerDetector),
}

/// Ordered list of backends. The first one that initializes is used until
/// it reports a backend failure; then the next one is brought up and the
/// same frame is retried on it.
pub struct DetectorChain {
    specs: Vec<BackendSpec>,
    state: ChainState,
    active: Option<Active>,
    worker_timeout: Duration,
    last_error: String,
    dropped: u64,
}

impl DetectorChain {
    pub fn new(specs: Vec<BackendSpec>, worker_timeout: Duration) -> Self {
        Self {
            specs,
            state: ChainState::Uninit,
            active: None,
            worker_timeout,
            last_error: "no backends configured".to_string(),
            dropped: 0,
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn active_backend(&self) -> Option<&str> {
        match self.state {
            ChainState::Ready(i) => Some(self.specs[i].label.as_str()),
            _ => None,
        }
    }

    /// Bring up a backend if none is active.
    pub fn ensure_ready(&mut self) -> Result<()> {
        loop {
            match self.state {
                ChainState::Ready(_) => return Ok(()),
                ChainState::Failed => return Err(CoreError::BackendsExhausted(self.last_error.clone())),
                ChainState::Uninit => self.state = ChainState::TryNext(0),
                ChainState::TryNext(i) if i >= self.specs.len() => {
                    log::error!("❌ No hand detector backend left: {}", self.last_error);
                    self.state = ChainState::Failed;
                }
                ChainState::TryNext(i) => {
                    let spec = &self.specs[i];
                    let started = match spec.placement {
                        Placement::InProcess => {
                            let mut detector = (spec.factory)();
                            detector.init().map(|_| Active::Inline(detector))
                        }
                        Placement::Worker => {
                            WorkerDetector::spawn(&spec.label, spec.factory.clone(), self.worker_timeout)
                                .map(Active::Worker)
                        }
                    };
                    match started {
                        Ok(active) => {
                            log::info!("✋ Hand detector backend '{}' active", spec.label);
                            self.active = Some(active);
                            self.state = ChainState::Ready(i);
                        }
                        Err(e) => {
                            log::warn!("⚠️ Backend '{}' failed to start: {}", spec.label, e);
                            self.last_error = e.to_string();
                            self.state = ChainState::TryNext(i + 1);
                        }
                    }
                }
            }
        }
    }

    fn fail_over(&mut self, error: &DetectError) {
        if let ChainState::Ready(i) = self.state {
            log::warn!("⚠️ Backend '{}' failed, falling back: {}", self.specs[i].label, error);
            self.last_error = error.to_string();
            self.active = None;
            self.state = ChainState::TryNext(i + 1);
        }
    }

    /// Run (or hand off) detection for `frame`, returning every result that
    /// is available now. Worker results may belong to earlier frames.
    pub fn submit(&mut self, frame: SharedFrame) -> Result<Vec<Detection>> {
        loop {
            self.ensure_ready()?;
            let label = self.active_backend().unwrap_or_default().to_string();

            match self.active.as_mut() {
                Some(Active::Inline(detector)) => match detector.detect(&frame) {
                    Ok(hand) => return Ok(vec![Detection { frame_id: frame.id, hand, backend: label }]),
                    Err(e) if e.is_backend_failure() => self.fail_over(&e),
                    Err(e) => {
                        log::debug!("{}", e);
                        return Ok(vec![Detection { frame_id: frame.id, hand: None, backend: label }]);
                    }
                },
                Some(Active::Worker(worker)) => {
                    if worker.pending_count() >= MAX_IN_FLIGHT {
                        self.dropped += 1;
                        log::debug!("worker '{}' saturated, dropped frame {} ({} so far)", label, frame.id, self.dropped);
                        return self.poll();
                    }
                    match worker.submit(frame.clone()) {
                        Ok(()) => return self.poll(),
                        Err(e) => self.fail_over(&e),
                    }
                }
                None => self.state = ChainState::Uninit,
            }
        }
    }

    /// Results that arrived from a worker backend since the last call.
    pub fn poll(&mut self) -> Result<Vec<Detection>> {
        let label = self.active_backend().unwrap_or_default().to_string();
        let Some(Active::Worker(worker)) = self.active.as_mut() else {
            return Ok(Vec::new());
        };

        let results = match worker.poll() {
            Ok(results) => results,
            Err(e) => {
                // Pending frames are lost; newer frames go to the next backend.
                self.fail_over(&e);
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::with_capacity(results.len());
        let mut backend_error = None;
        for r in results {
            let hand = match r.outcome {
                Ok(hand) => hand,
                Err(e) if e.is_backend_failure() => {
                    backend_error = Some(e);
                    None
                }
                Err(e) => {
                    log::debug!("{}", e);
                    None
                }
            };
            out.push(Detection { frame_id: r.frame_id, hand, backend: label.clone() });
        }
        if let Some(e) = backend_error {
            self.fail_over(&e);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::frame::PixelFormat;
    use crate::sim::{HandPose, synthetic_hand};
    use std::thread;
    use std::time::Instant;

    struct Fixed(&'static str, u8);

    impl HandDetector for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
            Ok(Some(synthetic_hand(&HandPose::showing(self.1))))
        }
    }

    struct NoInit;

    impl HandDetector for NoInit {
        fn name(&self) -> &str {
            "gpu"
        }

        fn init(&mut self) -> std::result::Result<(), DetectError> {
            Err(DetectError::backend("gpu", "no delegate"))
        }

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
            unreachable!()
        }
    }

    struct LosesContext;

    impl HandDetector for LosesContext {
        fn name(&self) -> &str {
            "flaky"
        }

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
            Err(DetectError::backend("flaky", "context lost"))
        }
    }

    struct BadFrames;

    impl HandDetector for BadFrames {
        fn name(&self) -> &str {
            "picky"
        }

        fn detect(&mut self, frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
            Err(DetectError::frame(frame.id, "unsupported stride"))
        }
    }

    /// Good for one frame, then breaks the way `dies` says.
    struct OneShot {
        dies: bool,
        calls: u32,
    }

    impl HandDetector for OneShot {
        fn name(&self) -> &str {
            "one-shot"
        }

        fn detect(&mut self, _frame: &Frame) -> std::result::Result<Option<HandLandmarks>, DetectError> {
            self.calls += 1;
            match (self.calls, self.dies) {
                (1, _) => Ok(Some(synthetic_hand(&HandPose::showing(2)))),
                (_, true) => panic!("detector thread crashed"),
                (_, false) => Err(DetectError::backend("one-shot", "model unloaded")),
            }
        }
    }

    fn factory<D: HandDetector + 'static>(make: impl Fn() -> D + Send + Sync + 'static) -> DetectorFactory {
        Arc::new(move || -> Box<dyn HandDetector> { Box::new(make()) })
    }

    fn frame(id: u64) -> SharedFrame {
        let mut f = Frame::new(2, 2, PixelFormat::Luma8, vec![0; 4]);
        f.id = id;
        Arc::new(f)
    }

    fn timeout() -> Duration {
        Duration::from_millis(500)
    }

    #[test]
    fn init_failure_moves_to_the_next_backend() {
        let mut chain = DetectorChain::new(
            vec![
                BackendSpec::in_process("gpu", factory(|| NoInit)),
                BackendSpec::in_process("cpu", factory(|| Fixed("cpu", 3))),
            ],
            timeout(),
        );
        chain.ensure_ready().unwrap();
        assert_eq!(chain.active_backend(), Some("cpu"));
        assert_eq!(chain.state(), &ChainState::Ready(1));
    }

    #[test]
    fn runtime_failure_retries_the_same_frame_on_the_next_backend() {
        let mut chain = DetectorChain::new(
            vec![
                BackendSpec::in_process("flaky", factory(|| LosesContext)),
                BackendSpec::in_process("cpu", factory(|| Fixed("cpu", 4))),
            ],
            timeout(),
        );
        let out = chain.submit(frame(7)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_id, 7);
        assert_eq!(out[0].backend, "cpu");
        assert!(out[0].hand.is_some());
    }

    #[test]
    fn frame_errors_read_as_no_hand_and_keep_the_backend() {
        let mut chain = DetectorChain::new(vec![BackendSpec::in_process("picky", factory(|| BadFrames))], timeout());
        for id in 1..=3 {
            let out = chain.submit(frame(id)).unwrap();
            assert!(out[0].hand.is_none());
        }
        assert_eq!(chain.active_backend(), Some("picky"));
    }

    #[test]
    fn exhausted_chain_reports_and_stays_failed() {
        let mut chain = DetectorChain::new(
            vec![
                BackendSpec::in_process("gpu", factory(|| NoInit)),
                BackendSpec::worker("gpu-worker", factory(|| NoInit)),
            ],
            timeout(),
        );
        assert!(matches!(chain.submit(frame(1)), Err(CoreError::BackendsExhausted(_))));
        assert_eq!(chain.state(), &ChainState::Failed);
        assert!(matches!(chain.ensure_ready(), Err(CoreError::BackendsExhausted(_))));
    }

    #[test]
    fn worker_backend_results_arrive_through_poll() {
        let mut chain =
            DetectorChain::new(vec![BackendSpec::worker("cpu-worker", factory(|| Fixed("cpu", 2)))], timeout());
        let mut seen = chain.submit(frame(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(3);
        while seen.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            seen = chain.poll().unwrap();
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].frame_id, 1);
        assert_eq!(seen[0].backend, "cpu-worker");
    }

    /// Feed frames 1 and 2 to a worker that breaks on frame 2, then check
    /// that the in-process backend behind it takes over.
    fn worker_failure_falls_back_in_process(dies: bool) {
        let mut chain = DetectorChain::new(
            vec![
                BackendSpec::worker("worker", factory(move || OneShot { dies, calls: 0 })),
                BackendSpec::in_process("cpu", factory(|| Fixed("cpu", 4))),
            ],
            timeout(),
        );

        let mut seen = chain.submit(frame(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(3);
        while seen.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            seen = chain.poll().unwrap();
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].backend, "worker");
        assert!(seen[0].hand.is_some());

        chain.submit(frame(2)).unwrap();
        while chain.state() == &ChainState::Ready(0) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            chain.poll().unwrap();
        }
        assert_eq!(chain.state(), &ChainState::TryNext(1));

        for id in 3..=5 {
            let out = chain.submit(frame(id)).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].frame_id, id);
            assert_eq!(out[0].backend, "cpu");
            assert!(out[0].hand.is_some());
        }
        assert_eq!(chain.state(), &ChainState::Ready(1));
    }

    #[test]
    fn worker_backend_error_falls_back_in_process() {
        worker_failure_falls_back_in_process(false);
    }

    #[test]
    fn dead_worker_thread_falls_back_in_process() {
        worker_failure_falls_back_in_process(true);
    }
}
