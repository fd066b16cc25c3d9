// src/gesture/pipeline.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::detector::{Detection, DetectorChain};
use super::fingers::count_fingers;
use super::frame::{Frame, FrameSource, SharedFrame};
use super::motion::MotionGate;
use super::policy::{PhaseCell, PhaseState, min_detection_interval, smoothing_window};
use super::smoother::ModeSmoother;
use super::snapshot::{GestureSnapshot, SnapshotReader, SnapshotWriter, snapshot_cell};
use crate::clock::SharedClock;
use crate::config::GestureConfig;
use crate::error::{CoreError, Result};

/// Frames kept around so late worker results can be paired with their pixels.
const RECENT_FRAMES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Frame was malformed; treated as a dropped frame.
    Dropped,
    /// Too soon after the last detection for the current phase.
    Throttled,
    /// Scene is still; the last snapshot stands.
    MotionSkipped,
    /// Frame went to the detector. `published` counts snapshots written
    /// this cycle, including late worker results.
    Submitted { published: usize },
}

/// Capture → motion gate → detector chain → finger count → smoother → snapshot.
///
/// Owns the only [`SnapshotWriter`]. Reads the game phase every cycle to
/// decide how much detection work to do.
pub struct GesturePipeline {
    cfg: GestureConfig,
    chain: DetectorChain,
    phase: PhaseCell,
    clock: SharedClock,
    writer: SnapshotWriter,
    gate: MotionGate,
    smoother: ModeSmoother<Option<u8>>,
    recent: VecDeque<SharedFrame>,
    next_frame_id: u64,
    last_detection: Option<f64>,
    last_published: u64,
}

impl GesturePipeline {
    pub fn new(cfg: GestureConfig, chain: DetectorChain, phase: PhaseCell, clock: SharedClock) -> Self {
        let (writer, _) = snapshot_cell();
        let window = smoothing_window(&phase.get(), &cfg.smoother);
        Self {
            gate: MotionGate::new(cfg.motion.clone()),
            smoother: ModeSmoother::new(window),
            cfg,
            chain,
            phase,
            clock,
            writer,
            recent: VecDeque::with_capacity(RECENT_FRAMES),
            next_frame_id: 0,
            last_detection: None,
            last_published: 0,
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        self.writer.reader()
    }

    pub fn active_backend(&self) -> Option<&str> {
        self.chain.active_backend()
    }

    /// Run one pipeline cycle for a freshly captured frame.
    pub fn process_frame(&mut self, mut frame: Frame) -> Result<CycleOutcome> {
        let now = self.clock.now();
        let state = self.phase.get();
        let mut published = self.collect_with(&state, now)?;

        if !frame.is_valid() {
            log::debug!("Dropping malformed {}x{} frame", frame.width, frame.height);
            return Ok(CycleOutcome::Dropped);
        }

        self.next_frame_id += 1;
        frame.id = self.next_frame_id;
        frame.timestamp = now;
        let frame = Arc::new(frame);

        self.gate.observe(&frame, now);

        let interval = min_detection_interval(&state, now, &self.cfg.sampling);
        if let Some(last) = self.last_detection {
            if now - last < interval {
                return Ok(CycleOutcome::Throttled);
            }
        }

        let critical = state.is_critical(now, &self.cfg.sampling);
        if self.gate.should_skip(critical) {
            return Ok(CycleOutcome::MotionSkipped);
        }

        if self.recent.len() == RECENT_FRAMES {
            self.recent.pop_front();
        }
        self.recent.push_back(frame.clone());
        self.last_detection = Some(now);

        let detections = self.chain.submit(frame)?;
        published += self.publish_all(detections, &state, now);
        Ok(CycleOutcome::Submitted { published })
    }

    /// Publish any worker results that arrived. Returns how many were published.
    pub fn collect(&mut self) -> Result<usize> {
        let state = self.phase.get();
        let now = self.clock.now();
        self.collect_with(&state, now)
    }

    fn collect_with(&mut self, state: &PhaseState, now: f64) -> Result<usize> {
        let detections = self.chain.poll()?;
        Ok(self.publish_all(detections, state, now))
    }

    fn publish_all(&mut self, detections: Vec<Detection>, state: &PhaseState, now: f64) -> usize {
        let mut published = 0;
        for detection in detections {
            if self.publish(detection, state, now) {
                published += 1;
            }
        }
        published
    }

    fn publish(&mut self, detection: Detection, state: &PhaseState, now: f64) -> bool {
        // Results can come back out of order; never replace a newer frame.
        if detection.frame_id <= self.last_published {
            return false;
        }

        let frame = self.recent.iter().find(|f| f.id == detection.frame_id).cloned();
        let aspect = frame.as_ref().map_or(self.cfg.aspect_ratio, |f| f.aspect_ratio());
        let raw_count = detection.hand.as_ref().map(|h| count_fingers(h, aspect, &self.cfg.thresholds));

        self.smoother.set_window(smoothing_window(state, &self.cfg.smoother));
        let smoothed_count = self.smoother.push(raw_count);

        self.writer.publish(GestureSnapshot {
            frame_id: detection.frame_id,
            timestamp: frame.as_ref().map_or(now, |f| f.timestamp),
            landmarks: detection.hand,
            raw_count,
            smoothed_count,
            backend: Some(detection.backend),
            frame,
        });
        self.last_published = detection.frame_id;
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Running,
    Stopped,
    Failed(String),
}

/// Owner of the capture thread. Dropping it stops the pipeline.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<PipelineStatus>>,
    join: Option<JoinHandle<()>>,
    reader: SnapshotReader,
}

impl PipelineHandle {
    pub fn snapshots(&self) -> SnapshotReader {
        self.reader.clone()
    }

    pub fn status(&self) -> PipelineStatus {
        match self.status.lock() {
            Ok(s) => s.clone(),
            Err(_) => PipelineStatus::Failed("status lock poisoned".into()),
        }
    }

    /// Idempotent. Detector workers still busy with a frame exit on their own
    /// once they notice nobody is listening.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
            log::info!("🛑 Gesture pipeline stopped");
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_status(status: &Mutex<PipelineStatus>, value: PipelineStatus) {
    if let Ok(mut s) = status.lock() {
        *s = value;
    }
}

/// Open the camera and run the pipeline on its own thread. Camera failure is
/// reported here, before any thread is started.
pub fn spawn_pipeline(mut pipeline: GesturePipeline, mut source: Box<dyn FrameSource>) -> Result<PipelineHandle> {
    source.open().map_err(|e| match e {
        CoreError::CameraUnavailable(_) => e,
        other => CoreError::CameraUnavailable(other.to_string()),
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    let status = Arc::new(Mutex::new(PipelineStatus::Running));
    let reader = pipeline.reader();

    let stop_flag = stop.clone();
    let thread_status = status.clone();
    let join = thread::Builder::new().name("gesture-pipeline".into()).spawn(move || {
        log::info!("📷 Gesture pipeline running");
        while !stop_flag.load(Ordering::Acquire) {
            let cycle = match source.next_frame() {
                Ok(Some(frame)) => pipeline.process_frame(frame).map(|_| ()),
                Ok(None) => pipeline.collect().map(|_| ()),
                Err(e) => {
                    log::error!("❌ Camera lost: {}", e);
                    set_status(&thread_status, PipelineStatus::Failed(e.to_string()));
                    return;
                }
            };
            if let Err(e) = cycle {
                log::error!("❌ Gesture pipeline halted: {}", e);
                set_status(&thread_status, PipelineStatus::Failed(e.to_string()));
                return;
            }
        }
        set_status(&thread_status, PipelineStatus::Stopped);
    })?;

    Ok(PipelineHandle { stop, status, join: Some(join), reader })
}
