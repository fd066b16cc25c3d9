// src/gesture/worker.rs

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use super::detector::DetectorFactory;
use super::frame::SharedFrame;
use super::landmarks::HandLandmarks;
use crate::error::DetectError;

/// How long to wait for the worker to report its own init.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

struct Request {
    id: u64,
    frame: SharedFrame,
}

struct Reply {
    id: u64,
    result: Result<Option<HandLandmarks>, DetectError>,
}

/// One resolved request. A timed-out request resolves to `Ok(None)`.
#[derive(Debug)]
pub struct WorkerResult {
    pub frame_id: u64,
    pub outcome: Result<Option<HandLandmarks>, DetectError>,
    pub timed_out: bool,
}

/// A detector backend living on its own thread.
///
/// Frames go over as `Arc`s (the pixels are never copied) tagged with their
/// frame id. Replies are matched back by id; anything still pending after
/// `timeout` resolves to "no hand" and its id is forgotten, so a late reply
/// is dropped instead of overwriting a newer result.
pub struct WorkerDetector {
    label: String,
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    pending: HashMap<u64, Instant>,
    timeout: Duration,
    timeouts: u64,
    stale: u64,
}

impl WorkerDetector {
    /// Starts the thread and waits for the backend's init result.
    pub fn spawn(label: &str, factory: DetectorFactory, timeout: Duration) -> Result<Self, DetectError> {
        let (req_tx, req_rx) = unbounded::<Request>();
        let (reply_tx, reply_rx) = unbounded::<Reply>();
        let (ready_tx, ready_rx) = bounded::<Result<(), DetectError>>(1);

        thread::Builder::new()
            .name(format!("detector-{label}"))
            .spawn(move || {
                let mut detector = factory();
                let init = detector.init();
                let ok = init.is_ok();
                let _ = ready_tx.send(init);
                if !ok {
                    return;
                }
                // Ends once the owning WorkerDetector drops its sender.
                for req in req_rx.iter() {
                    let result = detector.detect(&req.frame);
                    if reply_tx.send(Reply { id: req.id, result }).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| DetectError::backend(label, format!("could not start worker: {e}")))?;

        match ready_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(DetectError::backend(label, "worker never finished init")),
        }

        log::info!("🧵 Detector worker '{}' ready (timeout {} ms)", label, timeout.as_millis());
        Ok(Self {
            label: label.to_string(),
            requests: req_tx,
            replies: reply_rx,
            pending: HashMap::new(),
            timeout,
            timeouts: 0,
            stale: 0,
        })
    }

    /// Hand the frame over to the worker.
    pub fn submit(&mut self, frame: SharedFrame) -> Result<(), DetectError> {
        let id = frame.id;
        self.requests
            .send(Request { id, frame })
            .map_err(|_| DetectError::backend(&self.label, "worker thread is gone"))?;
        self.pending.insert(id, Instant::now() + self.timeout);
        Ok(())
    }

    /// Collect replies and expire overdue requests, oldest frame first.
    /// `Err` means the worker itself died.
    pub fn poll(&mut self) -> Result<Vec<WorkerResult>, DetectError> {
        let mut out = Vec::new();
        loop {
            match self.replies.try_recv() {
                Ok(reply) => {
                    if self.pending.remove(&reply.id).is_some() {
                        out.push(WorkerResult { frame_id: reply.id, outcome: reply.result, timed_out: false });
                    } else {
                        self.stale += 1;
                        log::debug!("Dropping late reply for frame {} from '{}'", reply.id, self.label);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.pending.clear();
                    return Err(DetectError::backend(&self.label, "worker thread exited"));
                }
            }
        }

        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.pending.remove(&id);
            self.timeouts += 1;
            log::warn!("⏱️ Frame {} timed out on '{}'", id, self.label);
            out.push(WorkerResult { frame_id: id, outcome: Ok(None), timed_out: true });
        }

        out.sort_by_key(|r| r.frame_id);
        Ok(out)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn stale_replies(&self) -> u64 {
        self.stale
    }
}
