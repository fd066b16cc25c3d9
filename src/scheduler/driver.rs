// src/scheduler/driver.rs

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{BeatScheduler, Downbeat, PatternId};
use crate::audio::{AudioSink, ScheduledSound};
use crate::clock::SharedClock;
use crate::config::SchedulerConfig;

/// Capacity of the due-beat channel. A reader that falls this far behind
/// loses the oldest notices rather than stalling the timer thread.
const NOTICE_CAPACITY: usize = 64;

/// Fired once per beat when the device clock reaches its scheduled time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BeatNotice {
    pub index: u64,
    pub bar_position: u32,
    pub measure_index: u64,
    pub scheduled_time: f64,
    pub bpm: f64,
    /// Which `start` produced this beat.
    pub generation: u64,
}

pub type BeatObserver = Box<dyn FnMut(&BeatNotice) + Send>;

enum Command {
    Start { bpm: f64, pattern: PatternId, start_time: Option<f64>, generation: u64 },
    Stop,
    SetBpm(f64),
    NextDownbeat { min_delay: f64, reply: Sender<Option<Downbeat>> },
    Play(ScheduledSound),
    Observe(BeatObserver),
    Shutdown,
}

/// Control side of the scheduler thread. Cheap to share by reference; all
/// state lives on the timer thread.
pub struct SchedulerHandle {
    commands: Sender<Command>,
    generation: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

/// Receives due beats, skipping any left over from an earlier `start`.
#[derive(Clone)]
pub struct BeatReceiver {
    rx: Receiver<BeatNotice>,
    generation: Arc<AtomicU64>,
}

impl BeatReceiver {
    fn is_current(&self, notice: &BeatNotice) -> bool {
        notice.generation == self.generation.load(Ordering::Acquire)
    }

    /// Every current notice that is already waiting.
    pub fn drain(&self) -> Vec<BeatNotice> {
        self.rx.try_iter().filter(|n| self.is_current(n)).collect()
    }

    /// Block until the next current notice or the timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BeatNotice> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(n) if self.is_current(&n) => return Some(n),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Spawn the lookahead driver on its own thread so a busy render/UI thread
/// cannot starve it.
pub fn spawn_scheduler(
    config: &SchedulerConfig,
    clock: SharedClock,
    sink: Box<dyn AudioSink>,
) -> (SchedulerHandle, BeatReceiver) {
    let (cmd_tx, cmd_rx) = unbounded();
    let (notice_tx, notice_rx) = bounded(NOTICE_CAPACITY);
    let generation = Arc::new(AtomicU64::new(0));

    let driver = Driver {
        scheduler: BeatScheduler::new(config),
        clock,
        sink,
        tick: Duration::from_millis(config.tick_interval_ms.max(1)),
        due: VecDeque::new(),
        generation: 0,
        notices: notice_tx,
        overflow: notice_rx.clone(),
        observers: Vec::new(),
    };

    let join = thread::Builder::new()
        .name("beat-scheduler".into())
        .spawn(move || driver.run(cmd_rx))
        .ok();
    if join.is_none() {
        log::error!("❌ Could not spawn scheduler thread; beats will not fire");
    }

    let handle = SchedulerHandle { commands: cmd_tx, generation: generation.clone(), join };
    (handle, BeatReceiver { rx: notice_rx, generation })
}

impl SchedulerHandle {
    /// Start or restart the beat grid. Beats from any previous start are
    /// never delivered after this returns.
    pub fn start(&self, bpm: f64, pattern: PatternId, start_time: Option<f64>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.commands.send(Command::Start { bpm, pattern, start_time, generation });
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.commands.send(Command::Stop);
    }

    pub fn set_bpm(&self, bpm: f64) {
        let _ = self.commands.send(Command::SetBpm(bpm));
    }

    /// One-shot notification sound at an absolute device time.
    pub fn play_at(&self, sound: ScheduledSound) {
        let _ = self.commands.send(Command::Play(sound));
    }

    pub fn on_beat(&self, observer: impl FnMut(&BeatNotice) + Send + 'static) {
        let _ = self.commands.send(Command::Observe(Box::new(observer)));
    }

    /// Next bar start at least `min_delay` seconds away, or `None` when idle.
    pub fn next_downbeat(&self, min_delay: f64) -> Option<Downbeat> {
        let (reply, rx) = bounded(1);
        self.commands.send(Command::NextDownbeat { min_delay, reply }).ok()?;
        rx.recv_timeout(Duration::from_secs(1)).ok().flatten()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(h) = self.join.take() {
            let _ = h.join();
        }
    }
}

struct Driver {
    scheduler: BeatScheduler,
    clock: SharedClock,
    sink: Box<dyn AudioSink>,
    tick: Duration,
    /// Emitted beats waiting for the clock to reach them.
    due: VecDeque<BeatNotice>,
    generation: u64,
    notices: Sender<BeatNotice>,
    overflow: Receiver<BeatNotice>,
    observers: Vec<BeatObserver>,
}

impl Driver {
    fn run(mut self, commands: Receiver<Command>) {
        loop {
            let wait = self.next_wait();
            match commands.recv_timeout(wait) {
                Ok(cmd) => {
                    if !self.handle(cmd) {
                        break;
                    }
                    // drain the rest so a burst of commands applies before the tick
                    let mut alive = true;
                    while let Ok(cmd) = commands.try_recv() {
                        if !self.handle(cmd) {
                            alive = false;
                            break;
                        }
                    }
                    if !alive {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick();
        }
        self.halt();
        log::debug!("scheduler thread exited");
    }

    /// Sleep until the next driver tick or the next due beat, whichever is first.
    fn next_wait(&self) -> Duration {
        match self.due.front() {
            Some(n) => {
                let until = (n.scheduled_time - self.clock.now()).max(0.0);
                self.tick.min(Duration::from_secs_f64(until))
            }
            None => self.tick,
        }
    }

    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start { bpm, pattern, start_time, generation } => {
                self.halt();
                self.generation = generation;
                let now = self.clock.now();
                self.scheduler.start(bpm, pattern, start_time, now);
                log::info!(
                    "🥁 Scheduler started: {:.1} BPM, {:?}, first beat at {:.3}s (now {:.3}s)",
                    bpm, pattern, start_time.unwrap_or(now), now
                );
            }
            Command::Stop => {
                if self.scheduler.is_active() {
                    log::info!("⏹️ Scheduler stopped");
                }
                self.halt();
            }
            Command::SetBpm(bpm) => self.scheduler.set_bpm(bpm),
            Command::NextDownbeat { min_delay, reply } => {
                let now = self.clock.now();
                let _ = reply.send(self.scheduler.next_downbeat(now, min_delay));
            }
            Command::Play(sound) => self.sink.schedule(sound),
            Command::Observe(observer) => self.observers.push(observer),
            Command::Shutdown => return false,
        }
        true
    }

    fn halt(&mut self) {
        self.scheduler.stop();
        self.due.clear();
        self.sink.cancel_pending();
    }

    fn tick(&mut self) {
        let now = self.clock.now();
        for ev in self.scheduler.tick(now) {
            for kind in &ev.sounds {
                self.sink.schedule(ScheduledSound { kind: *kind, at: ev.time });
            }
            log::trace!("beat {} committed for {:.4}s", ev.index, ev.time);
            self.due.push_back(BeatNotice {
                index: ev.index,
                bar_position: ev.bar_position,
                measure_index: ev.measure_index,
                scheduled_time: ev.time,
                bpm: ev.bpm,
                generation: self.generation,
            });
        }

        while self.due.front().is_some_and(|n| n.scheduled_time <= now) {
            let Some(notice) = self.due.pop_front() else { break };
            for observer in self.observers.iter_mut() {
                observer(&notice);
            }
            self.publish(notice);
        }
    }

    fn publish(&mut self, notice: BeatNotice) {
        let mut pending = notice;
        loop {
            match self.notices.try_send(pending) {
                Ok(()) => return,
                Err(crossbeam_channel::TrySendError::Full(n)) => {
                    // drop the oldest; the newest beat matters most
                    let _ = self.overflow.try_recv();
                    pending = n;
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
            }
        }
    }
}
