// src/gesture/snapshot.rs

use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};

use super::frame::SharedFrame;
use super::landmarks::HandLandmarks;

/// Latest detection result. Replaced as a whole, never mutated in place, so
/// a reader can never see counts from one frame and landmarks from another.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GestureSnapshot {
    pub frame_id: u64,
    /// Device-clock time the frame was captured.
    pub timestamp: f64,
    pub landmarks: Option<HandLandmarks>,
    /// Count for this frame alone; `None` when no hand was found.
    pub raw_count: Option<u8>,
    /// Mode over the recent history; this is what gets judged.
    pub smoothed_count: Option<u8>,
    /// Backend that produced this result.
    pub backend: Option<String>,
    #[serde(skip)]
    pub frame: Option<SharedFrame>,
}

impl GestureSnapshot {
    pub fn hand_visible(&self) -> bool {
        self.landmarks.is_some()
    }
}

pub type CountListener = Box<dyn FnMut(Option<u8>, &GestureSnapshot) + Send>;

struct Shared {
    latest: RwLock<Arc<GestureSnapshot>>,
    listeners: Mutex<Vec<CountListener>>,
}

/// Creates the single writer and its readers.
pub fn snapshot_cell() -> (SnapshotWriter, SnapshotReader) {
    let shared = Arc::new(Shared {
        latest: RwLock::new(Arc::new(GestureSnapshot::default())),
        listeners: Mutex::new(Vec::new()),
    });
    (SnapshotWriter { shared: shared.clone() }, SnapshotReader { shared })
}

/// The only handle allowed to publish. Not `Clone`.
pub struct SnapshotWriter {
    shared: Arc<Shared>,
}

impl SnapshotWriter {
    /// Swap in a new snapshot. Listeners fire once when the smoothed count changes.
    pub fn publish(&self, snapshot: GestureSnapshot) {
        let next = Arc::new(snapshot);
        let previous = match self.shared.latest.write() {
            Ok(mut slot) => std::mem::replace(&mut *slot, next.clone()),
            Err(_) => return,
        };

        if previous.smoothed_count == next.smoothed_count {
            return;
        }
        // Run listeners unlocked so they may register more listeners.
        let mut running = match self.shared.listeners.lock() {
            Ok(mut listeners) => std::mem::take(&mut *listeners),
            Err(_) => return,
        };
        for listener in running.iter_mut() {
            listener(previous.smoothed_count, &next);
        }
        if let Ok(mut listeners) = self.shared.listeners.lock() {
            running.append(&mut listeners);
            *listeners = running;
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader { shared: self.shared.clone() }
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<Shared>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<GestureSnapshot> {
        match self.shared.latest.read() {
            Ok(slot) => slot.clone(),
            Err(_) => Arc::new(GestureSnapshot::default()),
        }
    }

    /// `listener(previous, current)` runs on the pipeline thread.
    pub fn on_count_change(&self, listener: impl FnMut(Option<u8>, &GestureSnapshot) + Send + 'static) {
        if let Ok(mut listeners) = self.shared.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(id: u64, count: Option<u8>) -> GestureSnapshot {
        GestureSnapshot { frame_id: id, raw_count: count, smoothed_count: count, ..Default::default() }
    }

    #[test]
    fn readers_see_the_latest_whole_snapshot() {
        let (writer, reader) = snapshot_cell();
        writer.publish(snap(1, Some(2)));
        writer.publish(snap(2, Some(3)));
        let s = reader.latest();
        assert_eq!((s.frame_id, s.smoothed_count), (2, Some(3)));
    }

    #[test]
    fn listeners_fire_only_on_change() {
        let (writer, reader) = snapshot_cell();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        reader.on_count_change(move |prev, cur| sink.lock().unwrap().push((prev, cur.smoothed_count)));

        writer.publish(snap(1, Some(2)));
        writer.publish(snap(2, Some(2)));
        writer.publish(snap(3, None));
        writer.publish(snap(4, Some(4)));

        let changes = changes.lock().unwrap().clone();
        assert_eq!(changes, vec![(None, Some(2)), (Some(2), None), (None, Some(4))]);
    }

    #[test]
    fn a_listener_can_register_another_listener() {
        let (writer, reader) = snapshot_cell();
        let late = Arc::new(Mutex::new(Vec::new()));
        let (r, sink) = (reader.clone(), late.clone());
        let mut added = false;
        reader.on_count_change(move |_, _| {
            if !added {
                added = true;
                let sink = sink.clone();
                r.on_count_change(move |_, cur| sink.lock().unwrap().push(cur.smoothed_count));
            }
        });

        writer.publish(snap(1, Some(1)));
        writer.publish(snap(2, Some(5)));
        writer.publish(snap(3, Some(2)));
        assert_eq!(*late.lock().unwrap(), vec![Some(5), Some(2)]);
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        let (writer, reader) = snapshot_cell();
        let r = reader.clone();
        let t = std::thread::spawn(move || {
            for _ in 0..10_000 {
                let s = r.latest();
                // every published snapshot has raw == frame_id % 6
                if s.frame_id > 0 {
                    assert_eq!(s.raw_count, Some((s.frame_id % 6) as u8));
                }
            }
        });
        for id in 1..5_000u64 {
            writer.publish(snap(id, Some((id % 6) as u8)));
        }
        t.join().unwrap();
    }
}
