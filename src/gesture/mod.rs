// src/gesture/mod.rs

pub mod detector;
pub mod fingers;
pub mod frame;
pub mod landmarks;
pub mod motion;
pub mod pipeline;
pub mod policy;
pub mod smoother;
pub mod snapshot;
pub mod worker;

pub use detector::{BackendSpec, ChainState, Detection, DetectorChain, DetectorFactory, HandDetector, Placement};
pub use fingers::{count_fingers, extended_fingers};
pub use frame::{Frame, FrameSource, PixelFormat, SharedFrame};
pub use landmarks::{HandLandmarks, Landmark};
pub use pipeline::{CycleOutcome, GesturePipeline, PipelineHandle, PipelineStatus, spawn_pipeline};
pub use policy::{GamePhase, PhaseCell, PhaseState};
pub use smoother::ModeSmoother;
pub use snapshot::{GestureSnapshot, SnapshotReader, SnapshotWriter, snapshot_cell};
pub use worker::WorkerDetector;
