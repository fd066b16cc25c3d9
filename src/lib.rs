// src/lib.rs

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod gesture;
pub mod judge;
pub mod scheduler;
pub mod sim;

pub use config::GameConfig;
pub use error::{CoreError, DetectError, Result};
pub use game::{Game, GameEvent};
pub use gesture::{GestureSnapshot, count_fingers};
pub use judge::{RoundJudge, RoundStatus, Verdict};
pub use scheduler::{BeatScheduler, PatternId, spawn_scheduler};
