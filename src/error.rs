// src/error.rs

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that leave a subsystem. Transient per-frame problems never show up
/// here; they are swallowed inside the gesture pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Camera permission denied or the device could not be opened. Blocks play.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// No usable audio output. The scheduler keeps running silently.
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// Every detector backend in the fallback chain failed.
    #[error("all hand detector backends failed (last: {0})")]
    BackendsExhausted(String),

    /// The remote vision judge answered with an error.
    #[error("remote judge failed: {0}")]
    RemoteJudge(String),

    /// The remote vision judge did not answer in time.
    #[error("remote judge timed out after {0} ms")]
    RemoteTimeout(u64),

    /// A round operation was called from a status that does not allow it.
    #[error("invalid round transition: {0}")]
    InvalidState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid_state<T: Into<String>>(msg: T) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Failure reported by a single hand detector backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectError {
    /// The backend itself is broken (init failure, lost context, dead worker).
    /// The detector chain moves on to the next backend.
    #[error("backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },

    /// One frame could not be processed. Counts as "no hand" for that cycle.
    #[error("frame {frame_id} rejected: {reason}")]
    Frame { frame_id: u64, reason: String },
}

impl DetectError {
    pub fn backend(backend: &str, reason: impl Into<String>) -> Self {
        Self::Backend { backend: backend.to_string(), reason: reason.into() }
    }

    pub fn frame(frame_id: u64, reason: impl Into<String>) -> Self {
        Self::Frame { frame_id, reason: reason.into() }
    }

    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
