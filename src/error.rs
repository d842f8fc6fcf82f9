//! Error types shared across the engine.
//!
//! Failures inside a single update pass (a bad box, a bad config value) are
//! contained and never surface here. What does surface is collaborator-level
//! trouble: the detector or loading input files. Audio device failures stay
//! inside the alarm sink and are only logged.

use thiserror::Error;

/// Failure reported by a detection adapter for one frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectionError {
    #[error("detection model is not available")]
    ModelUnavailable,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("frame has unusable dimensions {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
}

/// Failure reported by an alert output device.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AlertError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio playback failed: {0}")]
    Playback(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("monitoring session is closed")]
    SessionClosed,
    #[error("monitoring session task failed: {0}")]
    SessionTask(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
