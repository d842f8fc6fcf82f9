//! Monitor configuration.
//!
//! Values may arrive from a UI slider or a hand-edited file, so nothing here
//! ever rejects a number: out-of-range values are clamped to the nearest valid
//! bound and tracking carries on.

use crate::core_modules::activity::ActivityParams;
use crate::core_modules::detection::DEFAULT_CONFIDENCE_FLOOR;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const MIN_SENSITIVITY: i32 = 1;
pub const MAX_SENSITIVITY: i32 = 100;
/// Smallest inactivity threshold a non-positive configured value clamps to.
pub const MIN_INACTIVITY_THRESHOLD_SECS: f64 = 0.1;
/// Largest accepted inactivity threshold (one day).
pub const MAX_INACTIVITY_THRESHOLD_SECS: f64 = 86_400.0;

/// Motion threshold at sensitivity zero, in pixels.
const BASE_MOTION_THRESHOLD: f64 = 50.0;
/// Pixels removed from the motion threshold per sensitivity step.
const MOTION_THRESHOLD_STEP: f64 = 0.45;
/// The motion threshold never drops below this many pixels.
const MIN_MOTION_THRESHOLD: f64 = 5.0;

/// Tunable behaviour of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 1 (only large movements count) to 100 (small movements count).
    pub sensitivity: i32,
    /// Seconds a person must stay inactive before an alert fires.
    pub inactivity_threshold_secs: f64,
    /// Run detection on every n-th frame; the others reuse the last snapshot.
    pub frame_stride: u32,
    /// Detections must have a confidence strictly above this.
    pub confidence_floor: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sensitivity: 50,
            inactivity_threshold_secs: 10.0,
            frame_stride: 3,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

impl MonitorConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// defaults and the result is sanitized.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Returns a copy with every value clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let inactivity_threshold_secs = if self.inactivity_threshold_secs.is_nan()
            || self.inactivity_threshold_secs <= 0.0
        {
            MIN_INACTIVITY_THRESHOLD_SECS
        } else {
            self.inactivity_threshold_secs
                .clamp(MIN_INACTIVITY_THRESHOLD_SECS, MAX_INACTIVITY_THRESHOLD_SECS)
        };
        let confidence_floor = if self.confidence_floor.is_nan() {
            DEFAULT_CONFIDENCE_FLOOR
        } else {
            self.confidence_floor.clamp(0.0, 1.0)
        };

        Self {
            sensitivity: self.sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY),
            inactivity_threshold_secs,
            frame_stride: self.frame_stride.max(1),
            confidence_floor,
        }
    }

    /// Minimum center displacement, in pixels, that counts as movement.
    pub fn motion_threshold(&self) -> f64 {
        let sensitivity = self.sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY) as f64;
        (BASE_MOTION_THRESHOLD - sensitivity * MOTION_THRESHOLD_STEP).max(MIN_MOTION_THRESHOLD)
    }

    pub fn inactivity_threshold(&self) -> Duration {
        let secs = self.sanitized().inactivity_threshold_secs;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs_f64(MAX_INACTIVITY_THRESHOLD_SECS))
    }

    pub fn activity_params(&self) -> ActivityParams {
        ActivityParams {
            motion_threshold: self.motion_threshold(),
            inactivity_threshold: self.inactivity_threshold(),
        }
    }

    /// Checks a configuration without clamping it, for callers that prefer
    /// to reject bad input up front.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SENSITIVITY..=MAX_SENSITIVITY).contains(&self.sensitivity) {
            return Err(MonitorError::Config(format!(
                "sensitivity {} is outside {MIN_SENSITIVITY}..={MAX_SENSITIVITY}",
                self.sensitivity
            )));
        }
        if !(self.inactivity_threshold_secs > 0.0) || !self.inactivity_threshold_secs.is_finite() {
            return Err(MonitorError::Config(format!(
                "inactivity threshold {} must be a positive number of seconds",
                self.inactivity_threshold_secs
            )));
        }
        if self.frame_stride == 0 {
            return Err(MonitorError::Config("frame stride must be at least 1".to_string()));
        }
        Ok(())
    }
}
