// THEORY:
// The `activity` module gives each tracked person a memory of how long they
// have been moving or standing still. Where the association layer answers
// "who is who", this layer answers "what have they been doing".
//
// Key architectural principles:
// 1.  **Streaks, Not Totals**: `active_time` and `inactive_time` are the running
//     lengths of the *current* streak. The moment the state flips, the other
//     timer is reset to zero, so at most one of them is ever non-zero.
// 2.  **Clean Slate on Birth**: A new person has no previous position, so no
//     movement can be judged. They start inactive with both timers at zero.
// 3.  **Edge-Triggered Alerts**: An alert fires once, on the update where the
//     inactive streak first reaches the threshold. It stays latched for the
//     rest of the episode and re-arms only when the person moves again.
// 4.  **Exact Time**: Timers are `Duration`s integrated from wall-clock deltas.
//     Integer nanoseconds keep ten 100 ms steps exactly equal to one second,
//     which floating-point seconds would not.

use crate::core_modules::geometry::{self, BoundingBox};
use std::fmt;
use std::time::Duration;

/// Stable identifier of a track. Allocated from a monotonically increasing
/// counter and never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "person_{}", self.0)
    }
}

/// Whether a person moved beyond the motion threshold on their last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Active,
    Inactive,
}

/// Thresholds the state machine evaluates against, taken fresh from the
/// configuration every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityParams {
    /// Minimum center displacement, in pixels, that counts as movement.
    pub motion_threshold: f64,
    /// How long an inactive streak may last before an alert fires.
    pub inactivity_threshold: Duration,
}

/// A person that is being tracked across processed frames.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPerson {
    pub id: TrackId,
    /// The most recently observed box.
    pub bounding_box: BoundingBox,
    /// Center of the box at the previous update, used to measure movement.
    pub last_center: (f64, f64),
    pub is_active: bool,
    /// Length of the current active streak.
    pub active_time: Duration,
    /// Length of the current inactive streak.
    pub inactive_time: Duration,
    /// Latched once an alert fired for the current inactive streak.
    pub alert_triggered: bool,
}

impl TrackedPerson {
    /// Creates a person from their first sighting.
    pub fn new(id: TrackId, bounding_box: BoundingBox) -> Self {
        Self {
            id,
            bounding_box,
            last_center: bounding_box.center(),
            is_active: false,
            active_time: Duration::ZERO,
            inactive_time: Duration::ZERO,
            alert_triggered: false,
        }
    }

    pub fn state(&self) -> ActivityState {
        if self.is_active {
            ActivityState::Active
        } else {
            ActivityState::Inactive
        }
    }

    /// Applies one processed frame's observation.
    ///
    /// Returns `true` exactly on the update where an inactivity alert must fire.
    pub fn observe(
        &mut self,
        bounding_box: BoundingBox,
        delta: Duration,
        params: &ActivityParams,
    ) -> bool {
        let center = bounding_box.center();
        let movement = geometry::distance(center, self.last_center);

        self.bounding_box = bounding_box;
        self.last_center = center;

        if movement > params.motion_threshold {
            self.is_active = true;
            self.active_time += delta;
            self.inactive_time = Duration::ZERO;
            self.alert_triggered = false;
            return false;
        }

        self.is_active = false;
        self.active_time = Duration::ZERO;
        self.inactive_time += delta;

        if self.inactive_time >= params.inactivity_threshold && !self.alert_triggered {
            self.alert_triggered = true;
            return true;
        }
        false
    }
}
