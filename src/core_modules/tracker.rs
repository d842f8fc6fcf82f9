// THEORY:
// The `tracker` module is the heart of the engine. It takes the stateless list
// of `Detection`s for one processed frame and turns it into the next generation
// of `TrackedPerson`s.
//
// Key architectural principles:
// 1.  **One Pass, One Generation**: `update` reads the previous generation and
//     builds a brand new one. Nothing from the previous generation is mutated;
//     matched people are cloned forward and then advanced.
// 2.  **Lifecycle Management**:
//     - **Birth**: A detection that matches no track becomes a new person with
//       a fresh id and a clean state.
//     - **Tracking**: A matched detection advances its person's activity state.
//     - **Death**: A track that no detection claimed is simply not carried
//       into the next generation. There is no grace period.
// 3.  **Contained Failures**: Degenerate or low-confidence detections are
//     rejected one by one. They never abort the pass.

use crate::core_modules::activity::{ActivityParams, TrackId, TrackedPerson};
use crate::core_modules::alert::{AlertSink, InactivityAlert};
use crate::core_modules::association;
use crate::core_modules::detection::Detection;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters describing what happened during one update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub detections: usize,
    /// Detections excluded for degenerate geometry or low confidence.
    pub rejected: usize,
    pub matched: usize,
    pub created: usize,
    pub dropped: usize,
    pub alerts: usize,
}

/// The generation produced by one update pass.
#[derive(Debug, Clone)]
pub struct TrackerUpdate {
    /// People in detection order.
    pub persons: Vec<TrackedPerson>,
    pub alerts: Vec<InactivityAlert>,
    pub stats: UpdateStats,
}

/// Allocates ids and advances people from one generation to the next.
#[derive(Debug)]
pub struct Tracker {
    /// A counter to ensure each new person gets a unique ID.
    next_id: u64,
    /// Detections at or below this confidence are discarded.
    confidence_floor: f32,
}

impl Tracker {
    pub fn new(confidence_floor: f32) -> Self {
        Self {
            next_id: 0,
            confidence_floor,
        }
    }

    pub fn set_confidence_floor(&mut self, confidence_floor: f32) {
        self.confidence_floor = confidence_floor;
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Builds the next generation from the previous one and the current
    /// frame's detections. `sink` is invoked synchronously for every alert.
    pub fn update<S: AlertSink + ?Sized>(
        &mut self,
        previous: &[TrackedPerson],
        detections: &[Detection],
        delta: Duration,
        params: &ActivityParams,
        sink: &mut S,
    ) -> TrackerUpdate {
        let mut stats = UpdateStats {
            detections: detections.len(),
            ..UpdateStats::default()
        };

        // --- 1. Screening ---
        let accepted: Vec<Detection> = detections
            .iter()
            .filter(|d| {
                if !d.bounding_box.is_valid() {
                    warn!(
                        bounding_box = ?d.bounding_box,
                        "Skipping detection with degenerate box"
                    );
                    return false;
                }
                // NaN confidence fails this comparison too.
                d.confidence > self.confidence_floor
            })
            .copied()
            .collect();
        stats.rejected = detections.len() - accepted.len();

        // --- 2. Matching ---
        let assignment = association::associate(&accepted, previous);
        let by_id: HashMap<TrackId, &TrackedPerson> =
            previous.iter().map(|p| (p.id, p)).collect();

        // --- 3. State Updating ---
        let mut persons = Vec::with_capacity(accepted.len());
        let mut alerts = Vec::new();

        for (index, detection) in accepted.iter().enumerate() {
            let existing = assignment
                .track_for(index)
                .and_then(|id| by_id.get(&id).copied());

            let person = match existing {
                Some(previous_state) => {
                    stats.matched += 1;
                    let mut person = previous_state.clone();
                    if person.observe(detection.bounding_box, delta, params) {
                        let alert = InactivityAlert::for_person(&person);
                        info!(
                            track_id = %alert.track_id,
                            inactive_secs = alert.inactive_time.as_secs_f64(),
                            "Inactivity threshold crossed"
                        );
                        sink.on_inactivity_alert(&alert);
                        alerts.push(alert);
                    }
                    person
                }
                None => {
                    stats.created += 1;
                    TrackedPerson::new(self.allocate_id(), detection.bounding_box)
                }
            };
            persons.push(person);
        }

        stats.dropped = assignment.unmatched_tracks().len();
        stats.alerts = alerts.len();
        debug!(
            detections = stats.detections,
            rejected = stats.rejected,
            matched = stats.matched,
            created = stats.created,
            dropped = stats.dropped,
            "Tracker pass complete"
        );

        TrackerUpdate { persons, alerts, stats }
    }
}
