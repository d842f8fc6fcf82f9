// THEORY:
// The `association` module solves the data association problem: given the
// people tracked in the previous processed frame and the detections of the
// current one, decide which detection is which person.
//
// Key architectural principles:
// 1.  **Combined Cost**: Each (detection, track) pair is scored with
//     `(1 - iou) * 100 + distance * 0.5`. Overlap alone loses fast movers whose
//     boxes stop overlapping between frames; distance alone confuses people
//     standing close together. Adding both covers each failure mode.
// 2.  **Gating**: Pairs whose centers are 200px or more apart and whose boxes
//     barely overlap are never candidates, so unrelated people cannot be
//     matched no matter how empty the scene is.
// 3.  **Global Greedy Assignment**: All candidates are sorted by cost and
//     accepted cheapest-first while both endpoints are still free and the cost
//     is below 150. This is not the optimal bipartite matching, but it is
//     deterministic and cheap.
// 4.  **Determinism**: Candidates are enumerated detections-outer, tracks-inner,
//     and the sort is stable. Equal costs are therefore resolved by that
//     enumeration order, never by hash iteration.

use crate::core_modules::activity::{TrackId, TrackedPerson};
use crate::core_modules::detection::Detection;

/// Pairs whose centers are at least this far apart need overlap to qualify.
pub const CANDIDATE_MAX_DISTANCE: f64 = 200.0;
/// Pairs with more overlap than this qualify regardless of distance.
pub const CANDIDATE_MIN_IOU: f64 = 0.1;
/// A candidate is accepted only when its cost is strictly below this.
pub const MAX_MATCH_COST: f64 = 150.0;

const IOU_COST_WEIGHT: f64 = 100.0;
const DISTANCE_COST_WEIGHT: f64 = 0.5;

/// A (detection, track) pair that passed gating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub detection_index: usize,
    pub track_index: usize,
    pub iou: f64,
    pub distance: f64,
    pub cost: f64,
}

/// The matching cost of two boxes, in the units used by [`MAX_MATCH_COST`].
pub fn match_cost(iou: f64, distance: f64) -> f64 {
    (1.0 - iou) * IOU_COST_WEIGHT + distance * DISTANCE_COST_WEIGHT
}

/// Result of one association pass.
///
/// Injective in both directions: each detection maps to at most one track and
/// each track is claimed by at most one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Indexed by detection; `Some` holds the matched track.
    matches: Vec<Option<TrackId>>,
    /// Tracks that no detection claimed, in their original order.
    unmatched_tracks: Vec<TrackId>,
}

impl Assignment {
    pub fn track_for(&self, detection_index: usize) -> Option<TrackId> {
        self.matches.get(detection_index).copied().flatten()
    }

    pub fn matches(&self) -> &[Option<TrackId>] {
        &self.matches
    }

    pub fn matched_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_some()).count()
    }

    pub fn unmatched_tracks(&self) -> &[TrackId] {
        &self.unmatched_tracks
    }
}

/// Enumerates every gated candidate, detections outer and tracks inner.
///
/// Detections with degenerate boxes produce no candidates.
pub fn candidates(detections: &[Detection], tracks: &[TrackedPerson]) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(detections.len() * tracks.len());

    for (detection_index, detection) in detections.iter().enumerate() {
        if !detection.bounding_box.is_valid() {
            continue;
        }
        for (track_index, track) in tracks.iter().enumerate() {
            let iou = detection.bounding_box.iou(&track.bounding_box);
            let distance = detection.bounding_box.center_distance(&track.bounding_box);

            if distance < CANDIDATE_MAX_DISTANCE || iou > CANDIDATE_MIN_IOU {
                candidates.push(Candidate {
                    detection_index,
                    track_index,
                    iou,
                    distance,
                    cost: match_cost(iou, distance),
                });
            }
        }
    }

    candidates
}

/// Matches the current frame's detections against the previous frame's tracks.
pub fn associate(detections: &[Detection], tracks: &[TrackedPerson]) -> Assignment {
    let mut matches: Vec<Option<TrackId>> = vec![None; detections.len()];
    let mut track_taken = vec![false; tracks.len()];

    // --- 1. Scoring ---
    let mut candidates = candidates(detections, tracks);

    // --- 2. Ordering ---
    // `sort_by` is stable, so equal costs keep their enumeration order.
    candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost));

    // --- 3. Greedy acceptance ---
    for candidate in &candidates {
        if candidate.cost >= MAX_MATCH_COST {
            // Sorted ascending: nothing after this can be accepted either.
            break;
        }
        if matches[candidate.detection_index].is_some() || track_taken[candidate.track_index] {
            continue;
        }
        matches[candidate.detection_index] = Some(tracks[candidate.track_index].id);
        track_taken[candidate.track_index] = true;
    }

    let unmatched_tracks = tracks
        .iter()
        .zip(&track_taken)
        .filter(|(_, taken)| !**taken)
        .map(|(track, _)| track.id)
        .collect();

    Assignment { matches, unmatched_tracks }
}
