// THEORY:
// The `track_store` module holds the one authoritative view of who is being
// tracked. Each processed frame produces a whole new `Snapshot`; the store
// swaps it in under a write lock that is held only for the pointer swap.
//
// Key architectural principles:
// 1.  **Immutable Generations**: A published `Snapshot` is never modified.
//     Readers hold an `Arc<Snapshot>` and see a complete, consistent frame no
//     matter what the update pass is doing concurrently.
// 2.  **Atomic Publication**: Replacing the snapshot is a single `Arc` swap.
//     There is no moment at which a reader could observe half of one frame
//     and half of the next.
// 3.  **Presentation Ready**: The snapshot keeps people in the order the pass
//     produced them and exposes the aggregate counts overlays need.

use crate::core_modules::activity::{TrackId, TrackedPerson};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregate counts for presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersonCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

/// One immutable generation of tracked people.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    persons: Vec<TrackedPerson>,
    index: HashMap<TrackId, usize>,
}

impl Snapshot {
    pub fn new(generation: u64, persons: Vec<TrackedPerson>) -> Self {
        let index = persons
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i))
            .collect();
        Self { generation, persons, index }
    }

    /// Monotonically increasing publication counter. Zero is the empty store.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn persons(&self) -> &[TrackedPerson] {
        &self.persons
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedPerson> {
        self.index.get(&id).map(|&i| &self.persons[i])
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn counts(&self) -> PersonCounts {
        let active = self.persons.iter().filter(|p| p.is_active).count();
        PersonCounts {
            total: self.persons.len(),
            active,
            inactive: self.persons.len() - active,
        }
    }
}

/// Publishes snapshots to any number of readers.
#[derive(Debug, Default)]
pub struct TrackStore {
    current: RwLock<Arc<Snapshot>>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest completed snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the whole snapshot with a new generation built from `persons`.
    ///
    /// Publishing is single-writer: only the update cycle calls this, so the
    /// generation read up front is still current when the swap happens.
    pub fn publish(&self, persons: Vec<TrackedPerson>) -> Arc<Snapshot> {
        let generation = self.current.read().generation + 1;
        let next = Arc::new(Snapshot::new(generation, persons));
        *self.current.write() = Arc::clone(&next);
        next
    }

    /// Drops every tracked person by publishing an empty generation.
    pub fn clear(&self) -> Arc<Snapshot> {
        self.publish(Vec::new())
    }
}
