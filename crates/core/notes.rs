//! Route note log: append-only chat history per location
//!
//! All access goes through one mutex. Every append hands back an owned copy
//! of the history at that location so the caller can stream it out without
//! holding the lock.

use parking_lot::Mutex;
use routeguide_types::{Point, RouteNote};
use rustc_hash::FxHashMap;
use std::fmt;

/// Map key derived from a point.
///
/// Two points produce the same key exactly when both scaled coordinates are
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationKey {
    latitude: i32,
    longitude: i32,
}

impl From<&Point> for LocationKey {
    fn from(point: &Point) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.latitude, self.longitude)
    }
}

/// Concurrency-safe, append-only notes keyed by location.
#[derive(Debug, Default)]
pub struct RouteNoteLog {
    notes: Mutex<FxHashMap<LocationKey, Vec<RouteNote>>>,
}

impl RouteNoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `note` at its location and return a snapshot of every note
    /// recorded there, oldest first, including `note` itself.
    ///
    /// The append and the copy happen under the same lock, so the snapshot is
    /// always a complete prefix of the history at that key.
    pub fn append(&self, note: RouteNote) -> Vec<RouteNote> {
        let key = LocationKey::from(&note.location);
        let mut notes = self.notes.lock();
        let history = notes.entry(key).or_default();
        history.push(note);
        log::trace!("Location {} now has {} notes", key, history.len());
        history.clone()
    }

    /// Snapshot of the notes recorded at `point`.
    pub fn notes_at(&self, point: &Point) -> Vec<RouteNote> {
        self.notes
            .lock()
            .get(&LocationKey::from(point))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct locations with at least one note.
    pub fn location_count(&self) -> usize {
        self.notes.lock().len()
    }

    /// Total number of notes across all locations.
    pub fn note_count(&self) -> usize {
        self.notes.lock().values().map(Vec::len).sum()
    }
}
