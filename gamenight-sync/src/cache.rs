//! Local cache of live rows.
//!
//! Pure data structure: no I/O, no channels. The live watchers own one
//! cache each and feed it fetch results and change events.
//!
//! Invariants:
//! - no two entries share an id
//! - an update replaces the entry with the same id, or is ignored
//! - a delete removes the entry with the same id, or is a no-op
//! - an insert appends unless the id is already present
//!
//! A single-row cache is just an `Option<R>`; see [`apply_single`].

use crate::client::ChangeEvent;
use crate::error::SyncResult;
use gamenight_types::{Record, record_id};

/// Ordered, id-unique collection of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCache<R: Record> {
    rows: Vec<R>,
}

impl<R: Record> Default for RowCache<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: Record> RowCache<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole collection with a fetch result, keeping server
    /// order. Later duplicates of an id are dropped.
    pub fn replace_all(&mut self, rows: Vec<R>) {
        self.rows.clear();
        for row in rows {
            self.insert_if_absent(row);
        }
    }

    /// Replaces the entry with the same id. Returns false if absent.
    pub fn apply_update(&mut self, row: R) -> bool {
        let id = row.id();
        match self.rows.iter_mut().find(|existing| existing.id() == id) {
            Some(existing) => {
                *existing = row;
                true
            }
            None => false,
        }
    }

    /// Appends the row unless its id is already present.
    pub fn insert_if_absent(&mut self, row: R) -> bool {
        if self.contains(&row.id()) {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Removes the entry with the given id. Returns false if absent.
    pub fn remove(&mut self, id: &R::Id) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.id() != *id);
        self.rows.len() != before
    }

    pub fn contains(&self, id: &R::Id) -> bool {
        self.rows.iter().any(|row| row.id() == *id)
    }

    pub fn get(&self, id: &R::Id) -> Option<&R> {
        self.rows.iter().find(|row| row.id() == *id)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

/// Applies a change event to a single-row cache keyed by `key`.
///
/// Inserts and updates replace the row outright (last writer wins), a
/// delete clears it, and events for any other id are ignored. Returns
/// whether the row changed.
pub fn apply_single<R: Record>(
    row: &mut Option<R>,
    key: &R::Id,
    event: &ChangeEvent,
) -> SyncResult<bool> {
    if record_id::<R>(event.row()).as_ref() != Some(key) {
        return Ok(false);
    }
    match event {
        ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => {
            let new: R = serde_json::from_value(new.clone())?;
            let changed = row.as_ref() != Some(&new);
            *row = Some(new);
            Ok(changed)
        }
        ChangeEvent::Delete { .. } => Ok(row.take().is_some()),
    }
}
