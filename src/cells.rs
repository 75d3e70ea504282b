use crate::types::CellKey;
use crate::validate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    Applied,
    Rejected,
}

impl EditOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, EditOutcome::Applied)
    }
}

/// A dirty key together with the revision it had when it was captured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirtyMark {
    pub key: CellKey,
    pub revision: u64,
}

/// Read-only copy of a cell consumed by progress and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub key: CellKey,
    pub value: String,
    pub revision: u64,
}

/// Sparse grid of current values plus the dirty set.
///
/// Every accepted edit bumps a store-wide revision counter and stamps the
/// cell with it. The dirty set maps keys to the revision of their latest
/// unsaved edit, which lets a save confirm exactly the edits it carried.
#[derive(Debug, Default, Clone)]
pub struct CellStore {
    values: BTreeMap<CellKey, String>,
    dirty: BTreeMap<CellKey, u64>,
    revision: u64,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from resolved historical values. Loaded cells are clean.
    ///
    /// Values the gate would reject are dropped; they can only come from rows
    /// written outside this grid.
    pub fn load<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (CellKey, String)>,
    {
        let mut store = Self::new();
        for (key, value) in values {
            if !validate::accept(&value) {
                warn!(
                    student_id = %key.student_id,
                    subject_id = %key.subject_id,
                    value = %value,
                    "ignoring stored grade outside the accepted range"
                );
                continue;
            }
            store.values.insert(key, value);
        }
        store
    }

    /// Apply a raw edit. A rejected edit leaves the store untouched.
    pub fn set(&mut self, key: CellKey, raw: &str) -> EditOutcome {
        if !validate::accept(raw) {
            debug!(
                student_id = %key.student_id,
                subject_id = %key.subject_id,
                "edit rejected"
            );
            return EditOutcome::Rejected;
        }
        self.revision += 1;
        self.values.insert(key.clone(), raw.to_string());
        self.dirty.insert(key, self.revision);
        EditOutcome::Applied
    }

    /// Write `raw` into every key in `keys` whose current value is empty.
    /// Returns the number of cells filled, or `None` when the value is rejected.
    pub fn fill_empty<'a, I>(&mut self, keys: I, raw: &str) -> Option<usize>
    where
        I: IntoIterator<Item = &'a CellKey>,
    {
        if raw.is_empty() || !validate::accept(raw) {
            return None;
        }
        let mut filled = 0;
        for key in keys {
            if self.value(key).trim().is_empty() {
                self.set(key.clone(), raw);
                filled += 1;
            }
        }
        Some(filled)
    }

    pub fn value(&self, key: &CellKey) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn is_dirty(&self, key: &CellKey) -> bool {
        self.dirty.contains_key(key)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Drop dirty flags for keys that were saved.
    ///
    /// A key is only cleared when its revision still matches the captured
    /// one; a cell edited again after the capture stays dirty.
    pub fn clear_dirty(&mut self, saved: &[DirtyMark]) -> usize {
        let mut cleared = 0;
        for mark in saved {
            if self.dirty.get(&mark.key) == Some(&mark.revision) {
                self.dirty.remove(&mark.key);
                cleared += 1;
            }
        }
        cleared
    }

    /// All cells that currently hold a value.
    pub fn snapshot(&self) -> Vec<CellView> {
        self.values
            .iter()
            .map(|(key, value)| CellView {
                key: key.clone(),
                value: value.clone(),
                revision: self.dirty.get(key).copied().unwrap_or(0),
            })
            .collect()
    }

    /// Dirty cells with the revision of their latest edit.
    pub fn dirty_snapshot(&self) -> Vec<CellView> {
        self.dirty
            .iter()
            .map(|(key, revision)| CellView {
                key: key.clone(),
                value: self.value(key).to_string(),
                revision: *revision,
            })
            .collect()
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = &CellKey> {
        self.dirty.keys()
    }
}
