//! Per-zone statistic time series with entry validity tracking.

use serde::{Deserialize, Serialize};

/// Validity of one series entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Never computed.
    Pending,
    /// Value is current for the series' geometry version.
    Computed,
    /// Invalidated by a geometry change; value is undefined.
    Stale,
    /// The frame could not be obtained; retried only on explicit request.
    Failed,
}

/// Time series of one aggregate for one zone.
///
/// The series always has exactly one entry per dataset frame. Entries that
/// are not `Computed` hold no meaningful value; readers must consult the
/// entry state, never assume zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStatisticSeries {
    values: Vec<f64>,
    states: Vec<EntryState>,
    geometry_version: u64,
}

impl ZoneStatisticSeries {
    /// Create a series with every entry pending.
    pub fn new(frame_count: usize, geometry_version: u64) -> Self {
        Self {
            values: vec![0.0; frame_count],
            states: vec![EntryState::Pending; frame_count],
            geometry_version,
        }
    }

    /// Number of entries (= dataset frame count).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a zero-frame dataset.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Geometry version the computed entries belong to.
    pub fn geometry_version(&self) -> u64 {
        self.geometry_version
    }

    /// State of one entry.
    pub fn state(&self, index: usize) -> Option<EntryState> {
        self.states.get(index).copied()
    }

    /// Value of one entry, only when computed.
    pub fn value(&self, index: usize) -> Option<f64> {
        match self.states.get(index)? {
            EntryState::Computed => Some(self.values[index]),
            _ => None,
        }
    }

    /// All computed `(index, value)` pairs in order.
    pub fn computed_entries(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == EntryState::Computed)
            .map(|(i, _)| (i, self.values[i]))
    }

    /// Record a computed value.
    pub fn set_computed(&mut self, index: usize, value: f64) {
        if index < self.values.len() {
            self.values[index] = value;
            self.states[index] = EntryState::Computed;
        }
    }

    /// Mark one entry failed.
    pub fn mark_failed(&mut self, index: usize) {
        if index < self.states.len() {
            self.states[index] = EntryState::Failed;
        }
    }

    /// Invalidate every entry for a new geometry version.
    ///
    /// Values are cleared so an old-geometry value can never be observed
    /// after the invalidation.
    pub fn invalidate_all(&mut self, geometry_version: u64) {
        self.geometry_version = geometry_version;
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self.states.iter_mut().for_each(|s| *s = EntryState::Stale);
    }

    /// Move failed entries back to pending, returning their indices.
    pub fn reset_failed(&mut self) -> Vec<usize> {
        let mut indices = Vec::new();
        for (i, state) in self.states.iter_mut().enumerate() {
            if *state == EntryState::Failed {
                *state = EntryState::Pending;
                indices.push(i);
            }
        }
        indices
    }

    /// Indices that need computation (pending or stale), in order.
    pub fn missing_indices(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, EntryState::Pending | EntryState::Stale))
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of computed entries.
    pub fn computed_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == EntryState::Computed)
            .count()
    }

    /// True when every entry in `range` is settled (computed or failed).
    pub fn is_settled_over(&self, range: std::ops::Range<usize>) -> bool {
        range
            .filter_map(|i| self.states.get(i))
            .all(|s| matches!(s, EntryState::Computed | EntryState::Failed))
    }
}
