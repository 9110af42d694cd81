//! Series bookkeeping for the zonal statistics engine.
//!
//! [`SeriesStore`] owns every `(zone, aggregate)` series and enforces the
//! geometry-version discipline: results are only accepted when their version
//! tag matches the series' current version, so a value computed against a
//! superseded geometry can never land.

use std::collections::HashMap;

use tracing::trace;

use crate::aggregate::AggregateKind;
use crate::series::ZoneStatisticSeries;
use crate::zone::ZoneId;

/// Outcome of one frame computation, as reported by a worker.
#[derive(Debug, Clone)]
pub enum ComputeOutcome {
    /// The aggregate value.
    Value(f64),
    /// The frame could not be obtained; the message describes why.
    Failed(String),
}

/// All statistic series for the current dataset.
pub struct SeriesStore {
    frame_count: usize,
    series: HashMap<(ZoneId, AggregateKind), ZoneStatisticSeries>,
}

impl SeriesStore {
    /// Create an empty store for a dataset of `frame_count` frames.
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            series: HashMap::new(),
        }
    }

    /// Frames per series.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Drop everything and adopt a new dataset length.
    pub fn reset(&mut self, frame_count: usize) {
        self.frame_count = frame_count;
        self.series.clear();
    }

    /// Get or create the series for a `(zone, kind)` pair.
    ///
    /// A fresh series starts all-pending at the zone's current geometry
    /// version.
    pub fn ensure(
        &mut self,
        zone: ZoneId,
        kind: AggregateKind,
        geometry_version: u64,
    ) -> &ZoneStatisticSeries {
        self.series
            .entry((zone, kind))
            .or_insert_with(|| ZoneStatisticSeries::new(self.frame_count, geometry_version))
    }

    /// Snapshot one series.
    pub fn snapshot(&self, zone: ZoneId, kind: AggregateKind) -> Option<ZoneStatisticSeries> {
        self.series.get(&(zone, kind)).cloned()
    }

    /// Aggregate kinds that have a series for this zone.
    pub fn kinds_for(&self, zone: ZoneId) -> Vec<AggregateKind> {
        let mut kinds: Vec<AggregateKind> = self
            .series
            .keys()
            .filter(|(z, _)| *z == zone)
            .map(|(_, k)| *k)
            .collect();
        kinds.sort_by_key(|k| k.name());
        kinds
    }

    /// Invalidate every series of a zone for a new geometry version.
    pub fn invalidate_zone(&mut self, zone: ZoneId, geometry_version: u64) {
        for ((z, _), series) in self.series.iter_mut() {
            if *z == zone {
                series.invalidate_all(geometry_version);
            }
        }
    }

    /// Drop every series of a removed zone.
    pub fn remove_zone(&mut self, zone: ZoneId) {
        self.series.retain(|(z, _), _| *z != zone);
    }

    /// Move failed entries of one series back to pending.
    pub fn reset_failed(&mut self, zone: ZoneId, kind: AggregateKind) -> Vec<usize> {
        self.series
            .get_mut(&(zone, kind))
            .map(|s| s.reset_failed())
            .unwrap_or_default()
    }

    /// Apply a worker result tagged with the geometry version it targeted.
    ///
    /// Returns true when the value was accepted; a stale version tag, an
    /// unknown series, or an out-of-range index discards the result.
    pub fn apply(
        &mut self,
        zone: ZoneId,
        kind: AggregateKind,
        frame_index: usize,
        geometry_version: u64,
        outcome: &ComputeOutcome,
    ) -> bool {
        let Some(series) = self.series.get_mut(&(zone, kind)) else {
            return false;
        };
        if series.geometry_version() != geometry_version || frame_index >= series.len() {
            trace!(
                zone = %zone,
                kind = %kind,
                frame_index,
                geometry_version,
                "Discarding superseded result"
            );
            return false;
        }
        match outcome {
            ComputeOutcome::Value(value) => series.set_computed(frame_index, *value),
            ComputeOutcome::Failed(reason) => {
                trace!(zone = %zone, frame_index, reason = %reason, "Series entry failed");
                series.mark_failed(frame_index);
            }
        }
        true
    }
}
