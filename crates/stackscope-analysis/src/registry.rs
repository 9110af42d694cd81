//! The set of currently defined zones.

use std::collections::HashMap;

use crossbeam_channel::Sender;
use tracing::debug;

use stackscope_core::{Result, StackscopeError};

use crate::zone::{Zone, ZoneId, ZoneShape};

/// Change notification emitted by every mutating registry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneEvent {
    Created { id: ZoneId },
    Updated { id: ZoneId, geometry_version: u64 },
    Removed { id: ZoneId },
}

/// Registry of zones with stable creation ordering and change events.
#[derive(Default)]
pub struct ZoneRegistry {
    zones: HashMap<ZoneId, Zone>,
    order: Vec<ZoneId>,
    next_sequence: u64,
    events: Option<Sender<ZoneEvent>>,
}

impl ZoneRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route change notifications to a channel.
    ///
    /// Events are best-effort: a disconnected consumer is ignored.
    pub fn set_event_sink(&mut self, sink: Sender<ZoneEvent>) {
        self.events = Some(sink);
    }

    fn emit(&self, event: ZoneEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }

    /// Add a zone, returning its fresh identifier.
    pub fn add(&mut self, shape: ZoneShape, label: impl Into<String>) -> ZoneId {
        let id = ZoneId::new();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let label = label.into();
        debug!(zone = %id, label = %label, "Zone created");
        self.zones.insert(
            id,
            Zone {
                id,
                label,
                shape,
                sequence,
                geometry_version: 0,
            },
        );
        self.order.push(id);
        self.emit(ZoneEvent::Created { id });
        id
    }

    /// Replace a zone's geometry, returning the new geometry version.
    pub fn update(&mut self, id: ZoneId, shape: ZoneShape) -> Result<u64> {
        let zone = self
            .zones
            .get_mut(&id)
            .ok_or_else(|| StackscopeError::NotFound(format!("zone {id}")))?;
        zone.shape = shape;
        zone.geometry_version += 1;
        let geometry_version = zone.geometry_version;
        debug!(zone = %id, version = geometry_version, "Zone geometry updated");
        self.emit(ZoneEvent::Updated {
            id,
            geometry_version,
        });
        Ok(geometry_version)
    }

    /// Remove a zone.
    pub fn remove(&mut self, id: ZoneId) -> Result<Zone> {
        let zone = self
            .zones
            .remove(&id)
            .ok_or_else(|| StackscopeError::NotFound(format!("zone {id}")))?;
        self.order.retain(|z| *z != id);
        debug!(zone = %id, "Zone removed");
        self.emit(ZoneEvent::Removed { id });
        Ok(zone)
    }

    /// Look up a zone.
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    /// All zones in creation order.
    pub fn list(&self) -> Vec<Zone> {
        self.order
            .iter()
            .filter_map(|id| self.zones.get(id))
            .cloned()
            .collect()
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// True when no zones are defined.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
