//! Saved-session persistence with versioning.
//!
//! Serializes the dataset reference and zone definitions as JSON with a
//! schema version field. Computed series are never persisted; they are
//! always recomputed from the dataset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use stackscope_analysis::{ZoneId, ZoneShape};
use stackscope_core::{Result, StackscopeError};
use stackscope_source::LoadOptions;

use crate::session::AnalysisSession;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// A zone as persisted: geometry and label, no identity or series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedZone {
    pub label: String,
    pub shape: ZoneShape,
}

/// Versioned saved-session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    /// Schema version for migration.
    pub version: u32,
    /// Paths the dataset was loaded from (empty if none was loaded).
    pub dataset_paths: Vec<PathBuf>,
    /// Options the dataset was loaded with.
    pub load_options: LoadOptions,
    /// Zones in creation order.
    pub zones: Vec<SavedZone>,
}

impl SessionFile {
    /// Capture the persistable state of a session.
    pub fn capture(session: &AnalysisSession) -> Self {
        Self {
            version: CURRENT_VERSION,
            dataset_paths: session.dataset_paths(),
            load_options: session.load_options(),
            zones: session
                .list_zones()
                .into_iter()
                .map(|zone| SavedZone {
                    label: zone.label,
                    shape: zone.shape,
                })
                .collect(),
        }
    }

    /// Re-create the captured state in a session.
    ///
    /// Loads the dataset (when one was saved) and re-adds the zones in their
    /// original order, returning the fresh zone identifiers.
    pub fn restore(&self, session: &AnalysisSession) -> Result<Vec<ZoneId>> {
        if !self.dataset_paths.is_empty() {
            session.load_dataset(&self.dataset_paths, self.load_options.clone())?;
        }
        Ok(self
            .zones
            .iter()
            .map(|saved| session.add_zone(saved.shape.clone(), saved.label.clone()))
            .collect())
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            StackscopeError::Serialization(format!("Failed to serialize session: {e}"))
        })
    }

    /// Deserialize from JSON bytes with a version guard.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| StackscopeError::Serialization(format!("Invalid JSON: {e}")))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(StackscopeError::Serialization(format!(
                "Session file version {version} is newer than supported version {CURRENT_VERSION}"
            )));
        }

        serde_json::from_value(raw)
            .map_err(|e| StackscopeError::Serialization(format!("Failed to parse session: {e}")))
    }

    /// Save to a file path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load from a file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}
