//! Zone identity and geometry.

use serde::{Deserialize, Serialize};
use stackscope_core::Rect;
use uuid::Uuid;

/// Unique identifier for a zone.
///
/// Identifiers are random v4 UUIDs: never shared between zones and never
/// reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(Uuid);

impl ZoneId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Spatial footprint of a zone in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZoneShape {
    /// Axis-aligned rectangle, possibly with fractional edges.
    Rect(Rect),
    /// Simple closed polygon given as vertex positions.
    Polygon { vertices: Vec<[f32; 2]> },
}

impl ZoneShape {
    /// Axis-aligned bounding box of the shape.
    pub fn bounding_box(&self) -> Rect {
        match self {
            Self::Rect(rect) => *rect,
            Self::Polygon { vertices } => {
                if vertices.is_empty() {
                    return Rect::default();
                }
                let mut min_x = f32::MAX;
                let mut min_y = f32::MAX;
                let mut max_x = f32::MIN;
                let mut max_y = f32::MIN;
                for v in vertices {
                    min_x = min_x.min(v[0]);
                    min_y = min_y.min(v[1]);
                    max_x = max_x.max(v[0]);
                    max_y = max_y.max(v[1]);
                }
                Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
            }
        }
    }

    /// True when the shape cannot cover any area.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Self::Rect(rect) => rect.is_empty(),
            Self::Polygon { vertices } => vertices.len() < 3,
        }
    }

    /// Ray-casting point-in-shape test.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        match self {
            Self::Rect(rect) => rect.contains(stackscope_core::Vec2::new(x, y)),
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return false;
                }
                let n = vertices.len();
                let mut crossings = 0;
                for i in 0..n {
                    let a = vertices[i];
                    let b = vertices[(i + 1) % n];
                    if (a[1] <= y && b[1] > y) || (b[1] <= y && a[1] > y) {
                        let t = (y - a[1]) / (b[1] - a[1]);
                        let x_intersect = a[0] + t * (b[0] - a[0]);
                        if x < x_intersect {
                            crossings += 1;
                        }
                    }
                }
                crossings % 2 == 1
            }
        }
    }
}

/// A user-defined zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Unique identifier.
    pub id: ZoneId,
    /// Human label.
    pub label: String,
    /// Current geometry.
    pub shape: ZoneShape,
    /// Creation sequence number, used for stable display ordering.
    pub sequence: u64,
    /// Bumped on every geometry edit; computations are tagged with it.
    pub geometry_version: u64,
}
