//! Stackscope Analysis - Zones and zonal statistics
//!
//! This crate provides the analysis half of stackscope:
//! - Zone identity, geometry, and the zone registry with change events
//! - Footprint rasterization (area-weighted pixel coverage)
//! - Per-frame zonal aggregates and their time series
//! - Temporal reductions across a frame range

pub mod aggregate;
pub mod engine;
pub mod footprint;
pub mod reduce;
pub mod registry;
pub mod series;
pub mod zone;

pub use aggregate::{compute_zone_value, AggregateKind};
pub use engine::{ComputeOutcome, SeriesStore};
pub use footprint::Footprint;
pub use reduce::{reduce_stack, ReduceOp};
pub use registry::{ZoneEvent, ZoneRegistry};
pub use series::{EntryState, ZoneStatisticSeries};
pub use zone::{Zone, ZoneId, ZoneShape};
