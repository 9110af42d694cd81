//! Aggregate kinds and the per-frame zonal reduction.

use serde::{Deserialize, Serialize};
use stackscope_core::Frame;

use crate::footprint::Footprint;

/// Reduction applied over a zone's footprint on one frame.
///
/// A closed set dispatched through a single match; adding a kind means
/// adding a variant, not registering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    /// Area-weighted sum of sample values.
    Sum,
    /// Area-weighted mean.
    Mean,
    /// Minimum over covered pixels.
    Min,
    /// Maximum over covered pixels.
    Max,
    /// Area-weighted population standard deviation.
    StdDev,
}

impl AggregateKind {
    /// Every supported kind, in display order.
    pub const ALL: [AggregateKind; 5] = [
        Self::Sum,
        Self::Mean,
        Self::Min,
        Self::Max,
        Self::StdDev,
    ];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::StdDev => "std",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute one aggregate over a footprint on one frame.
///
/// Pixels with fractional coverage contribute by area weight; min/max
/// consider every pixel with nonzero coverage. Accumulation is in `f64`
/// regardless of the sample type. An empty footprint yields `0.0`.
///
/// The computation is a pure function of its inputs: identical geometry and
/// frame data give bit-identical results.
pub fn compute_zone_value(kind: AggregateKind, footprint: &Footprint, frame: &Frame) -> f64 {
    if footprint.is_empty() {
        return 0.0;
    }

    let mut weight_sum = 0.0f64;
    let mut weighted_sum = 0.0f64;
    let mut weighted_sq_sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    footprint.for_each(|y, x, weight| {
        let value = frame.pixel_value(y, x);
        weight_sum += weight;
        weighted_sum += weight * value;
        weighted_sq_sum += weight * value * value;
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    });

    match kind {
        AggregateKind::Sum => weighted_sum,
        AggregateKind::Mean => weighted_sum / weight_sum,
        AggregateKind::Min => min,
        AggregateKind::Max => max,
        AggregateKind::StdDev => {
            let mean = weighted_sum / weight_sum;
            let variance = (weighted_sq_sum / weight_sum - mean * mean).max(0.0);
            variance.sqrt()
        }
    }
}
