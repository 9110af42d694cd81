//! Temporal reductions across a frame range.
//!
//! Collapses a stack of frames into a single per-pixel image (the "mean
//! image", "max image", ...), the stack-wide counterpart of per-frame zonal
//! aggregates. Rows are processed in parallel; accumulation is in `f64`.

use ndarray::Array3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use stackscope_core::{Frame, Result, SharedFrame, StackscopeError};

/// Per-pixel reduction across time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    Mean,
    Min,
    Max,
    /// Population standard deviation.
    Std,
}

impl ReduceOp {
    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
        }
    }
}

/// Reduce a stack of frames to one frame.
///
/// All frames must share one shape. The result carries frame index 0; it is
/// a derived image, not a member of the dataset.
pub fn reduce_stack(frames: &[SharedFrame], op: ReduceOp) -> Result<Frame> {
    let first = frames.first().ok_or_else(|| {
        StackscopeError::InvalidParameter("Cannot reduce an empty frame stack".into())
    })?;
    let shape = first.shape();
    for frame in frames {
        if frame.shape() != shape {
            return Err(StackscopeError::InvalidParameter(format!(
                "Frame shapes disagree in reduction: {:?} vs {:?}",
                frame.shape(),
                shape
            )));
        }
    }

    let height = shape.height as usize;
    let width = shape.width as usize;
    let channels = shape.channels as usize;
    let count = frames.len() as f64;

    let rows: Vec<Vec<f32>> = (0..height)
        .into_par_iter()
        .map(|y| {
            let mut row = vec![0.0f32; width * channels];
            for x in 0..width {
                for c in 0..channels {
                    let mut sum = 0.0f64;
                    let mut sq_sum = 0.0f64;
                    let mut min = f64::INFINITY;
                    let mut max = f64::NEG_INFINITY;
                    for frame in frames {
                        let v = f64::from(frame.sample(y as u32, x as u32, c as u32));
                        sum += v;
                        sq_sum += v * v;
                        if v < min {
                            min = v;
                        }
                        if v > max {
                            max = v;
                        }
                    }
                    let value = match op {
                        ReduceOp::Mean => sum / count,
                        ReduceOp::Min => min,
                        ReduceOp::Max => max,
                        ReduceOp::Std => {
                            let mean = sum / count;
                            (sq_sum / count - mean * mean).max(0.0).sqrt()
                        }
                    };
                    row[x * channels + c] = value as f32;
                }
            }
            row
        })
        .collect();

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    let samples = Array3::from_shape_vec((height, width, channels), flat)
        .map_err(|e| StackscopeError::InvalidParameter(e.to_string()))?;
    Frame::from_samples(0, shape, samples)
}
