//! Frame buffer types for decoded frames in CPU memory.
//!
//! A [`Frame`] is one time index of a dataset, decoded to `f32` samples in
//! `(height, width, channel)` order. Frames are immutable once decoded and
//! shared as [`SharedFrame`]; derived edits always produce a new frame.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, StackscopeError};

/// Spatial shape of every frame in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameShape {
    /// Rows.
    pub height: u32,
    /// Columns.
    pub width: u32,
    /// Samples per pixel (1 for grayscale, 3 for RGB).
    pub channels: u32,
}

impl FrameShape {
    /// Create a new shape.
    pub const fn new(height: u32, width: u32, channels: u32) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Total samples in one frame.
    pub fn num_samples(self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }

    /// In-memory size of one decoded frame in bytes (`f32` samples).
    pub fn decoded_bytes(self) -> usize {
        self.num_samples() * std::mem::size_of::<f32>()
    }
}

/// A decoded frame for one time index.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: usize,
    samples: Array3<f32>,
}

impl Frame {
    /// Wrap a decoded sample array.
    ///
    /// Fails when the array dimensions disagree with `shape`.
    pub fn from_samples(index: usize, shape: FrameShape, samples: Array3<f32>) -> Result<Self> {
        let dim = samples.dim();
        if dim
            != (
                shape.height as usize,
                shape.width as usize,
                shape.channels as usize,
            )
        {
            return Err(StackscopeError::InvalidParameter(format!(
                "Sample array {:?} does not match frame shape {}x{}x{}",
                dim, shape.height, shape.width, shape.channels
            )));
        }
        Ok(Self { index, samples })
    }

    /// Create a frame filled with a constant value.
    pub fn filled(index: usize, shape: FrameShape, value: f32) -> Self {
        Self {
            index,
            samples: Array3::from_elem(
                (
                    shape.height as usize,
                    shape.width as usize,
                    shape.channels as usize,
                ),
                value,
            ),
        }
    }

    /// Frame index within its dataset.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Shape of this frame.
    pub fn shape(&self) -> FrameShape {
        let (h, w, c) = self.samples.dim();
        FrameShape::new(h as u32, w as u32, c as u32)
    }

    /// Read-only view of the sample array.
    #[inline]
    pub fn samples(&self) -> ArrayView3<'_, f32> {
        self.samples.view()
    }

    /// One sample value.
    #[inline]
    pub fn sample(&self, y: u32, x: u32, channel: u32) -> f32 {
        self.samples[(y as usize, x as usize, channel as usize)]
    }

    /// Mean of the channel values at one pixel.
    ///
    /// Single-channel frames return the sample itself; this is the scalar
    /// value zonal aggregates operate on.
    #[inline]
    pub fn pixel_value(&self, y: u32, x: u32) -> f64 {
        let (_, _, c) = self.samples.dim();
        if c == 1 {
            return f64::from(self.samples[(y as usize, x as usize, 0)]);
        }
        let mut acc = 0.0f64;
        for ch in 0..c {
            acc += f64::from(self.samples[(y as usize, x as usize, ch)]);
        }
        acc / c as f64
    }

    /// Memory used by the decoded samples in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Arc-wrapped frame for shared ownership between cache and workers.
pub type SharedFrame = Arc<Frame>;
