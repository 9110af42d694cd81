//! Dataset descriptors produced by probing a path set.
//!
//! A [`Dataset`] is immutable once opened: loading new data always builds a
//! new dataset, never mutates an old one.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use stackscope_core::{FrameShape, Result, SampleType, StackscopeError};

/// Where the encoded bytes of one frame live.
#[derive(Debug, Clone)]
pub enum FrameLocation {
    /// A standalone image file holding exactly this frame.
    File(PathBuf),
    /// A byte offset into a shared container file.
    Offset(u64),
}

/// Descriptor for one frame of a dataset.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    /// Where to read the frame from.
    pub location: FrameLocation,
    /// Human-readable origin (file name, or `name-<index>` for containers).
    pub source_name: String,
    /// Encoded size in bytes.
    pub byte_size: u64,
}

/// Ordered, immutable description of a loaded frame sequence.
#[derive(Debug, Clone)]
pub struct Dataset {
    shape: FrameShape,
    sample_type: SampleType,
    frames: Vec<FrameDescriptor>,
}

impl Dataset {
    /// Build a dataset from probed descriptors.
    ///
    /// Fails when the descriptor list is empty; every other shape/type
    /// consistency check happens before this point, in the format probes.
    pub fn new(
        shape: FrameShape,
        sample_type: SampleType,
        frames: Vec<FrameDescriptor>,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(StackscopeError::Format(
                "Dataset contains no frames".into(),
            ));
        }
        Ok(Self {
            shape,
            sample_type,
            frames,
        })
    }

    /// Shape shared by every frame.
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// On-disk sample datatype.
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the dataset has no frames (never constructed; kept for API
    /// symmetry).
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Descriptor for a frame index.
    pub fn descriptor(&self, index: usize) -> Result<&FrameDescriptor> {
        self.frames
            .get(index)
            .ok_or(StackscopeError::IndexOutOfRange {
                index,
                count: self.frames.len(),
            })
    }

    /// Total decoded size of the dataset in bytes.
    pub fn decoded_bytes(&self) -> usize {
        self.shape.decoded_bytes() * self.frames.len()
    }
}

/// Options applied while opening a dataset.
///
/// Mirrors the knobs of an interactive loader: keep every n-th frame, cap
/// the decoded size in memory, collapse color to grayscale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Keep every `step`-th frame (1 keeps everything).
    pub step: usize,
    /// Decoded-size cap; raises the effective step until the kept frames fit.
    pub max_bytes: Option<usize>,
    /// Collapse color channels to luma (Rec. 601 weights).
    pub grayscale: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            step: 1,
            max_bytes: None,
            grayscale: false,
        }
    }
}

impl LoadOptions {
    /// The subsampling step after applying the memory cap.
    pub fn effective_step(&self, frame_bytes: usize, total_frames: usize) -> usize {
        let step = self.step.max(1);
        let Some(max_bytes) = self.max_bytes else {
            return step;
        };
        if max_bytes == 0 || frame_bytes == 0 {
            return step;
        }
        let total = frame_bytes.saturating_mul(total_frames);
        if total <= max_bytes {
            return step;
        }
        // Smallest step with kept_frames * frame_bytes <= max_bytes.
        let needed = total.div_ceil(max_bytes);
        step.max(needed)
    }

    /// Indices kept by the effective step, in order.
    pub fn kept_indices(&self, frame_bytes: usize, total_frames: usize) -> Vec<usize> {
        let step = self.effective_step(frame_bytes, total_frames);
        (0..total_frames).step_by(step).collect()
    }
}
