//! Sample datatypes for frame pixel values.
//!
//! Frames are held in memory as `f32` regardless of the on-disk type; the
//! dataset keeps its [`SampleType`] so consumers know the natural value range.

use serde::{Deserialize, Serialize};

/// On-disk sample datatype of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleType {
    /// 8-bit unsigned integer samples.
    #[default]
    U8,
    /// 16-bit unsigned integer samples.
    U16,
    /// 32-bit IEEE float samples.
    F32,
}

impl SampleType {
    /// Bytes per sample on disk.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    /// Natural value range of the type, `(min, max)`.
    ///
    /// For floats this is the conventional normalized display range, not the
    /// representable range; statistics are never clamped to it.
    pub fn natural_range(self) -> (f64, f64) {
        match self {
            Self::U8 => (0.0, 255.0),
            Self::U16 => (0.0, 65535.0),
            Self::F32 => (0.0, 1.0),
        }
    }

    /// Short lowercase name, matching NPY descriptors where applicable.
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u1",
            Self::U16 => "u2",
            Self::F32 => "f4",
        }
    }
}
