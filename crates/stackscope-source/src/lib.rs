//! Stackscope Source - Dataset I/O and frame caching
//!
//! This crate streams frame stacks from disk without holding them whole in
//! memory:
//! - Format probing and decoding behind the [`FrameSource`] trait
//!   (image sequences, NPY stack containers)
//! - [`FrameStore`], the bounded LRU cache with pinning and prefetch

pub mod dataset;
pub mod sequence;
pub mod source;
pub mod stack;
pub mod store;

pub use dataset::{Dataset, FrameDescriptor, FrameLocation, LoadOptions};
pub use sequence::ImageSequenceSource;
pub use source::{open_paths, FrameSource, SharedFrameSource};
pub use stack::NpyStackSource;
pub use store::{FrameStore, FrameStoreConfig};
