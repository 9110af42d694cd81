//! Stackscope Session - Orchestration of cache, zones, and statistics
//!
//! This crate ties the stack together behind one API consumed by the
//! presentation layer:
//! - [`AnalysisSession`], the single entry point
//! - Priority scheduling of version-stamped compute jobs
//! - A bounded worker pool for decode + aggregate computation
//! - Subscriptions for progressive redraws
//! - Saved-session persistence (zones + dataset reference, never series)

pub mod persist;
pub mod scheduler;
pub mod session;
pub mod subscription;
pub mod workers;

pub use persist::{SavedZone, SessionFile};
pub use scheduler::{ComputeJob, JobQueue, JobResult, Priority};
pub use session::{AnalysisSession, SessionConfig};
pub use subscription::{SessionUpdate, SubscriberSet};
pub use workers::WorkerPool;
