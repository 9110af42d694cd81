//! Bounded worker pool executing compute jobs.
//!
//! Workers pull jobs from a bounded channel, fetch the frame through the
//! current [`FrameStore`], rasterize the zone footprint (memoized per
//! geometry version), and report a [`JobResult`]. A job whose epoch no
//! longer matches the live dataset is dropped without computing.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::trace;

use stackscope_analysis::{compute_zone_value, Footprint, ZoneId};
use stackscope_source::FrameStore;

use crate::scheduler::{ComputeJob, JobResult};

/// The dataset currently backing the session.
///
/// Replaced wholesale on `load_dataset`; the epoch lets stamped work from a
/// previous dataset be recognized and discarded.
pub struct DataState {
    pub epoch: u64,
    pub store: Option<Arc<FrameStore>>,
}

impl DataState {
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            store: None,
        }
    }
}

/// Handles of the spawned compute workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers.
    ///
    /// Workers exit when the job channel closes; dropping the pool joins
    /// them.
    pub fn spawn(
        count: usize,
        data: Arc<RwLock<DataState>>,
        jobs: Receiver<ComputeJob>,
        results: Sender<JobResult>,
    ) -> Self {
        let handles = (0..count.max(1))
            .map(|worker| {
                let data = Arc::clone(&data);
                let jobs = jobs.clone();
                let results = results.clone();
                std::thread::Builder::new()
                    .name(format!("zonal-compute-{worker}"))
                    .spawn(move || worker_loop(data, jobs, results))
                    .expect("failed to spawn compute worker")
            })
            .collect();
        Self { handles }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    data: Arc<RwLock<DataState>>,
    jobs: Receiver<ComputeJob>,
    results: Sender<JobResult>,
) {
    // Footprints are pure functions of (geometry version, frame shape), so
    // one rasterization serves a whole series.
    let mut footprints: HashMap<(ZoneId, u64), Footprint> = HashMap::new();
    let mut footprint_epoch = 0u64;

    while let Ok(job) = jobs.recv() {
        let store = {
            let state = data.read();
            if state.epoch != job.epoch {
                trace!(epoch = job.epoch, "Dropping job from a prior dataset");
                continue;
            }
            match &state.store {
                Some(store) => Arc::clone(store),
                None => continue,
            }
        };

        if footprint_epoch != job.epoch || footprints.len() > 64 {
            footprints.clear();
            footprint_epoch = job.epoch;
        }
        let footprint = footprints
            .entry((job.zone, job.geometry_version))
            .or_insert_with(|| Footprint::compute(&job.shape, store.dataset().shape()));

        let outcome = match store.get(job.frame_index) {
            Ok(frame) => stackscope_analysis::ComputeOutcome::Value(compute_zone_value(
                job.kind, footprint, &frame,
            )),
            Err(e) => stackscope_analysis::ComputeOutcome::Failed(e.to_string()),
        };

        let result = JobResult {
            zone: job.zone,
            kind: job.kind,
            frame_index: job.frame_index,
            geometry_version: job.geometry_version,
            epoch: job.epoch,
            outcome,
        };
        if results.send(result).is_err() {
            break;
        }
    }
}
