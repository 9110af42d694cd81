//! The analysis session: single entry point for the presentation layer.
//!
//! Owns the frame store, zone registry, and series store, and coordinates
//! background computation. Zone mutations and series invalidation execute
//! synchronously under one write lock, so a series snapshot can never mix
//! values computed under two geometries; all scheduling state lives on a
//! coordinator thread which is also the only writer of computed values.

use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use stackscope_analysis::{
    reduce_stack, AggregateKind, ComputeOutcome, ReduceOp, SeriesStore, Zone, ZoneEvent, ZoneId,
    ZoneRegistry, ZoneShape, ZoneStatisticSeries,
};
use stackscope_core::{
    memory_budget, Frame, FrameShape, Result, SharedFrame, StackscopeError,
};
use stackscope_source::{open_paths, FrameStore, FrameStoreConfig, LoadOptions};

use crate::scheduler::{ComputeJob, JobQueue, JobResult, Priority};
use crate::subscription::{SessionUpdate, SubscriberSet};
use crate::workers::{DataState, WorkerPool};

/// Configuration for an [`AnalysisSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Compute worker threads.
    pub compute_workers: usize,
    /// Bound of the channel feeding workers. Work beyond this bound stays in
    /// the coordinator's queue where it can still be re-prioritized.
    pub job_channel_capacity: usize,
    /// Frame store template; `None` derives the cache capacity from the
    /// decoded frame size and the default byte budget.
    pub store: Option<FrameStoreConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let compute_workers = num_cpus::get().saturating_sub(1).clamp(1, 8);
        Self {
            compute_workers,
            job_channel_capacity: compute_workers * 2,
            store: None,
        }
    }
}

enum Control {
    Schedule(Vec<ComputeJob>),
    SetVisible(Range<usize>),
    CancelZone(ZoneId),
    RetainEpoch(u64),
    Shutdown,
}

struct CoreState {
    registry: ZoneRegistry,
    series: SeriesStore,
    visible: Range<usize>,
    dataset_paths: Vec<PathBuf>,
    load_options: LoadOptions,
}

fn no_dataset() -> StackscopeError {
    StackscopeError::InvalidParameter("No dataset loaded".into())
}

/// Orchestrator over frame cache, zones, and zonal statistics.
pub struct AnalysisSession {
    core: Arc<RwLock<CoreState>>,
    data: Arc<RwLock<DataState>>,
    subscribers: Arc<Mutex<SubscriberSet>>,
    control_tx: Sender<Control>,
    config: SessionConfig,
    coordinator: Option<JoinHandle<()>>,
    workers: Option<WorkerPool>,
}

impl AnalysisSession {
    /// Create a session with no dataset loaded.
    pub fn new(config: SessionConfig) -> Self {
        let (control_tx, control_rx) = unbounded();
        let (zone_tx, zone_rx) = unbounded();
        let (job_tx, job_rx) = bounded(config.job_channel_capacity.max(1));
        let (result_tx, result_rx) = unbounded();

        let mut registry = ZoneRegistry::new();
        registry.set_event_sink(zone_tx);

        let core = Arc::new(RwLock::new(CoreState {
            registry,
            series: SeriesStore::new(0),
            visible: 0..0,
            dataset_paths: Vec::new(),
            load_options: LoadOptions::default(),
        }));
        let data = Arc::new(RwLock::new(DataState::empty()));
        let subscribers = Arc::new(Mutex::new(SubscriberSet::new()));

        let workers = WorkerPool::spawn(
            config.compute_workers,
            Arc::clone(&data),
            job_rx,
            result_tx,
        );

        let coordinator = {
            let core = Arc::clone(&core);
            let data = Arc::clone(&data);
            let subscribers = Arc::clone(&subscribers);
            std::thread::Builder::new()
                .name("session-coordinator".into())
                .spawn(move || {
                    coordinator_loop(
                        control_rx,
                        zone_rx,
                        result_rx,
                        job_tx,
                        core,
                        data,
                        subscribers,
                    )
                })
                .expect("failed to spawn session coordinator")
        };

        Self {
            core,
            data,
            subscribers,
            control_tx,
            config,
            coordinator: Some(coordinator),
            workers: Some(workers),
        }
    }

    fn send(&self, control: Control) {
        let _ = self.control_tx.send(control);
    }

    /// Load a dataset, replacing any previous one.
    ///
    /// On failure the previous dataset and all session state stay untouched.
    /// On success pending work for the prior dataset is cancelled, every
    /// series is reset to the new frame count, and zones are kept.
    pub fn load_dataset(&self, paths: &[PathBuf], options: LoadOptions) -> Result<usize> {
        let source = open_paths(paths, &options)?;
        let shape = source.dataset().shape();
        let store_config = self
            .config
            .store
            .clone()
            .unwrap_or_else(|| FrameStoreConfig::for_frame_bytes(shape.decoded_bytes()));
        let store = Arc::new(FrameStore::new(source, store_config));
        let frame_count = store.frame_count();

        let epoch;
        {
            let mut core = self.core.write();
            {
                let mut data = self.data.write();
                data.epoch += 1;
                epoch = data.epoch;
                data.store = Some(store);
            }
            core.series.reset(frame_count);
            core.visible = 0..0;
            core.dataset_paths = paths.to_vec();
            core.load_options = options;
        }

        self.send(Control::RetainEpoch(epoch));
        self.send(Control::SetVisible(0..0));
        self.subscribers
            .lock()
            .broadcast(&SessionUpdate::DatasetReplaced { frame_count });
        info!(frames = frame_count, "Dataset loaded");
        Ok(frame_count)
    }

    /// Number of frames in the loaded dataset (0 before any load).
    pub fn frame_count(&self) -> usize {
        self.data
            .read()
            .store
            .as_ref()
            .map(|s| s.frame_count())
            .unwrap_or(0)
    }

    /// Shape of the loaded dataset's frames.
    pub fn dataset_shape(&self) -> Option<FrameShape> {
        self.data.read().store.as_ref().map(|s| s.dataset().shape())
    }

    /// Paths the current dataset was loaded from.
    pub fn dataset_paths(&self) -> Vec<PathBuf> {
        self.core.read().dataset_paths.clone()
    }

    /// Options the current dataset was loaded with.
    pub fn load_options(&self) -> LoadOptions {
        self.core.read().load_options.clone()
    }

    /// One decoded frame, for display.
    pub fn frame(&self, index: usize) -> Result<SharedFrame> {
        let store = self.data.read().store.clone().ok_or_else(no_dataset)?;
        store.get(index)
    }

    /// The frame range currently presented to the user.
    ///
    /// Pins the range in the cache, prefetches ahead of it, and boosts the
    /// scheduling priority of series entries inside it. In-flight decodes
    /// are never interrupted; only scheduling order changes.
    pub fn set_visible_range(&self, range: Range<usize>) -> Result<()> {
        let store = self.data.read().store.clone().ok_or_else(no_dataset)?;
        let count = store.frame_count();
        let visible = range.start.min(count)..range.end.min(count);

        store.pin_range(visible.clone());
        store.prefetch(visible.start..(visible.end + memory_budget::PREFETCH_AHEAD).min(count));

        let mut jobs = Vec::new();
        {
            let mut core = self.core.write();
            core.visible = visible.clone();
            let epoch = self.data.read().epoch;
            for zone in core.registry.list() {
                for kind in core.series.kinds_for(zone.id) {
                    let Some(series) = core.series.snapshot(zone.id, kind) else {
                        continue;
                    };
                    for frame_index in series.missing_indices() {
                        if visible.contains(&frame_index) {
                            jobs.push(ComputeJob {
                                zone: zone.id,
                                kind,
                                frame_index,
                                shape: zone.shape.clone(),
                                geometry_version: zone.geometry_version,
                                epoch,
                                priority: Priority::Visible,
                            });
                        }
                    }
                }
            }
        }

        debug!(start = visible.start, end = visible.end, "Visible range changed");
        self.send(Control::SetVisible(visible));
        if !jobs.is_empty() {
            self.send(Control::Schedule(jobs));
        }
        Ok(())
    }

    /// Define a new zone.
    pub fn add_zone(&self, shape: ZoneShape, label: impl Into<String>) -> ZoneId {
        self.core.write().registry.add(shape, label)
    }

    /// Replace a zone's geometry.
    ///
    /// Atomically invalidates every series entry of the zone before
    /// returning; recomputation is enqueued above background work. After
    /// this returns, no series read will ever surface a value computed
    /// under the old geometry.
    pub fn update_zone(&self, id: ZoneId, shape: ZoneShape) -> Result<()> {
        let mut jobs = Vec::new();
        {
            let mut core = self.core.write();
            let geometry_version = core.registry.update(id, shape.clone())?;
            core.series.invalidate_zone(id, geometry_version);

            let epoch = self.data.read().epoch;
            let frame_count = core.series.frame_count();
            for kind in core.series.kinds_for(id) {
                for frame_index in 0..frame_count {
                    jobs.push(ComputeJob {
                        zone: id,
                        kind,
                        frame_index,
                        shape: shape.clone(),
                        geometry_version,
                        epoch,
                        priority: Priority::Invalidation,
                    });
                }
            }
        }

        self.send(Control::CancelZone(id));
        if !jobs.is_empty() {
            self.send(Control::Schedule(jobs));
        }
        Ok(())
    }

    /// Remove a zone, cancelling its pending computations.
    pub fn remove_zone(&self, id: ZoneId) -> Result<()> {
        {
            let mut core = self.core.write();
            core.registry.remove(id)?;
            core.series.remove_zone(id);
        }
        self.send(Control::CancelZone(id));
        Ok(())
    }

    /// All zones in creation order.
    pub fn list_zones(&self) -> Vec<Zone> {
        self.core.read().registry.list()
    }

    /// Current series snapshot for a `(zone, aggregate)` pair.
    ///
    /// Returns immediately; the snapshot may be partially computed. Missing
    /// entries are enqueued for background computation (visible-range
    /// entries at the highest priority) and arrive via subscriptions.
    pub fn series(&self, zone: ZoneId, kind: AggregateKind) -> Result<ZoneStatisticSeries> {
        if self.data.read().store.is_none() {
            return Err(no_dataset());
        }
        let (snapshot, jobs) = {
            let mut core = self.core.write();
            let z = core
                .registry
                .get(zone)
                .cloned()
                .ok_or_else(|| StackscopeError::NotFound(format!("zone {zone}")))?;
            let snapshot = core.series.ensure(zone, kind, z.geometry_version).clone();
            let epoch = self.data.read().epoch;
            let visible = core.visible.clone();
            let jobs: Vec<ComputeJob> = snapshot
                .missing_indices()
                .into_iter()
                .map(|frame_index| ComputeJob {
                    zone,
                    kind,
                    frame_index,
                    shape: z.shape.clone(),
                    geometry_version: z.geometry_version,
                    epoch,
                    priority: if visible.contains(&frame_index) {
                        Priority::Visible
                    } else {
                        Priority::Background
                    },
                })
                .collect();
            (snapshot, jobs)
        };
        if !jobs.is_empty() {
            self.send(Control::Schedule(jobs));
        }
        Ok(snapshot)
    }

    /// Request a series and wait until the visible range is settled.
    ///
    /// Every entry of the target range ends up computed or failed, or the
    /// call gives up after `timeout`. With no visible range set, the whole
    /// series is the target.
    pub fn request_series_blocking(
        &self,
        zone: ZoneId,
        kind: AggregateKind,
        timeout: Duration,
    ) -> Result<ZoneStatisticSeries> {
        let updates = self.subscribe();
        let mut snapshot = self.series(zone, kind)?;
        let deadline = Instant::now() + timeout;

        loop {
            let target = {
                let core = self.core.read();
                if core.visible.is_empty() {
                    0..snapshot.len()
                } else {
                    core.visible.clone()
                }
            };
            if snapshot.is_settled_over(target) {
                return Ok(snapshot);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StackscopeError::Cancelled(
                    "Timed out waiting for series computation".into(),
                ));
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            let _ = updates.recv_timeout(wait);

            snapshot = self
                .core
                .read()
                .series
                .snapshot(zone, kind)
                .ok_or_else(|| StackscopeError::NotFound(format!("zone {zone}")))?;
        }
    }

    /// Re-enqueue failed entries of one series, returning how many.
    ///
    /// Failed entries are only ever retried through this explicit request.
    pub fn retry_failed(&self, zone: ZoneId, kind: AggregateKind) -> Result<usize> {
        let jobs = {
            let mut core = self.core.write();
            let z = core
                .registry
                .get(zone)
                .cloned()
                .ok_or_else(|| StackscopeError::NotFound(format!("zone {zone}")))?;
            let indices = core.series.reset_failed(zone, kind);
            let epoch = self.data.read().epoch;
            indices
                .into_iter()
                .map(|frame_index| ComputeJob {
                    zone,
                    kind,
                    frame_index,
                    shape: z.shape.clone(),
                    geometry_version: z.geometry_version,
                    epoch,
                    priority: Priority::Visible,
                })
                .collect::<Vec<_>>()
        };
        let count = jobs.len();
        if !jobs.is_empty() {
            self.send(Control::Schedule(jobs));
        }
        Ok(count)
    }

    /// Collapse a frame range into a single per-pixel reduction image.
    ///
    /// Blocking: frames are fetched through the cache on the calling thread.
    pub fn reduce_frames(&self, range: Range<usize>, op: ReduceOp) -> Result<Frame> {
        let store = self.data.read().store.clone().ok_or_else(no_dataset)?;
        let count = store.frame_count();
        if range.is_empty() {
            return Err(StackscopeError::InvalidParameter(
                "Empty frame range in reduction".into(),
            ));
        }
        if range.end > count {
            return Err(StackscopeError::IndexOutOfRange {
                index: range.end - 1,
                count,
            });
        }
        let frames = range.map(|i| store.get(i)).collect::<Result<Vec<_>>>()?;
        reduce_stack(&frames, op)
    }

    /// Register for incremental updates.
    pub fn subscribe(&self) -> Receiver<SessionUpdate> {
        self.subscribers.lock().subscribe()
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.send(Control::Shutdown);
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
        // The coordinator dropped the job channel; workers drain and exit.
        self.workers.take();
    }
}

fn coordinator_loop(
    control_rx: Receiver<Control>,
    zone_rx: Receiver<ZoneEvent>,
    result_rx: Receiver<JobResult>,
    job_tx: Sender<ComputeJob>,
    core: Arc<RwLock<CoreState>>,
    data: Arc<RwLock<DataState>>,
    subscribers: Arc<Mutex<SubscriberSet>>,
) {
    let mut queue = JobQueue::new();

    loop {
        crossbeam_channel::select! {
            recv(control_rx) -> msg => {
                let Ok(control) = msg else { break };
                match control {
                    Control::Schedule(jobs) => {
                        for job in jobs {
                            queue.push(job);
                        }
                    }
                    Control::SetVisible(range) => queue.set_visible(range),
                    Control::CancelZone(zone) => queue.cancel_zone(zone),
                    Control::RetainEpoch(epoch) => queue.retain_epoch(epoch),
                    Control::Shutdown => break,
                }
            }
            recv(zone_rx) -> msg => {
                let Ok(event) = msg else { break };
                subscribers.lock().broadcast(&SessionUpdate::ZoneChanged(event));
            }
            recv(result_rx) -> msg => {
                let Ok(result) = msg else { break };
                apply_results(result, &result_rx, &core, &data, &subscribers);
            }
        }
        dispatch_jobs(&mut queue, &job_tx);
    }
}

/// Feed queued jobs to the workers until their channel is full.
fn dispatch_jobs(queue: &mut JobQueue, job_tx: &Sender<ComputeJob>) {
    while let Some(job) = queue.pop() {
        match job_tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                queue.push(job);
                break;
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
}

/// Apply a batch of results and notify subscribers once per series.
fn apply_results(
    first: JobResult,
    result_rx: &Receiver<JobResult>,
    core: &Arc<RwLock<CoreState>>,
    data: &Arc<RwLock<DataState>>,
    subscribers: &Arc<Mutex<SubscriberSet>>,
) {
    let mut updated: HashMap<(ZoneId, AggregateKind), Vec<usize>> = HashMap::new();
    let mut failed: HashMap<(ZoneId, AggregateKind), Vec<usize>> = HashMap::new();

    let epoch = data.read().epoch;
    {
        let mut core = core.write();
        let mut apply = |result: JobResult| {
            if result.epoch != epoch {
                return;
            }
            let accepted = core.series.apply(
                result.zone,
                result.kind,
                result.frame_index,
                result.geometry_version,
                &result.outcome,
            );
            if accepted {
                let bucket = match result.outcome {
                    ComputeOutcome::Value(_) => &mut updated,
                    ComputeOutcome::Failed(_) => &mut failed,
                };
                bucket
                    .entry((result.zone, result.kind))
                    .or_default()
                    .push(result.frame_index);
            }
        };
        apply(first);
        for result in result_rx.try_iter().take(256) {
            apply(result);
        }
    }

    let mut subscribers = subscribers.lock();
    for ((zone, kind), frames) in updated {
        subscribers.broadcast(&SessionUpdate::SeriesUpdated { zone, kind, frames });
    }
    for ((zone, kind), frames) in failed {
        subscribers.broadcast(&SessionUpdate::SeriesFailed { zone, kind, frames });
    }
}
