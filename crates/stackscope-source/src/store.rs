//! Bounded in-memory cache of decoded frames.
//!
//! Keeps at most `capacity` decoded frames, evicting least-recently-used
//! entries first but never frames inside the pinned (visible) range. Decode
//! happens outside the cache lock; all cache mutation goes through one
//! critical section.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use stackscope_core::{memory_budget, Result, SharedFrame};

use crate::dataset::Dataset;
use crate::source::SharedFrameSource;

/// Configuration for a [`FrameStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameStoreConfig {
    /// Maximum resident decoded frames (pinned frames may exceed this).
    pub capacity: usize,
    /// Background decode threads serving `prefetch`.
    pub prefetch_workers: usize,
    /// Bound of the prefetch queue; a full queue drops requests.
    pub prefetch_queue: usize,
}

impl Default for FrameStoreConfig {
    fn default() -> Self {
        Self {
            capacity: memory_budget::DEFAULT_CACHE_FRAMES,
            prefetch_workers: num_cpus::get().saturating_sub(1).clamp(1, 4),
            prefetch_queue: 256,
        }
    }
}

impl FrameStoreConfig {
    /// Derive a capacity from the default cache byte budget and a frame size.
    pub fn for_frame_bytes(frame_bytes: usize) -> Self {
        Self {
            capacity: memory_budget::frames_for_budget(
                frame_bytes,
                memory_budget::FRAME_CACHE_BYTES,
            ),
            ..Default::default()
        }
    }
}

struct CacheEntry {
    frame: SharedFrame,
    last_access: u64,
}

struct CacheState {
    entries: HashMap<usize, CacheEntry>,
    tick: u64,
    capacity: usize,
    pinned: Range<usize>,
}

impl CacheState {
    /// Evict unpinned LRU entries until within capacity.
    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(index, _)| !self.pinned.contains(index))
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(index, _)| *index);
            match victim {
                Some(index) => {
                    trace!(index, "Evicting cached frame");
                    self.entries.remove(&index);
                }
                // Everything over capacity is pinned; allowed to stay.
                None => break,
            }
        }
    }
}

struct StoreShared {
    source: SharedFrameSource,
    cache: Mutex<CacheState>,
}

impl StoreShared {
    /// Insert a decoded frame, keeping the first insert on a race, and evict.
    fn insert(&self, index: usize, frame: SharedFrame) -> SharedFrame {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;
        let entry = cache
            .entries
            .entry(index)
            .or_insert(CacheEntry { frame, last_access: tick });
        entry.last_access = tick;
        let resident = entry.frame.clone();
        cache.evict();
        resident
    }

    fn lookup(&self, index: usize) -> Option<SharedFrame> {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;
        let entry = cache.entries.get_mut(&index)?;
        entry.last_access = tick;
        Some(entry.frame.clone())
    }
}

/// Bounded cache of decoded frames with LRU eviction, pinning, and prefetch.
pub struct FrameStore {
    shared: Arc<StoreShared>,
    prefetch_tx: Option<Sender<usize>>,
    workers: Vec<JoinHandle<()>>,
}

impl FrameStore {
    /// Create a store over a frame source.
    pub fn new(source: SharedFrameSource, config: FrameStoreConfig) -> Self {
        let shared = Arc::new(StoreShared {
            source,
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
                capacity: config.capacity.max(1),
                pinned: 0..0,
            }),
        });

        let (tx, rx) = bounded(config.prefetch_queue.max(1));
        let workers = (0..config.prefetch_workers.max(1))
            .map(|worker| {
                let shared = Arc::clone(&shared);
                let rx: Receiver<usize> = rx.clone();
                std::thread::Builder::new()
                    .name(format!("frame-prefetch-{worker}"))
                    .spawn(move || prefetch_worker(shared, rx))
                    .expect("failed to spawn prefetch worker")
            })
            .collect();

        Self {
            shared,
            prefetch_tx: Some(tx),
            workers,
        }
    }

    /// The dataset behind this store.
    pub fn dataset(&self) -> &Dataset {
        self.shared.source.dataset()
    }

    /// Number of frames in the dataset.
    pub fn frame_count(&self) -> usize {
        self.shared.source.dataset().len()
    }

    /// Get a frame, decoding on miss.
    ///
    /// The decode runs on the calling thread and is the only suspension
    /// point; cache hits return immediately. Failed decodes are not cached
    /// and are retried on the next call.
    pub fn get(&self, index: usize) -> Result<SharedFrame> {
        if let Some(frame) = self.shared.lookup(index) {
            return Ok(frame);
        }
        let frame = Arc::new(self.shared.source.read_frame(index)?);
        Ok(self.shared.insert(index, frame))
    }

    /// Schedule background decoding of a frame range; best-effort.
    pub fn prefetch(&self, range: Range<usize>) {
        let Some(tx) = &self.prefetch_tx else { return };
        let count = self.frame_count();
        for index in range {
            if index >= count || self.contains(index) {
                continue;
            }
            match tx.try_send(index) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(index, "Prefetch queue full, dropping request");
                    break;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }

    /// Pin a frame range against eviction (the visible range).
    pub fn pin_range(&self, range: Range<usize>) {
        self.shared.cache.lock().pinned = range;
    }

    /// Reconfigure the capacity bound, evicting immediately if exceeded.
    pub fn set_capacity(&self, capacity: usize) {
        let mut cache = self.shared.cache.lock();
        cache.capacity = capacity.max(1);
        cache.evict();
    }

    /// Whether a frame is currently resident.
    pub fn contains(&self, index: usize) -> bool {
        self.shared.cache.lock().entries.contains_key(&index)
    }

    /// Number of resident decoded frames.
    pub fn resident_frames(&self) -> usize {
        self.shared.cache.lock().entries.len()
    }
}

impl Drop for FrameStore {
    fn drop(&mut self) {
        // Closing the channel stops the workers after their current decode.
        self.prefetch_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn prefetch_worker(shared: Arc<StoreShared>, rx: Receiver<usize>) {
    while let Ok(index) = rx.recv() {
        {
            let cache = shared.cache.lock();
            if cache.entries.contains_key(&index) {
                continue;
            }
            // Under memory pressure an unpinned prefetch would only churn
            // the cache; skip it.
            if cache.entries.len() >= cache.capacity && !cache.pinned.contains(&index) {
                trace!(index, "Skipping prefetch under memory pressure");
                continue;
            }
        }
        match shared.source.read_frame(index) {
            Ok(frame) => {
                shared.insert(index, Arc::new(frame));
            }
            Err(e) => debug!(index, error = %e, "Prefetch decode failed"),
        }
    }
}
