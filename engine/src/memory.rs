//! In-memory backend.
//!
//! Runs every batch on a [`ThreadPool`] against one [`Store`] behind a mutex.
//! Stream snapshots and change broadcasts happen while that mutex is held, so
//! each stream observes a single total order of changes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::{
    error::Result, make_promise, Backend, DataStream, Error, Hotel, Operation, StreamChange,
    StreamHandle, StreamObserver, StreamableItems, StreamableType, Store, Task, TaskHandle,
    TaskResult, ThreadPool,
};

/// The only endpoint this backend serves.
pub const DEFAULT_ENDPOINT: &str = "default";

struct Shared {
    store: Mutex<Store>,
    streams: Mutex<Vec<Arc<DataStream>>>,
    next_stream_id: AtomicI64,
    next_task_id: AtomicI64,
}

impl Shared {
    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn streams(&self) -> MutexGuard<'_, Vec<Arc<DataStream>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `change` to every initialized stream of `kind`.
    ///
    /// Callers hold the store lock.
    fn broadcast(&self, _store: &Store, kind: StreamableType, change: &StreamChange) {
        let mut streams = self.streams();
        streams.retain(|s| s.is_valid());
        for stream in streams.iter() {
            if stream.kind() == kind && stream.is_initialized() {
                stream.apply_change(change.clone());
            }
        }
    }

    fn deliver_snapshot(&self, stream: &DataStream) {
        let store = self.store();
        if let Some(items) = store.snapshot(stream.kind()) {
            if !items.is_empty() {
                stream.apply_change(StreamChange::ItemsAdded(items));
            }
        }
        stream.apply_change(StreamChange::Initialized);
        debug!(stream = stream.id(), "stream initialized");
    }

    fn run_batch(&self, task: i64, operations: Vec<Operation>) -> Vec<TaskResult> {
        let mut store = self.store();
        operations
            .into_iter()
            .map(|op| {
                let kind = op.kind();
                let result = store.apply(op).map(|applied| {
                    self.broadcast(&store, StreamableType::Reservation, &applied.change);
                    applied.reservation_id
                });
                if let Err(e) = &result {
                    warn!(task, op = kind, "operation failed: {e}");
                }
                TaskResult::from(result)
            })
            .collect()
    }
}

/// Backend keeping all data in memory.
///
/// Cloning is cheap; clones share data and workers.
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
    pool: ThreadPool,
}

impl MemoryBackend {
    /// Create an empty backend with `workers` worker threads.
    pub fn new(workers: usize) -> Self {
        Self::with_store(Store::new(), workers)
    }

    /// Create a backend serving `store`.
    pub fn with_store(store: Store, workers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                streams: Mutex::new(Vec::new()),
                next_stream_id: AtomicI64::new(1),
                next_task_id: AtomicI64::new(1),
            }),
            pool: ThreadPool::with_name(workers, "lodge-backend"),
        }
    }

    /// Number of streams that still have an observer.
    pub fn stream_count(&self) -> usize {
        self.shared.streams().iter().filter(|s| s.is_valid()).count()
    }

    /// Number of stored reservations.
    pub fn reservation_count(&self) -> usize {
        self.shared.store().reservation_count()
    }

    /// Insert or replace a hotel and notify hotel streams.
    pub fn put_hotel(&self, hotel: Hotel) {
        let shared = Arc::clone(&self.shared);
        self.pool.execute(move || {
            let mut store = shared.store();
            let change = if store.hotel(hotel.id).is_some() {
                StreamChange::ItemsUpdated(StreamableItems::Hotels(vec![hotel.clone()]))
            } else {
                StreamChange::ItemsAdded(StreamableItems::Hotels(vec![hotel.clone()]))
            };
            store.put_hotel(hotel);
            shared.broadcast(&store, StreamableType::Hotel, &change);
        });
    }

    /// Drop every reservation and tell reservation streams to forget theirs.
    pub fn clear_reservations(&self) {
        let shared = Arc::clone(&self.shared);
        self.pool.execute(move || {
            let mut store = shared.store();
            let change = store.clear_reservations();
            shared.broadcast(&store, StreamableType::Reservation, &change);
            info!("reservations cleared");
        });
    }
}

impl Backend for MemoryBackend {
    fn create_stream(
        &self,
        observer: Arc<dyn StreamObserver>,
        kind: StreamableType,
        endpoint: &str,
        options: serde_json::Value,
    ) -> Result<StreamHandle> {
        if endpoint != DEFAULT_ENDPOINT {
            return Err(Error::UnknownEndpoint(endpoint.to_string()));
        }

        let id = self.shared.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let stream = Arc::new(DataStream::new(id, kind, endpoint, options, observer));
        self.shared.streams().push(Arc::clone(&stream));
        debug!(stream = id, ?kind, "stream created");

        let shared = Arc::clone(&self.shared);
        let snapshot_target = Arc::clone(&stream);
        self.pool
            .execute(move || shared.deliver_snapshot(&snapshot_target));

        Ok(StreamHandle::new(stream))
    }

    fn queue_operations(&self, operations: Vec<Operation>) -> Task {
        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (handle, token) = TaskHandle::new(id);
        let (results, promise) = make_promise();
        debug!(task = id, operations = operations.len(), "task queued");

        let shared = Arc::clone(&self.shared);
        self.pool.execute(move || {
            let results = shared.run_batch(id, operations);
            if token.is_released() {
                debug!(task = id, "task released, dropping results");
                return;
            }
            promise.resolve(results);
        });

        Task { handle, results }
    }
}
