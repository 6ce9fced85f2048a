//! Data streams - ordered change feeds over one collection.
//!
//! A backend creates one [`DataStream`] per subscription and pushes
//! [`StreamChange`]s into it. The stream forwards each change to its
//! [`StreamObserver`] for as long as one is connected. The subscriber keeps a
//! [`StreamHandle`]; dropping the handle disconnects the observer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{Error, ReservationId, StreamId, StreamableItems};

/// Native data kinds a stream can carry.
///
/// Encoded on the wire as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum StreamableType {
    Null = 0,
    Hotel = 1,
    Reservation = 2,
}

impl TryFrom<i64> for StreamableType {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StreamableType::Null),
            1 => Ok(StreamableType::Hotel),
            2 => Ok(StreamableType::Reservation),
            other => Err(Error::InvalidStreamType(other)),
        }
    }
}

impl From<StreamableType> for i64 {
    fn from(value: StreamableType) -> Self {
        value as i64
    }
}

/// Receiver of stream changes.
///
/// Calls for one stream arrive in a single total order. Items that make up the
/// initial snapshot arrive through `items_added` before `initialized`.
pub trait StreamObserver: Send + Sync {
    fn items_added(&self, items: &StreamableItems);
    fn items_updated(&self, items: &StreamableItems);
    fn items_removed(&self, ids: &[ReservationId]);
    /// All previously delivered items are gone.
    fn cleared(&self);
    /// The initial snapshot is complete.
    fn initialized(&self);
}

/// One change on a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChange {
    ItemsAdded(StreamableItems),
    ItemsUpdated(StreamableItems),
    ItemsRemoved(Vec<ReservationId>),
    Initialized,
    Cleared,
}

struct Connection {
    initialized: bool,
    observer: Option<Arc<dyn StreamObserver>>,
}

/// Writable backend side of a stream.
pub struct DataStream {
    id: StreamId,
    kind: StreamableType,
    endpoint: String,
    options: serde_json::Value,
    connection: Mutex<Connection>,
}

impl DataStream {
    /// Create a stream already connected to `observer`.
    pub fn new(
        id: StreamId,
        kind: StreamableType,
        endpoint: impl Into<String>,
        options: serde_json::Value,
        observer: Arc<dyn StreamObserver>,
    ) -> Self {
        Self {
            id,
            kind,
            endpoint: endpoint.into(),
            options,
            connection: Mutex::new(Connection {
                initialized: false,
                observer: Some(observer),
            }),
        }
    }

    /// Server-side identity of this stream.
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn kind(&self) -> StreamableType {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    /// Whether an observer is still listening.
    pub fn is_valid(&self) -> bool {
        self.lock().observer.is_some()
    }

    /// Whether the initial snapshot has been delivered.
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Detach the observer. Idempotent.
    ///
    /// Waits for a delivery that is in progress; no change reaches the
    /// observer once this returns.
    pub fn disconnect(&self) {
        let observer = self.lock().observer.take();
        drop(observer);
    }

    /// Deliver one change to the observer, if any.
    pub fn apply_change(&self, change: StreamChange) {
        let mut connection = self.lock();
        if matches!(change, StreamChange::Initialized) {
            connection.initialized = true;
        }
        let Some(observer) = connection.observer.as_ref() else {
            return;
        };

        match &change {
            StreamChange::ItemsAdded(items) => observer.items_added(items),
            StreamChange::ItemsUpdated(items) => observer.items_updated(items),
            StreamChange::ItemsRemoved(ids) => observer.items_removed(ids),
            StreamChange::Initialized => observer.initialized(),
            StreamChange::Cleared => observer.cleared(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Subscriber-side handle of a stream.
///
/// Dropping the handle disconnects the observer.
#[derive(Debug)]
pub struct StreamHandle {
    stream: Arc<DataStream>,
}

impl StreamHandle {
    pub fn new(stream: Arc<DataStream>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &DataStream {
        &self.stream
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stream.disconnect();
    }
}
