//! # Lodge Engine
//!
//! The asynchronous core behind Lodge sessions.
//!
//! This crate knows nothing about sockets. It provides the building blocks a
//! connection-oriented server uses to talk to a storage backend without ever
//! blocking its network loop.
//!
//! ## Core Concepts
//!
//! ### Futures and executors
//!
//! [`make_promise`] creates a [`Future`]/[`Promise`] pair. Results travel from
//! the producer to the consumer exactly once, either by blocking on
//! [`Future::get`] or by chaining with [`Future::then`], which runs the next
//! step on an explicit [`Executor`] such as a [`ThreadPool`].
//!
//! ### Streams
//!
//! A stream is a subscription to one collection. The backend pushes
//! [`StreamChange`]s into a [`DataStream`], which forwards them to its
//! [`StreamObserver`] until the subscriber drops its [`StreamHandle`].
//!
//! ### Tasks
//!
//! Clients mutate data with batches of [`Operation`]s. A batch becomes a
//! [`Task`]: a [`TaskHandle`] plus a future of one [`TaskResult`] per
//! operation.
//!
//! ### Backends
//!
//! The [`Backend`] trait is the seam between sessions and storage.
//! [`MemoryBackend`] implements it over an in-memory [`Store`], optionally
//! seeded from a [`Dataset`].
//!
//! ## Quick Start
//!
//! ```rust
//! use lodge_engine::{Backend, MemoryBackend, Operation, TaskResult};
//!
//! let backend = MemoryBackend::new(2);
//! let task = backend.queue_operations(vec![Operation::DeleteReservation(42)]);
//!
//! let results = task.results.get();
//! assert!(matches!(results[0], TaskResult::Error { .. }));
//! ```

pub mod backend;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod executor;
pub mod future;
pub mod memory;
pub mod operation;
pub mod store;
pub mod stream;
pub mod task;

// Re-export main types at crate root
pub use backend::Backend;
pub use dataset::{Dataset, DATASET_FORMAT_VERSION};
pub use domain::{Hotel, Reservation, ReservationStatus, Room, StreamableItems};
pub use error::{Error, Result};
pub use executor::{Executor, InlineExecutor, Job, ThreadPool};
pub use future::{make_promise, Future, Promise};
pub use memory::{MemoryBackend, DEFAULT_ENDPOINT};
pub use operation::{decode_batch, DecodedBatch, Operation};
pub use store::{ApplyResult, Store};
pub use stream::{DataStream, StreamChange, StreamHandle, StreamObserver, StreamableType};
pub use task::{Task, TaskHandle, TaskResult, TaskToken};

/// Type aliases for clarity
pub type ReservationId = i64;
pub type HotelId = i64;
pub type RoomId = i64;
pub type StreamId = i64;
pub type TaskId = i64;
