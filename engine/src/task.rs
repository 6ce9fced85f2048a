//! Tasks - batches of operations with a one-shot result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Future, ReservationId, TaskId};

/// Outcome of one operation in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    /// The operation was applied to the reservation with this id.
    Ok { id: ReservationId },
    /// The operation failed; the rest of the batch still ran.
    Error { message: String },
}

impl TaskResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskResult::Ok { .. })
    }
}

impl From<crate::Result<ReservationId>> for TaskResult {
    fn from(result: crate::Result<ReservationId>) -> Self {
        match result {
            Ok(id) => TaskResult::Ok { id },
            Err(e) => TaskResult::Error {
                message: e.to_string(),
            },
        }
    }
}

/// Subscriber-side handle of an in-flight task.
///
/// Dropping the handle releases the task: the backend stops caring about
/// delivering its results. Operations that are already queued still run.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    released: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Create a handle and the backend-side token observing it.
    pub fn new(id: TaskId) -> (Self, TaskToken) {
        let released = Arc::new(AtomicBool::new(false));
        let token = TaskToken {
            id,
            released: Arc::clone(&released),
        };
        (Self { id, released }, token)
    }

    /// Backend-assigned identity of the task.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Backend-side view of a [`TaskHandle`].
#[derive(Debug, Clone)]
pub struct TaskToken {
    id: TaskId,
    released: Arc<AtomicBool>,
}

impl TaskToken {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the subscriber has let go of the task.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// A submitted batch: the handle plus the future of its results.
#[derive(Debug)]
pub struct Task {
    pub handle: TaskHandle,
    pub results: Future<Vec<TaskResult>>,
}
