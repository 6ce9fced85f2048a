//! The contract between sessions and whatever executes their requests.

use std::sync::Arc;

use crate::{error::Result, Operation, StreamHandle, StreamObserver, StreamableType, Task};

/// Storage/query backend used by sessions.
///
/// Implementations produce every stream change and task result
/// asynchronously, typically from their own worker threads.
pub trait Backend: Send + Sync {
    /// Subscribe `observer` to the collection of `kind` behind `endpoint`.
    ///
    /// The observer first receives the current content through `items_added`,
    /// then `initialized`, then incremental changes until the returned handle
    /// is dropped.
    fn create_stream(
        &self,
        observer: Arc<dyn StreamObserver>,
        kind: StreamableType,
        endpoint: &str,
        options: serde_json::Value,
    ) -> Result<StreamHandle>;

    /// Submit a batch of operations to run as one unit.
    ///
    /// The batch yields one [`TaskResult`](crate::TaskResult) per operation,
    /// in submission order.
    fn queue_operations(&self, operations: Vec<Operation>) -> Task;
}
