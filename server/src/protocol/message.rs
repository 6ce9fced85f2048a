//! Message protocol definitions.
//!
//! Every frame body is a JSON object whose `op` field names the message.

use lodge_engine::{ReservationId, StreamableItems, TaskResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Commands the session understands.
const KNOWN_COMMANDS: [&str; 3] = ["create_stream", "remove_stream", "schedule_operations"];

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a collection.
    CreateStream {
        /// Client-chosen stream id
        id: i64,
        /// Raw stream type, validated by the session
        #[serde(rename = "type")]
        kind: i64,
        /// Backend endpoint name
        service: String,
        #[serde(default)]
        options: Value,
    },

    /// Drop a subscription.
    RemoveStream { id: i64 },

    /// Submit a batch of operations.
    ScheduleOperations {
        /// Client-chosen task id
        id: i64,
        /// Raw `{op, o}` entries, decoded one by one
        operations: Vec<Value>,
    },

    /// A command this server does not know.
    #[serde(skip)]
    Unknown { op: String },
}

impl ClientMessage {
    /// Decode a frame body.
    ///
    /// Unknown commands decode to [`ClientMessage::Unknown`]. A body that is
    /// not JSON, lacks a string `op`, or misses fields of a known command is
    /// an error.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        match value.get("op").and_then(Value::as_str) {
            Some(op) if !KNOWN_COMMANDS.contains(&op) => Ok(ClientMessage::Unknown {
                op: op.to_string(),
            }),
            _ => Ok(serde_json::from_value(value)?),
        }
    }

    /// Wire name of this command.
    pub fn op(&self) -> &str {
        match self {
            ClientMessage::CreateStream { .. } => "create_stream",
            ClientMessage::RemoveStream { .. } => "remove_stream",
            ClientMessage::ScheduleOperations { .. } => "schedule_operations",
            ClientMessage::Unknown { op } => op,
        }
    }
}

/// Messages sent from server to client.
///
/// Every message carries the client-chosen id of the stream or task it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerMessage {
    StreamAdd { id: i64, items: StreamableItems },
    StreamUpdate { id: i64, items: StreamableItems },
    StreamRemove { id: i64, ids: Vec<ReservationId> },
    StreamClear { id: i64 },
    StreamInit { id: i64 },
    TaskResults { id: i64, results: Vec<TaskResult> },
}

impl ServerMessage {
    /// Wire name of this message.
    pub fn op(&self) -> &'static str {
        match self {
            ServerMessage::StreamAdd { .. } => "stream_add",
            ServerMessage::StreamUpdate { .. } => "stream_update",
            ServerMessage::StreamRemove { .. } => "stream_remove",
            ServerMessage::StreamClear { .. } => "stream_clear",
            ServerMessage::StreamInit { .. } => "stream_init",
            ServerMessage::TaskResults { .. } => "task_results",
        }
    }

    /// Client id of the stream or task this message belongs to.
    pub fn id(&self) -> i64 {
        match self {
            ServerMessage::StreamAdd { id, .. }
            | ServerMessage::StreamUpdate { id, .. }
            | ServerMessage::StreamRemove { id, .. }
            | ServerMessage::StreamClear { id }
            | ServerMessage::StreamInit { id }
            | ServerMessage::TaskResults { id, .. } => *id,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}
