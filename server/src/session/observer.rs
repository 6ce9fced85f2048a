use lodge_engine::{ReservationId, StreamObserver, StreamableItems};

use super::MessageSender;
use crate::protocol::ServerMessage;

/// Turns stream events into outbound messages tagged with the client's id.
///
/// Called from backend worker threads.
#[derive(Debug)]
pub struct SessionStreamObserver {
    id: i64,
    sender: MessageSender,
}

impl SessionStreamObserver {
    pub fn new(id: i64, sender: MessageSender) -> Self {
        Self { id, sender }
    }
}

impl StreamObserver for SessionStreamObserver {
    fn items_added(&self, items: &StreamableItems) {
        self.sender.send(ServerMessage::StreamAdd {
            id: self.id,
            items: items.clone(),
        });
    }

    fn items_updated(&self, items: &StreamableItems) {
        self.sender.send(ServerMessage::StreamUpdate {
            id: self.id,
            items: items.clone(),
        });
    }

    fn items_removed(&self, ids: &[ReservationId]) {
        self.sender.send(ServerMessage::StreamRemove {
            id: self.id,
            ids: ids.to_vec(),
        });
    }

    fn cleared(&self) {
        self.sender.send(ServerMessage::StreamClear { id: self.id });
    }

    fn initialized(&self) {
        self.sender.send(ServerMessage::StreamInit { id: self.id });
    }
}
