//! Ordered outbound pipeline of a session.

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::protocol::{write_frame, ServerMessage};

/// An encoded message waiting for the writer.
#[derive(Debug)]
pub struct OutboundFrame {
    pub op: &'static str,
    pub body: Vec<u8>,
}

/// Sender for outbound messages.
///
/// Clones share one FIFO queue, so messages go out in the order `send` was
/// called, whichever thread called it. Once the session is gone every send
/// is a no-op.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl MessageSender {
    /// Create a sender and the queue the writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Encode `message` and queue it.
    ///
    /// Returns `false` if the message was dropped.
    pub fn send(&self, message: ServerMessage) -> bool {
        let body = match message.encode() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(op = message.op(), "Failed to serialize message: {}", e);
                return false;
            }
        };

        let frame = OutboundFrame {
            op: message.op(),
            body,
        };
        if self.tx.send(frame).is_err() {
            tracing::trace!(op = message.op(), id = message.id(), "session gone, message dropped");
            return false;
        }
        true
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that writes queued frames to `writer`, one at a time.
///
/// The task ends with an error on the first failed write, or cleanly once
/// every sender is dropped. Once `finish` fires (or its sender is dropped)
/// the queue stops taking new frames and the task ends after writing the
/// ones already queued.
pub fn spawn_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut finish: oneshot::Receiver<()>,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut finishing = false;
        loop {
            let frame = tokio::select! {
                biased;
                frame = rx.recv() => frame,
                _ = &mut finish, if !finishing => {
                    finishing = true;
                    rx.close();
                    continue;
                }
            };
            let Some(frame) = frame else {
                break;
            };
            if let Err(e) = write_frame(&mut writer, &frame.body).await {
                tracing::warn!(op = frame.op, "Failed to send message: {}", e);
                return Err(e);
            }
            tracing::debug!(op = frame.op, bytes = frame.body.len(), "message sent");
        }
        Ok(())
    })
}
