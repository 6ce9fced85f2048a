//! Session registry.
//!
//! Tracks live sessions so the listener can account for them and close them
//! all on shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use uuid::Uuid;

/// A live session as seen by the listener.
#[derive(Debug)]
pub struct SessionEntry {
    /// Unique identifier for this session
    pub id: Uuid,
    /// Remote address, or a label for in-process transports
    pub peer: String,
    pub connected_at: DateTime<Utc>,
    /// Signal that asks the session to close
    close: Arc<Notify>,
}

/// Manages live sessions.
///
/// Thread-safe and can be shared via `Arc`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new registry wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a session.
    ///
    /// Returns the signal the session must watch for a server-side close.
    pub fn register(&self, id: Uuid, peer: impl Into<String>) -> Arc<Notify> {
        let close = Arc::new(Notify::new());
        let entry = SessionEntry {
            id,
            peer: peer.into(),
            connected_at: Utc::now(),
            close: Arc::clone(&close),
        };

        tracing::info!(session = %id, peer = %entry.peer, "Session registered");
        self.sessions.insert(id, entry);
        close
    }

    pub fn unregister(&self, id: &Uuid) {
        if let Some((_, entry)) = self.sessions.remove(id) {
            let lifetime = Utc::now() - entry.connected_at;
            tracing::info!(
                session = %id,
                peer = %entry.peer,
                seconds = lifetime.num_seconds(),
                "Session unregistered"
            );
        }
    }

    /// Ask every registered session to close.
    ///
    /// Returns the number of sessions signalled.
    pub fn close_all(&self) -> usize {
        let mut signalled = 0;
        for entry in self.sessions.iter() {
            // notify_one stores a permit if the session is not waiting yet.
            entry.close.notify_one();
            signalled += 1;
        }
        tracing::info!(sessions = signalled, "Closing all sessions");
        signalled
    }

    /// Get the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Peer and connect time of a session.
    pub fn describe(&self, id: &Uuid) -> Option<(String, DateTime<Utc>)> {
        self.sessions
            .get(id)
            .map(|entry| (entry.peer.clone(), entry.connected_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_unregister() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, "127.0.0.1:5000");
        assert_eq!(registry.session_count(), 1);
        let (peer, connected_at) = registry.describe(&id).unwrap();
        assert_eq!(peer, "127.0.0.1:5000");
        assert!(connected_at <= Utc::now());

        registry.unregister(&id);
        assert_eq!(registry.session_count(), 0);
        assert!(registry.describe(&id).is_none());

        // Unknown ids are ignored.
        registry.unregister(&id);
    }

    #[tokio::test]
    async fn test_close_all_reaches_idle_sessions() {
        let registry = SessionRegistry::new();
        let first = registry.register(Uuid::new_v4(), "a");
        let second = registry.register(Uuid::new_v4(), "b");

        // Signalled before anyone waits; the permit is kept.
        assert_eq!(registry.close_all(), 2);

        tokio::time::timeout(Duration::from_secs(1), first.notified())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), second.notified())
            .await
            .unwrap();
    }
}
