//! TCP listener and per-connection task spawning.

use std::sync::Arc;

use lodge_engine::{Backend, Dataset, MemoryBackend};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ServerError, SessionError};
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Build the in-memory backend, seeded from `config.seed_file` if set.
pub fn memory_backend(config: &Config) -> Result<MemoryBackend, ServerError> {
    let Some(path) = &config.seed_file else {
        return Ok(MemoryBackend::new(config.worker_threads));
    };

    tracing::info!("Loading dataset from {}", path.display());
    let store = Dataset::load(path)?.into_store()?;
    tracing::info!(reservations = store.reservation_count(), "Dataset loaded");
    Ok(MemoryBackend::with_store(store, config.worker_threads))
}

/// Accepts connections and runs one [`Session`] per connection.
#[derive(Clone)]
pub struct Server {
    config: Arc<Config>,
    backend: Arc<dyn Backend>,
    registry: Arc<SessionRegistry>,
}

impl Server {
    pub fn new(config: Config, backend: Arc<dyn Backend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            registry: SessionRegistry::new_shared(),
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Server listening on {}", addr);
        Ok(listener)
    }

    /// Accept connections forever.
    ///
    /// Accept failures are logged and do not stop the loop.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    if let Err(e) = socket.set_nodelay(true) {
                        tracing::debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
                    }
                    self.spawn_session(socket, peer.to_string());
                }
                Err(e) => tracing::warn!("Failed to accept connection: {}", e),
            }
        }
    }

    /// Run a session over `transport` on its own task.
    pub fn spawn_session<T>(&self, transport: T, peer: String) -> JoinHandle<()>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = Uuid::new_v4();
        let close = self.registry.register(id, peer);
        let session = Session::new(id, Arc::clone(&self.backend), self.config.max_frame_size);
        let registry = Arc::clone(&self.registry);
        let span = tracing::info_span!("session", id = %id);

        tokio::spawn(
            async move {
                tracing::info!("Client connected");
                match session.run(transport, close).await {
                    Ok(()) => tracing::info!("Client disconnected"),
                    Err(SessionError::Io(e)) => {
                        tracing::info!("Client disconnected: {}", e)
                    }
                    Err(e) => tracing::warn!("Session closed: {}", e),
                }
                registry.unregister(&id);
                tracing::debug!(active_sessions = registry.session_count(), "Session ended");
            }
            .instrument(span),
        )
    }
}
