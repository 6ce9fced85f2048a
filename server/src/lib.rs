//! # Lodge Server
//!
//! Serves Lodge sessions over TCP. Each connection speaks a length-prefixed
//! JSON protocol: clients subscribe to streams of hotels or reservations and
//! submit batches of reservation operations; the server pushes stream changes
//! and task results back as the backend produces them.
//!
//! The pieces, from the wire inwards:
//!
//! - [`protocol`] frames bytes and defines the messages.
//! - [`session`] runs one connection against a [`lodge_engine::Backend`].
//! - [`registry`] tracks live sessions for shutdown.
//! - [`server`] accepts connections and spawns sessions.

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError};
pub use error::{Result, ServerError, SessionError};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::SessionRegistry;
pub use server::Server;
pub use session::{MessageSender, Session, SessionState};
