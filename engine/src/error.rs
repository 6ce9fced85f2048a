//! Error types for the Lodge engine.

use crate::ReservationId;
use thiserror::Error;

/// All possible errors from the Lodge engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Operation errors
    #[error("reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("reservation already exists: {0}")]
    ReservationAlreadyExists(ReservationId),

    #[error("invalid reservation {id}: {reason}")]
    InvalidReservation { id: ReservationId, reason: String },

    // Stream errors
    #[error("invalid stream type: {0}")]
    InvalidStreamType(i64),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    // State errors
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
