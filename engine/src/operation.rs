//! Operation types for expressing changes.
//!
//! Clients never mutate state directly; they submit batches of operations
//! that the backend applies in order.

use crate::{Reservation, ReservationId};
use serde::{Deserialize, Serialize};

/// An operation that can be applied by a backend.
///
/// Wire form is `{"op": <kind>, "o": <argument>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "o", rename_all = "snake_case")]
pub enum Operation {
    /// Store a reservation that does not exist yet.
    StoreNewReservation(Reservation),
    /// Replace an existing reservation.
    UpdateReservation(Reservation),
    /// Delete a reservation by id.
    DeleteReservation(ReservationId),
}

impl Operation {
    /// Wire name of this operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::StoreNewReservation(_) => "store_new_reservation",
            Operation::UpdateReservation(_) => "update_reservation",
            Operation::DeleteReservation(_) => "delete_reservation",
        }
    }

    /// The reservation id this operation targets, `0` for a new one.
    pub fn reservation_id(&self) -> ReservationId {
        match self {
            Operation::StoreNewReservation(r) => r.id,
            Operation::UpdateReservation(r) => r.id,
            Operation::DeleteReservation(id) => *id,
        }
    }
}

/// Outcome of decoding a batch leniently.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub operations: Vec<Operation>,
    /// Entries that could not be decoded, with the reason.
    pub skipped: Vec<(serde_json::Value, String)>,
}

/// Decode every entry of a batch that can be decoded.
///
/// Unknown kinds and malformed arguments do not fail the batch; they end up in
/// [`DecodedBatch::skipped`].
pub fn decode_batch(entries: Vec<serde_json::Value>) -> DecodedBatch {
    let mut batch = DecodedBatch::default();
    for entry in entries {
        match serde_json::from_value::<Operation>(entry.clone()) {
            Ok(op) => batch.operations.push(op),
            Err(e) => batch.skipped.push((entry, e.to_string())),
        }
    }
    batch
}
