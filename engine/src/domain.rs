//! Domain types carried by streams and operations.

use crate::{HotelId, ReservationId, RoomId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle of a reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    New,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Canceled,
}

/// A booking of one room for a range of nights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Unique identifier, `0` until the backend assigns one
    #[serde(default)]
    pub id: ReservationId,
    /// Free-form description, usually the guest name
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ReservationStatus,
    /// Room this reservation occupies
    pub room_id: RoomId,
    /// First night
    pub check_in: NaiveDate,
    /// Departure day (exclusive)
    pub check_out: NaiveDate,
    #[serde(default)]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
}

impl Reservation {
    /// Create a new, not yet stored reservation.
    pub fn new(
        description: impl Into<String>,
        room_id: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Self {
        Self {
            id: 0,
            description: description.into(),
            status: ReservationStatus::New,
            room_id,
            check_in,
            check_out,
            adults: 1,
            children: 0,
        }
    }

    /// Builder-style setter for the id.
    pub fn with_id(mut self, id: ReservationId) -> Self {
        self.id = id;
        self
    }

    /// Number of nights covered.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Whether two reservations claim the same room on the same night.
    pub fn overlaps(&self, other: &Reservation) -> bool {
        self.room_id == other.room_id
            && self.check_in < other.check_out
            && other.check_in < self.check_out
    }
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub category: String,
}

/// A hotel and its rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: HotelId,
    pub name: String,
    #[serde(default)]
    pub rooms: Vec<Room>,
}

impl Hotel {
    /// Look up a room of this hotel.
    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }
}

/// A batch of items delivered on a stream.
///
/// Serialized as a plain JSON array; the stream's kind tells the client which
/// element type to expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamableItems {
    Hotels(Vec<Hotel>),
    Reservations(Vec<Reservation>),
}

impl StreamableItems {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        match self {
            StreamableItems::Hotels(items) => items.len(),
            StreamableItems::Reservations(items) => items.len(),
        }
    }

    /// Check if the batch carries no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
