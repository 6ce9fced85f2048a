//! Store - the in-memory state container.
//!
//! The store holds all hotels and reservations. It applies operations and
//! reports each effect as a [`StreamChange`] so a backend can forward it to
//! interested streams.

use crate::{
    error::Result, Error, Hotel, HotelId, Operation, Reservation, ReservationId, StreamChange,
    StreamableItems, StreamableType,
};
use std::collections::BTreeMap;

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    /// The reservation affected
    pub reservation_id: ReservationId,
    /// What streams of the reservation kind should see
    pub change: StreamChange,
}

/// The main store holding all state.
#[derive(Debug, Clone, Default)]
pub struct Store {
    hotels: BTreeMap<HotelId, Hotel>,
    reservations: BTreeMap<ReservationId, Reservation>,
    /// Highest reservation id handed out or seen
    last_reservation_id: ReservationId,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a reservation by ID.
    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    /// Get a hotel by ID.
    pub fn hotel(&self, id: HotelId) -> Option<&Hotel> {
        self.hotels.get(&id)
    }

    /// Count of stored reservations.
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Insert or replace a hotel.
    pub fn put_hotel(&mut self, hotel: Hotel) {
        self.hotels.insert(hotel.id, hotel);
    }

    /// Everything a stream of `kind` needs for its initial snapshot.
    ///
    /// Items are ordered by id.
    pub fn snapshot(&self, kind: StreamableType) -> Option<StreamableItems> {
        match kind {
            StreamableType::Null => None,
            StreamableType::Hotel => Some(StreamableItems::Hotels(
                self.hotels.values().cloned().collect(),
            )),
            StreamableType::Reservation => Some(StreamableItems::Reservations(
                self.reservations.values().cloned().collect(),
            )),
        }
    }

    /// Drop every reservation.
    pub fn clear_reservations(&mut self) -> StreamChange {
        self.reservations.clear();
        StreamChange::Cleared
    }

    /// Apply an operation to the store.
    pub fn apply(&mut self, op: Operation) -> Result<ApplyResult> {
        match op {
            Operation::StoreNewReservation(reservation) => self.apply_store_new(reservation),
            Operation::UpdateReservation(reservation) => self.apply_update(reservation),
            Operation::DeleteReservation(id) => self.apply_delete(id),
        }
    }

    fn apply_store_new(&mut self, mut reservation: Reservation) -> Result<ApplyResult> {
        if reservation.id == 0 {
            reservation.id = self.next_reservation_id()?;
        } else if reservation.id < 0 {
            return Err(Error::InvalidReservation {
                id: reservation.id,
                reason: "reservation ids must be positive".into(),
            });
        } else if self.reservations.contains_key(&reservation.id) {
            return Err(Error::ReservationAlreadyExists(reservation.id));
        }
        self.validate(&reservation)?;

        let id = reservation.id;
        self.last_reservation_id = self.last_reservation_id.max(id);
        self.reservations.insert(id, reservation.clone());

        Ok(ApplyResult {
            reservation_id: id,
            change: StreamChange::ItemsAdded(StreamableItems::Reservations(vec![reservation])),
        })
    }

    fn next_reservation_id(&self) -> Result<ReservationId> {
        self.last_reservation_id
            .checked_add(1)
            .ok_or_else(|| Error::InvalidReservation {
                id: 0,
                reason: "no reservation ids left".into(),
            })
    }

    fn apply_update(&mut self, reservation: Reservation) -> Result<ApplyResult> {
        if !self.reservations.contains_key(&reservation.id) {
            return Err(Error::ReservationNotFound(reservation.id));
        }
        self.validate(&reservation)?;

        let id = reservation.id;
        self.reservations.insert(id, reservation.clone());

        Ok(ApplyResult {
            reservation_id: id,
            change: StreamChange::ItemsUpdated(StreamableItems::Reservations(vec![reservation])),
        })
    }

    fn apply_delete(&mut self, id: ReservationId) -> Result<ApplyResult> {
        self.reservations
            .remove(&id)
            .ok_or(Error::ReservationNotFound(id))?;

        Ok(ApplyResult {
            reservation_id: id,
            change: StreamChange::ItemsRemoved(vec![id]),
        })
    }

    fn validate(&self, reservation: &Reservation) -> Result<()> {
        if reservation.nights() <= 0 {
            return Err(Error::InvalidReservation {
                id: reservation.id,
                reason: "check-out must be after check-in".into(),
            });
        }

        let clash = self
            .reservations
            .values()
            .find(|other| other.id != reservation.id && other.overlaps(reservation));
        if let Some(other) = clash {
            return Err(Error::InvalidReservation {
                id: reservation.id,
                reason: format!("room {} is taken by reservation {}", other.room_id, other.id),
            });
        }
        Ok(())
    }
}
