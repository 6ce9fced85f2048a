//! Seed datasets for populating a store.
//!
//! A dataset is a JSON document listing hotels and reservations. It is loaded
//! once at startup; nothing is written back.

use crate::{error::Result, Error, Hotel, Operation, Reservation, Store};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version of the dataset format.
pub const DATASET_FORMAT_VERSION: u32 = 1;

/// Initial content of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Dataset format version
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub hotels: Vec<Hotel>,
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

fn default_format_version() -> u32 {
    DATASET_FORMAT_VERSION
}

impl Dataset {
    /// Parse a dataset from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let dataset: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidDataset(e.to_string()))?;

        if dataset.format_version != DATASET_FORMAT_VERSION {
            return Err(Error::InvalidDataset(format!(
                "unsupported format version {}",
                dataset.format_version
            )));
        }
        Ok(dataset)
    }

    /// Read and parse a dataset file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidDataset(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Build a store holding this dataset.
    ///
    /// Reservations go through the same validation as client operations, so
    /// a dataset with clashing bookings is rejected.
    pub fn into_store(self) -> Result<Store> {
        let mut store = Store::new();
        for hotel in self.hotels {
            store.put_hotel(hotel);
        }
        for reservation in self.reservations {
            let id = reservation.id;
            store
                .apply(Operation::StoreNewReservation(reservation))
                .map_err(|e| Error::InvalidDataset(format!("reservation {id}: {e}")))?;
        }
        Ok(store)
    }
}
