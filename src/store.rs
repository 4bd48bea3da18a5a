//! In-process transactional store.
//!
//! Rows live in [`Tables`]. Every mutation goes through
//! [`Store::transaction`], which runs against a working copy while holding the
//! store-wide lock and publishes the copy only when the closure returns `Ok`.
//! The lock spans every category, so an availability check and the insert it
//! guards can never interleave with another writer.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::model::{CategoryId, Reservation, ReservationId, RoomCategory, Settlement};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub categories: HashMap<CategoryId, RoomCategory>,
    pub reservations: HashMap<ReservationId, Reservation>,
    /// Unique index over `Reservation::reference`.
    pub references: HashSet<String>,
    /// Keyed by reservation: at most one settlement each.
    pub settlements: HashMap<ReservationId, Settlement>,
    /// Unique index over `Settlement::transaction_id`.
    pub transaction_ids: HashMap<String, ReservationId>,
    /// Per-day invoice counter rows.
    pub invoice_counters: HashMap<NaiveDate, u32>,
    /// Gateway event ids already reconciled.
    pub processed_events: HashSet<String>,
    last_reservation_id: ReservationId,
}

impl Tables {
    pub fn next_reservation_id(&mut self) -> ReservationId {
        self.last_reservation_id += 1;
        self.last_reservation_id
    }

    /// Reservations of a category, in any status.
    pub fn reservations_for(&self, category: CategoryId) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .values()
            .filter(move |r| r.category == category)
    }
}

#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` atomically. Writes made by `f` are discarded if it fails.
    pub async fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut committed = self.tables.lock().await;
        let mut working = committed.clone();
        let out = f(&mut working)?;
        *committed = working;
        Ok(out)
    }

    /// Consistent read of the current state.
    pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.lock().await;
        f(&tables)
    }
}
