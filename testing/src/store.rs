//! In-memory [`InventoryStore`] for fast, deterministic tests.
//!
//! Every mutating operation runs as a transaction: the tables are copied into
//! a working set (BEGIN), both writes are applied to the copy, and the copy
//! replaces the tables only if every step succeeded (COMMIT). Any error drops
//! the working set (ROLLBACK). The table mutex is held for the whole
//! transaction, which gives serializable isolation.
//!
//! Faults can be armed at individual write points to prove that a failure in
//! the second write of a booking or cancellation leaves no partial state.

use chrono::{DateTime, Utc};
use seatbook_core::environment::{Clock, SystemClock};
use seatbook_core::error::Result;
use seatbook_core::{
    Account, BookingError, InventoryStore, NewAccount, NewSlot, Reservation, ReservationDetail,
    ReservationId, Slot, SlotId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A write step inside a transaction where a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Writing a slot's booked count (first write of book and cancel).
    UpdateSlot,
    /// Inserting the reservation row (second write of book).
    InsertReservation,
    /// Deleting the reservation row (second write of cancel).
    DeleteReservation,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: BTreeMap<String, Account>,
    slots: BTreeMap<SlotId, Slot>,
    reservations: BTreeMap<ReservationId, Reservation>,
    next_slot_id: i64,
    next_reservation_id: i64,
}

/// In-memory inventory store.
///
/// Cloning shares the underlying tables.
#[derive(Clone)]
pub struct InMemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Vec<FaultPoint>>>,
    rollbacks: Arc<AtomicUsize>,
    clock: Arc<dyn Clock>,
}

impl InMemoryInventoryStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping reservations with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            faults: Arc::new(Mutex::new(Vec::new())),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            clock,
        }
    }

    /// Arm a one-shot fault: the next write at `point` fails with a store error.
    pub fn inject_fault(&self, point: FaultPoint) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(point);
    }

    /// Number of transactions rolled back so far.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Current state of a slot.
    #[must_use]
    pub fn slot(&self, slot_id: SlotId) -> Option<Slot> {
        self.tables().slots.get(&slot_id).cloned()
    }

    /// Number of reservation rows referencing `slot_id`.
    #[must_use]
    pub fn reservation_count(&self, slot_id: SlotId) -> usize {
        self.tables()
            .reservations
            .values()
            .filter(|reservation| reservation.slot_id == slot_id)
            .count()
    }

    /// All reservation rows, in id order.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        self.tables().reservations.values().cloned().collect()
    }

    /// Overwrite a slot's booked count, bypassing the booking protocol.
    ///
    /// Simulates counter drift for tests of the zero floor on cancel.
    pub fn force_booked_count(&self, slot_id: SlotId, booked: u32) {
        if let Some(slot) = self.tables().slots.get_mut(&slot_id) {
            slot.booked = booked;
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail if a fault is armed at `point`, disarming it.
    fn trip(&self, point: FaultPoint) -> Result<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.iter().position(|armed| *armed == point) {
            Some(index) => {
                faults.remove(index);
                Err(BookingError::Store(format!("injected fault at {point:?}")))
            }
            None => Ok(()),
        }
    }

    /// Run `work` against a copy of the tables and keep the copy only on success.
    fn transaction<T>(&self, work: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables();
        let mut working = tables.clone();

        match work(&mut working) {
            Ok(value) => {
                *tables = working;
                Ok(value)
            }
            Err(error) => {
                self.rollbacks.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(error = %error, "In-memory transaction rolled back");
                Err(error)
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryInventoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables();
        f.debug_struct("InMemoryInventoryStore")
            .field("accounts", &tables.accounts.len())
            .field("slots", &tables.slots.len())
            .field("reservations", &tables.reservations.len())
            .finish_non_exhaustive()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    async fn register_account(&self, account: NewAccount) -> Result<()> {
        self.transaction(|tables| {
            if tables.accounts.contains_key(&account.phone) {
                return Err(BookingError::Conflict(format!(
                    "phone {} already registered",
                    account.phone
                )));
            }
            tables.accounts.insert(account.phone.clone(), account.into());
            Ok(())
        })
    }

    async fn find_account(&self, phone: &str) -> Result<Account> {
        self.tables()
            .accounts
            .get(phone)
            .cloned()
            .ok_or_else(|| BookingError::account_not_found(phone))
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        Ok(self.tables().slots.values().cloned().collect())
    }

    async fn book(&self, phone: &str, slot_id: SlotId) -> Result<ReservationId> {
        let booked_at = self.now();
        self.transaction(|tables| {
            // Conditional increment: zero rows affected when full.
            let slot = tables
                .slots
                .get_mut(&slot_id)
                .ok_or_else(|| BookingError::slot_not_found(slot_id))?;
            if slot.is_full() {
                return Err(BookingError::CapacityExceeded(slot_id));
            }
            self.trip(FaultPoint::UpdateSlot)?;
            slot.booked += 1;

            if !tables.accounts.contains_key(phone) {
                return Err(BookingError::account_not_found(phone));
            }
            self.trip(FaultPoint::InsertReservation)?;
            tables.next_reservation_id += 1;
            let id = ReservationId::new(tables.next_reservation_id);
            tables.reservations.insert(
                id,
                Reservation {
                    id,
                    slot_id,
                    phone: phone.to_string(),
                    booked_at,
                },
            );
            Ok(id)
        })
    }

    async fn list_reservations(&self, phone: &str) -> Result<Vec<ReservationDetail>> {
        let tables = self.tables();
        Ok(tables
            .reservations
            .values()
            .filter(|reservation| reservation.phone == phone)
            .filter_map(|reservation| {
                let slot = tables.slots.get(&reservation.slot_id)?;
                Some(ReservationDetail {
                    id: reservation.id,
                    slot_name: slot.name.clone(),
                    booked_at: reservation.booked_at,
                })
            })
            .collect())
    }

    async fn cancel(&self, reservation_id: ReservationId) -> Result<()> {
        self.transaction(|tables| {
            let slot_id = tables
                .reservations
                .get(&reservation_id)
                .map(|reservation| reservation.slot_id)
                .ok_or_else(|| BookingError::reservation_not_found(reservation_id))?;

            let slot = tables.slots.get_mut(&slot_id).ok_or_else(|| {
                BookingError::Store(format!(
                    "reservation {reservation_id} references missing slot {slot_id}"
                ))
            })?;
            self.trip(FaultPoint::UpdateSlot)?;
            slot.booked = slot.booked.saturating_sub(1);

            self.trip(FaultPoint::DeleteReservation)?;
            tables.reservations.remove(&reservation_id);
            Ok(())
        })
    }

    async fn create_slot(&self, slot: NewSlot) -> Result<SlotId> {
        self.transaction(|tables| {
            tables.next_slot_id += 1;
            let id = SlotId::new(tables.next_slot_id);
            tables.slots.insert(
                id,
                Slot {
                    id,
                    name: slot.name,
                    capacity: slot.capacity,
                    booked: 0,
                    date: slot.date,
                },
            );
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_clock;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("test runtime")
            .block_on(future)
    }

    fn alice() -> NewAccount {
        NewAccount {
            phone: "555".to_string(),
            name: "Alice".to_string(),
            password: "p".to_string(),
        }
    }

    #[test]
    fn duplicate_phone_is_a_conflict() {
        block_on(async {
            let store = InMemoryInventoryStore::new();
            store.register_account(alice()).await.expect("first registration");

            let second = store.register_account(alice()).await;
            assert!(matches!(second, Err(BookingError::Conflict(_))));
        });
    }

    #[test]
    fn book_stamps_reservation_with_clock() {
        block_on(async {
            let store = InMemoryInventoryStore::with_clock(Arc::new(test_clock()));
            store.register_account(alice()).await.expect("register");
            let slot = store.create_slot(NewSlot::new("Morning", 2)).await.expect("slot");

            store.book("555", slot).await.expect("book");

            let listed = store.list_reservations("555").await.expect("list");
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].slot_name, "Morning");
            assert_eq!(listed[0].booked_at, test_clock().now());
        });
    }

    #[test]
    fn booking_unknown_account_rolls_back_the_increment() {
        block_on(async {
            let store = InMemoryInventoryStore::new();
            let slot = store.create_slot(NewSlot::new("Morning", 2)).await.expect("slot");

            let result = store.book("999", slot).await;

            assert!(matches!(result, Err(BookingError::NotFound(_))));
            assert_eq!(store.slot(slot).map(|s| s.booked), Some(0));
            assert_eq!(store.rollbacks(), 1);
        });
    }

    #[test]
    fn booking_unknown_slot_is_not_found() {
        block_on(async {
            let store = InMemoryInventoryStore::new();
            store.register_account(alice()).await.expect("register");

            let result = store.book("555", SlotId::new(42)).await;
            assert!(matches!(result, Err(BookingError::NotFound(_))));
        });
    }

    #[test]
    fn faults_are_one_shot() {
        block_on(async {
            let store = InMemoryInventoryStore::new();
            store.register_account(alice()).await.expect("register");
            let slot = store.create_slot(NewSlot::new("Morning", 2)).await.expect("slot");

            store.inject_fault(FaultPoint::UpdateSlot);
            assert!(matches!(store.book("555", slot).await, Err(BookingError::Store(_))));
            assert!(store.book("555", slot).await.is_ok());
        });
    }
}
