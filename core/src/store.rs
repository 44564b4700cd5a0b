//! Inventory store trait - the transactional persistence boundary.
//!
//! # Design
//!
//! Slots and reservations are the only shared mutable state in the system and
//! the store's transaction mechanism is the only concurrency control: there are
//! no in-process locks around booking. Implementations must therefore make
//! both mutating operations all-or-nothing:
//!
//! - [`InventoryStore::book`] checks capacity and increments the booked count in
//!   one conditional update, then inserts the reservation row, in one transaction.
//! - [`InventoryStore::cancel`] decrements the booked count (never below zero) and
//!   deletes the reservation row, in one transaction.
//!
//! A caller observing `Ok` knows both writes are committed; an `Err` means
//! neither is.
//!
//! # Implementations
//!
//! - `PostgresInventoryStore` (in `seatbook-postgres`): production implementation
//! - `InMemoryInventoryStore` (in `seatbook-testing`): deterministic tests with fault injection

use crate::error::Result;
use crate::types::{Account, NewAccount, NewSlot, ReservationDetail, ReservationId, Slot, SlotId};
use std::future::Future;

/// Persistent state of accounts, slots and reservations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// connection handler.
pub trait InventoryStore: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the phone number is already registered
    /// - `Store`: the insert failed for any other reason
    fn register_account(&self, account: NewAccount) -> impl Future<Output = Result<()>> + Send;

    /// Look up exactly one account by phone number.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no account, or the exactly-one-row invariant is violated
    /// - `Store`: the query failed
    fn find_account(&self, phone: &str) -> impl Future<Output = Result<Account>> + Send;

    /// All slots with capacity and current booked count.
    ///
    /// An empty inventory is a normal result, not an error.
    ///
    /// # Errors
    ///
    /// - `Store`: the query failed
    fn list_slots(&self) -> impl Future<Output = Result<Vec<Slot>>> + Send;

    /// Reserve one seat of `slot_id` for the account `phone`.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded`: the slot is full (nothing was written)
    /// - `NotFound`: the slot or the account does not exist
    /// - `Store`: a write failed and the transaction was rolled back
    fn book(&self, phone: &str, slot_id: SlotId) -> impl Future<Output = Result<ReservationId>> + Send;

    /// Reservations of the account `phone`, joined with slot names, in store order.
    ///
    /// # Errors
    ///
    /// - `Store`: the query failed
    fn list_reservations(&self, phone: &str)
    -> impl Future<Output = Result<Vec<ReservationDetail>>> + Send;

    /// Cancel a reservation and give its seat back.
    ///
    /// Ownership is not checked: any caller holding the id may cancel.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such reservation (including one already cancelled)
    /// - `Store`: a write failed and the transaction was rolled back
    fn cancel(&self, reservation_id: ReservationId) -> impl Future<Output = Result<()>> + Send;

    /// Seed a new slot. Out-of-band: never reachable from the wire protocol.
    ///
    /// # Errors
    ///
    /// - `Store`: the insert failed
    fn create_slot(&self, slot: NewSlot) -> impl Future<Output = Result<SlotId>> + Send;
}
