//! Domain types for the reservation service.
//!
//! Slots are seeded out-of-band and only mutated by booking and cancellation.
//! Reservations bind one account to one slot. Accounts are created by
//! registration and read by login.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique, stable identifier of a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(i64);

impl SlotId {
    /// Wrap a raw store identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw store identifier.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, store-assigned identifier of a [`Reservation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(i64);

impl ReservationId {
    /// Wrap a raw store identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw store identifier.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bookable inventory item with finite capacity.
///
/// Invariant: `booked <= capacity`, and `booked` equals the number of
/// reservations referencing this slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Total capacity
    pub capacity: u32,
    /// Currently booked count
    pub booked: u32,
    /// Calendar date the slot applies to, if any
    pub date: Option<NaiveDate>,
}

impl Slot {
    /// Seats still available.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }

    /// Whether another booking would exceed capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.booked >= self.capacity
    }
}

/// Out-of-band definition of a new slot (seeding only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    /// Display name
    pub name: String,
    /// Total capacity
    pub capacity: u32,
    /// Calendar date, if any
    pub date: Option<NaiveDate>,
}

impl NewSlot {
    /// A slot with no date.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            date: None,
        }
    }

    /// Attach a calendar date.
    #[must_use]
    pub const fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// A persisted binding of one account to one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// The reserved slot
    pub slot_id: SlotId,
    /// Phone number of the owning account
    pub phone: String,
    /// When the reservation was made
    pub booked_at: DateTime<Utc>,
}

/// A reservation joined with its slot's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDetail {
    /// Reservation identifier
    pub id: ReservationId,
    /// Display name of the reserved slot
    pub slot_name: String,
    /// When the reservation was made
    pub booked_at: DateTime<Utc>,
}

/// A registered account.
///
/// The credential is an opaque string compared verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// Phone number, unique per account
    pub phone: String,
    /// Display name
    pub name: String,
    /// Credential
    pub password: String,
}

impl Account {
    /// Verbatim credential comparison.
    #[must_use]
    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("phone", &self.phone)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration input.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Phone number
    pub phone: String,
    /// Display name
    pub name: String,
    /// Credential
    pub password: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("phone", &self.phone)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl From<NewAccount> for Account {
    fn from(account: NewAccount) -> Self {
        Self {
            phone: account.phone,
            name: account.name,
            password: account.password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_remaining_and_full() {
        let mut slot = Slot {
            id: SlotId::new(1),
            name: "Morning".to_string(),
            capacity: 2,
            booked: 1,
            date: None,
        };
        assert_eq!(slot.remaining(), 1);
        assert!(!slot.is_full());

        slot.booked = 2;
        assert_eq!(slot.remaining(), 0);
        assert!(slot.is_full());
    }

    #[test]
    fn zero_capacity_slot_is_full() {
        let slot = Slot {
            id: SlotId::new(7),
            name: "Closed".to_string(),
            capacity: 0,
            booked: 0,
            date: None,
        };
        assert!(slot.is_full());
    }

    #[test]
    fn account_debug_hides_password() {
        let account = Account {
            phone: "555".to_string(),
            name: "Alice".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{account:?}");
        assert!(debug.contains("Alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn password_is_compared_verbatim() {
        let account = Account::from(NewAccount {
            phone: "555".to_string(),
            name: "Alice".to_string(),
            password: "p".to_string(),
        });
        assert!(account.password_matches("p"));
        assert!(!account.password_matches("P"));
        assert!(!account.password_matches("p "));
    }
}
