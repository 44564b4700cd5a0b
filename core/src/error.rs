//! Errors reported by booking operations.
//!
//! Every variant is recoverable at the connection boundary: the server turns
//! it into an `ERR` reply and keeps the connection open. Transport failures
//! and reactor registration failures live in their own crates.

use crate::types::{ReservationId, SlotId};
use thiserror::Error;

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum BookingError {
    /// A required request field is missing or empty.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Credentials did not match.
    #[error("Authentication failed")]
    Auth,

    /// No matching account, slot or reservation.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (phone already registered).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The slot has no remaining capacity.
    #[error("Slot {0} is fully booked")]
    CapacityExceeded(SlotId),

    /// The backing store failed; any open transaction was rolled back.
    #[error("Store error: {0}")]
    Store(String),
}

impl BookingError {
    /// Missing account for the given phone number.
    #[must_use]
    pub fn account_not_found(phone: &str) -> Self {
        Self::NotFound(format!("account {phone}"))
    }

    /// Missing slot.
    #[must_use]
    pub fn slot_not_found(slot_id: SlotId) -> Self {
        Self::NotFound(format!("slot {slot_id}"))
    }

    /// Missing reservation.
    #[must_use]
    pub fn reservation_not_found(reservation_id: ReservationId) -> Self {
        Self::NotFound(format!("reservation {reservation_id}"))
    }

    /// Stable, low-cardinality name of the error kind (for logs and metrics).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth => "auth",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::Store(_) => "store",
        }
    }
}

/// Convenience alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;
