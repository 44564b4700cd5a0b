//! Request/reply wire schema shared by server and clients.
//!
//! Each frame body is one JSON object. Requests carry a string `type` tag
//! selecting the operation; replies always carry `status` (`"OK"` or `"ERR"`)
//! plus operation-specific payload on success. Error replies carry no detail.
//!
//! ```text
//! {"type":"book","phone":"555","slot_id":1}
//! {"status":"OK"}
//!
//! {"type":"list_inventory"}
//! {"status":"OK","count":1,"slots":[{"id":1,"name":"Morning","capacity":1,"booked":0,"date":null}]}
//! ```

use crate::types::{ReservationDetail, ReservationId, Slot, SlotId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors converting between messages and frame bodies.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame body is not a well-formed message.
    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Authenticate and fetch the account's display name.
    Login {
        /// Account phone number
        phone: String,
        /// Credential
        password: String,
    },
    /// Create an account.
    Register {
        /// Account phone number
        phone: String,
        /// Display name
        name: String,
        /// Credential
        password: String,
    },
    /// List every slot with its capacity and booked count.
    ListInventory,
    /// Reserve one seat.
    Book {
        /// Account phone number
        phone: String,
        /// Slot to reserve
        slot_id: SlotId,
    },
    /// List the account's reservations.
    ListMyReservations {
        /// Account phone number
        phone: String,
    },
    /// Cancel a reservation.
    Cancel {
        /// Reservation to cancel
        reservation_id: ReservationId,
    },
}

impl Request {
    /// Decode a request from a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if the body is not a valid request.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(ProtocolError::Decode)
    }

    /// Encode this request as a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// The operation this request selects.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Login { .. } => Operation::Login,
            Self::Register { .. } => Operation::Register,
            Self::ListInventory => Operation::ListInventory,
            Self::Book { .. } => Operation::Book,
            Self::ListMyReservations { .. } => Operation::ListMyReservations,
            Self::Cancel { .. } => Operation::Cancel,
        }
    }
}

/// Operation selected by a request (for logs and metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`Request::Login`]
    Login,
    /// [`Request::Register`]
    Register,
    /// [`Request::ListInventory`]
    ListInventory,
    /// [`Request::Book`]
    Book,
    /// [`Request::ListMyReservations`]
    ListMyReservations,
    /// [`Request::Cancel`]
    Cancel,
}

impl Operation {
    /// Wire tag of the operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::ListInventory => "list_inventory",
            Self::Book => "book",
            Self::ListMyReservations => "list_my_reservations",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The request succeeded.
    #[serde(rename = "OK")]
    Ok,
    /// The request failed; no further detail is given.
    #[serde(rename = "ERR")]
    Err,
}

impl Status {
    /// Wire form of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Err => "ERR",
        }
    }
}

/// One slot as listed by `list_inventory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    /// Slot identifier
    pub id: SlotId,
    /// Display name
    pub name: String,
    /// Total capacity
    pub capacity: u32,
    /// Currently booked count
    pub booked: u32,
    /// Calendar date, if any
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl From<Slot> for SlotView {
    fn from(slot: Slot) -> Self {
        Self {
            id: slot.id,
            name: slot.name,
            capacity: slot.capacity,
            booked: slot.booked,
            date: slot.date,
        }
    }
}

/// One reservation as listed by `list_my_reservations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationView {
    /// Reservation identifier
    pub id: ReservationId,
    /// Display name of the reserved slot
    pub slot_name: String,
    /// When the reservation was made
    pub booked_at: DateTime<Utc>,
}

impl From<ReservationDetail> for ReservationView {
    fn from(detail: ReservationDetail) -> Self {
        Self {
            id: detail.id,
            slot_name: detail.slot_name,
            booked_at: detail.booked_at,
        }
    }
}

/// A server reply. Exactly one is sent per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome of the request
    pub status: Status,
    /// Display name returned by a successful login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    /// Number of listed items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Listed slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<SlotView>>,
    /// Listed reservations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<Vec<ReservationView>>,
}

impl Reply {
    const fn with_status(status: Status) -> Self {
        Self {
            status,
            account_name: None,
            count: None,
            slots: None,
            reservations: None,
        }
    }

    /// Bare success.
    #[must_use]
    pub const fn ok() -> Self {
        Self::with_status(Status::Ok)
    }

    /// Bare failure.
    #[must_use]
    pub const fn err() -> Self {
        Self::with_status(Status::Err)
    }

    /// Successful login.
    #[must_use]
    pub fn logged_in(account_name: impl Into<String>) -> Self {
        Self {
            account_name: Some(account_name.into()),
            ..Self::ok()
        }
    }

    /// Inventory listing.
    #[must_use]
    pub fn inventory(slots: Vec<Slot>) -> Self {
        Self {
            count: Some(slots.len()),
            slots: Some(slots.into_iter().map(SlotView::from).collect()),
            ..Self::ok()
        }
    }

    /// Reservation listing.
    #[must_use]
    pub fn reservations(details: Vec<ReservationDetail>) -> Self {
        Self {
            count: Some(details.len()),
            reservations: Some(details.into_iter().map(ReservationView::from).collect()),
            ..Self::ok()
        }
    }

    /// Whether the status is `OK`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    /// Decode a reply from a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if the body is not a valid reply.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(ProtocolError::Decode)
    }

    /// Encode this reply as a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }
}
