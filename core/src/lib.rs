//! # Seatbook Core
//!
//! Core types and contracts for the Seatbook reservation service.
//!
//! Remote clients query a slot inventory, reserve a slot, list their own
//! reservations and cancel them. This crate holds everything the server and
//! its clients share:
//!
//! - **Domain types**: [`Slot`], [`Reservation`], [`Account`] and their identifiers
//! - **Errors**: the [`BookingError`] taxonomy every operation reports through
//! - **Store contract**: [`InventoryStore`], the transactional persistence boundary
//! - **Wire schema**: [`Request`] / [`Reply`], the one message definition both
//!   sides consume
//! - **Framing**: a length-prefixed `tokio_util` codec with partial-read buffering
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use seatbook_core::frame::FrameCodec;
//! use seatbook_core::protocol::Request;
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = Request::ListInventory;
//! let mut codec = FrameCodec::new(1024);
//! let mut buf = BytesMut::new();
//! codec.encode(&request.encode()?[..], &mut buf)?;
//!
//! let body = codec.decode(&mut buf)?.unwrap_or_default();
//! assert_eq!(Request::decode(&body)?, request);
//! # Ok(())
//! # }
//! ```

pub use chrono::{DateTime, NaiveDate, Utc};

/// Domain types: slots, reservations, accounts
pub mod types;

/// Error taxonomy for booking operations
pub mod error;

/// The transactional inventory store contract
pub mod store;

/// Request/reply wire schema
pub mod protocol;

/// Length-prefixed framing
pub mod frame;

/// Environment module - injected dependencies such as the clock
pub mod environment;

pub use error::BookingError;
pub use protocol::{Operation, Reply, Request, Status};
pub use store::InventoryStore;
pub use types::{Account, NewAccount, NewSlot, Reservation, ReservationDetail, ReservationId, Slot, SlotId};
