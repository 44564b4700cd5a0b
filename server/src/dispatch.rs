//! Request routing: one decoded frame in, exactly one reply out.
//!
//! The dispatcher is the connection boundary for errors. Every
//! [`BookingError`] and every decode failure becomes a bare `ERR` reply; none
//! of them close the connection.

use crate::metrics::{BOOKINGS, REQUESTS};
use seatbook_core::error::Result;
use seatbook_core::{BookingError, InventoryStore, NewAccount, Reply, Request};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes requests to the inventory store.
pub struct Dispatcher<S> {
    store: Arc<S>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(BookingError::Validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

impl<S: InventoryStore> Dispatcher<S> {
    /// Create a dispatcher over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Decode a frame body and serve it.
    ///
    /// A body that is not a valid request yields an `ERR` reply.
    pub async fn handle_frame(&self, body: &[u8]) -> Reply {
        match Request::decode(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                debug!(error = %e, len = body.len(), "Malformed request");
                metrics::counter!(REQUESTS, "operation" => "malformed", "status" => "ERR")
                    .increment(1);
                Reply::err()
            }
        }
    }

    /// Serve one request.
    pub async fn handle(&self, request: Request) -> Reply {
        let operation = request.operation();

        let reply = match self.execute(request).await {
            Ok(reply) => reply,
            Err(e @ BookingError::Store(_)) => {
                warn!(operation = %operation, error = %e, "Store failure");
                Reply::err()
            }
            Err(e) => {
                debug!(operation = %operation, kind = e.kind(), error = %e, "Request rejected");
                Reply::err()
            }
        };

        debug!(operation = %operation, status = reply.status.as_str(), "Request served");
        metrics::counter!(
            REQUESTS,
            "operation" => operation.as_str(),
            "status" => reply.status.as_str()
        )
        .increment(1);
        reply
    }

    async fn execute(&self, request: Request) -> Result<Reply> {
        match request {
            Request::Login { phone, password } => {
                require("phone", &phone)?;
                let account = self.store.find_account(&phone).await?;
                if !account.password_matches(&password) {
                    return Err(BookingError::Auth);
                }
                Ok(Reply::logged_in(account.name))
            }

            Request::Register {
                phone,
                name,
                password,
            } => {
                require("phone", &phone)?;
                require("name", &name)?;
                require("password", &password)?;
                self.store
                    .register_account(NewAccount {
                        phone: phone.clone(),
                        name,
                        password,
                    })
                    .await?;
                info!(phone = %phone, "Account registered");
                Ok(Reply::ok())
            }

            Request::ListInventory => Ok(Reply::inventory(self.store.list_slots().await?)),

            Request::Book { phone, slot_id } => {
                require("phone", &phone)?;
                let result = self.store.book(&phone, slot_id).await;
                let outcome = match &result {
                    Ok(_) => "booked",
                    Err(e) => e.kind(),
                };
                metrics::counter!(BOOKINGS, "outcome" => outcome).increment(1);

                let reservation_id = result?;
                info!(phone = %phone, slot_id = %slot_id, reservation_id = %reservation_id, "Slot booked");
                Ok(Reply::ok())
            }

            Request::ListMyReservations { phone } => {
                require("phone", &phone)?;
                Ok(Reply::reservations(
                    self.store.list_reservations(&phone).await?,
                ))
            }

            Request::Cancel { reservation_id } => {
                self.store.cancel(reservation_id).await?;
                info!(reservation_id = %reservation_id, "Reservation cancelled");
                Ok(Reply::ok())
            }
        }
    }
}
