//! `PostgreSQL` inventory store for Seatbook.
//!
//! [`PostgresInventoryStore`] implements the `InventoryStore` contract from
//! `seatbook-core` on top of a sqlx [`PgPool`]. Every mutating operation runs
//! in its own transaction; the database's row locks are the only concurrency
//! control, so any number of server processes may share one database.
//!
//! # Example
//!
//! ```no_run
//! use seatbook_core::{InventoryStore, NewSlot};
//! use seatbook_postgres::PostgresInventoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresInventoryStore::new("postgres://localhost/seatbook").await?;
//! store.migrate().await?;
//! let slot = store.create_slot(NewSlot::new("Morning", 20)).await?;
//! # let _ = slot;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, NaiveDate, Utc};
use seatbook_core::error::Result;
use seatbook_core::{
    Account, BookingError, InventoryStore, NewAccount, NewSlot, ReservationDetail, ReservationId,
    Slot, SlotId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Pool size used by [`PostgresInventoryStore::new`].
pub const DEFAULT_MAX_CONNECTIONS: u32 = 1;

/// Connect timeout used by [`PostgresInventoryStore::new`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// `PostgreSQL`-backed inventory store.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

type SlotRow = (i64, String, i32, i32, Option<NaiveDate>);

impl PostgresInventoryStore {
    /// Connect with the default pool settings (one connection).
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, DEFAULT_MAX_CONNECTIONS, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| BookingError::Store(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to PostgreSQL inventory store");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations (accounts, slots, reservations).
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Store`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::Store(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error into the booking taxonomy.
///
/// Unique violations become `Conflict`, foreign-key violations become
/// `not_found()`, everything else is a `Store` error prefixed with `context`.
fn map_sqlx_error(
    context: &'static str,
    not_found: impl FnOnce() -> BookingError,
) -> impl FnOnce(sqlx::Error) -> BookingError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return BookingError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return not_found();
            }
        }
        tracing::warn!(error = %e, "{context}");
        BookingError::Store(format!("{context}: {e}"))
    }
}

fn store_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> BookingError {
    move |e| {
        tracing::warn!(error = %e, "{context}");
        BookingError::Store(format!("{context}: {e}"))
    }
}

fn to_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| BookingError::Store(format!("negative {column} in slots table: {value}")))
}

fn to_slot((id, name, capacity, booked, date): SlotRow) -> Result<Slot> {
    Ok(Slot {
        id: SlotId::new(id),
        name,
        capacity: to_count(capacity, "capacity")?,
        booked: to_count(booked, "booked")?,
        date,
    })
}

impl InventoryStore for PostgresInventoryStore {
    async fn register_account(&self, account: NewAccount) -> Result<()> {
        sqlx::query("INSERT INTO accounts (phone, name, password) VALUES ($1, $2, $3)")
            .bind(&account.phone)
            .bind(&account.name)
            .bind(&account.password)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    BookingError::Conflict(format!("phone {} already registered", account.phone))
                }
                _ => store_error("Failed to register account")(e),
            })?;
        Ok(())
    }

    async fn find_account(&self, phone: &str) -> Result<Account> {
        let mut rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT phone, name, password FROM accounts WHERE phone = $1")
                .bind(phone)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error("Failed to look up account"))?;

        // Exactly one row, or the account does not exist.
        match (rows.pop(), rows.is_empty()) {
            (Some((phone, name, password)), true) => Ok(Account {
                phone,
                name,
                password,
            }),
            _ => Err(BookingError::account_not_found(phone)),
        }
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let rows: Vec<SlotRow> =
            sqlx::query_as("SELECT id, name, capacity, booked, date FROM slots ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(store_error("Failed to list slots"))?;

        rows.into_iter().map(to_slot).collect()
    }

    async fn book(&self, phone: &str, slot_id: SlotId) -> Result<ReservationId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("Failed to begin transaction"))?;

        // Capacity check and increment in one statement: the row lock it takes
        // serialises racing bookings of the same slot.
        let updated =
            sqlx::query("UPDATE slots SET booked = booked + 1 WHERE id = $1 AND booked < capacity")
                .bind(slot_id.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(store_error("Failed to update slot"))?;

        if updated.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM slots WHERE id = $1")
                .bind(slot_id.as_i64())
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error("Failed to look up slot"))?;

            return Err(if exists.is_some() {
                BookingError::CapacityExceeded(slot_id)
            } else {
                BookingError::slot_not_found(slot_id)
            });
        }

        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO reservations (slot_id, account_phone)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(slot_id.as_i64())
        .bind(phone)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error("Failed to insert reservation", || {
            BookingError::account_not_found(phone)
        }))?;

        tx.commit()
            .await
            .map_err(store_error("Failed to commit booking"))?;

        Ok(ReservationId::new(id))
    }

    async fn list_reservations(&self, phone: &str) -> Result<Vec<ReservationDetail>> {
        let rows: Vec<(i64, String, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT r.id, s.name, r.booked_at
            FROM reservations r
            JOIN slots s ON s.id = r.slot_id
            WHERE r.account_phone = $1
            ORDER BY r.id
            ",
        )
        .bind(phone)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("Failed to list reservations"))?;

        Ok(rows
            .into_iter()
            .map(|(id, slot_name, booked_at)| ReservationDetail {
                id: ReservationId::new(id),
                slot_name,
                booked_at,
            })
            .collect())
    }

    async fn cancel(&self, reservation_id: ReservationId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(store_error("Failed to begin transaction"))?;

        // A concurrent cancel of the same reservation waits here and then
        // finds the row gone.
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT slot_id FROM reservations WHERE id = $1 FOR UPDATE")
                .bind(reservation_id.as_i64())
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error("Failed to lock reservation"))?;

        let Some((slot_id,)) = row else {
            return Err(BookingError::reservation_not_found(reservation_id));
        };

        sqlx::query("UPDATE slots SET booked = GREATEST(booked - 1, 0) WHERE id = $1")
            .bind(slot_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error("Failed to update slot"))?;

        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(store_error("Failed to delete reservation"))?;

        tx.commit()
            .await
            .map_err(store_error("Failed to commit cancellation"))?;

        Ok(())
    }

    async fn create_slot(&self, slot: NewSlot) -> Result<SlotId> {
        let capacity = i32::try_from(slot.capacity)
            .map_err(|_| BookingError::Validation(format!("capacity {} too large", slot.capacity)))?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO slots (name, capacity, date) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&slot.name)
        .bind(capacity)
        .bind(slot.date)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("Failed to create slot"))?;

        tracing::info!(slot_id = id, name = %slot.name, capacity, "Slot created");
        Ok(SlotId::new(id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn negative_counts_are_store_errors() {
        let row: SlotRow = (1, "Morning".to_string(), 2, -1, None);
        assert!(matches!(to_slot(row), Err(BookingError::Store(_))));
    }

    #[test]
    fn slot_rows_convert() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14);
        let row: SlotRow = (7, "Matinee".to_string(), 40, 3, date);
        let slot = to_slot(row).expect("valid row");
        assert_eq!(slot.id, SlotId::new(7));
        assert_eq!(slot.remaining(), 37);
        assert_eq!(slot.date, date);
    }

    #[test]
    fn non_database_errors_are_store_errors() {
        let error = map_sqlx_error("ctx", || BookingError::Auth)(sqlx::Error::RowNotFound);
        assert!(matches!(error, BookingError::Store(message) if message.starts_with("ctx")));
    }
}
