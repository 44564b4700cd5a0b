//! # Seatbook Testing
//!
//! Testing utilities for the Seatbook workspace.
//!
//! This crate provides:
//! - [`InMemoryInventoryStore`]: an `InventoryStore` with real
//!   begin/commit/rollback semantics and fault injection
//! - [`FixedClock`]: deterministic time
//! - [`init_test_tracing`]: opt-in log output for test runs
//!
//! ## Example
//!
//! ```
//! use seatbook_core::{InventoryStore, NewSlot};
//! use seatbook_testing::{FaultPoint, InMemoryInventoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryInventoryStore::new();
//! let slot = store.create_slot(NewSlot::new("Morning", 1)).await?;
//!
//! // Make the next reservation insert fail; the booking rolls back.
//! store.inject_fault(FaultPoint::InsertReservation);
//! # let _ = slot;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use seatbook_core::environment::Clock;

/// In-memory inventory store with transactional semantics
pub mod store;

pub use store::{FaultPoint, InMemoryInventoryStore};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use seatbook_testing::mocks::FixedClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

pub use mocks::{FixedClock, test_clock};

/// Install a fmt subscriber honouring `RUST_LOG`, writing through the test
/// harness's captured output. Safe to call from every test; only the first
/// call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
