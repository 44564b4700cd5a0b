//! # Seatbook Runtime
//!
//! The I/O reactor that drives the Seatbook server.
//!
//! ## Core Components
//!
//! - **Reactor**: owns every registered handler and the run loop
//! - **`EventHandler`**: one object per watched socket (listener or connection)
//! - **Token**: the owned handle a registration is addressed by
//!
//! ## Execution Model
//!
//! Single-threaded and cooperative. The loop waits in exactly one place for
//! any registered socket to become readable, then services each ready handler
//! to completion, one at a time. A handler callback that awaits (for example a
//! store call) suspends the whole loop until it returns, so callbacks are never
//! interleaved and requests on one connection are served strictly in order.
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_runtime::Reactor;
//!
//! let mut reactor = Reactor::new(1024);
//! reactor.register(Box::new(listener_handler))?;
//! reactor.run_until(tokio::signal::ctrl_c()).await;
//! ```

/// The reactor, its handler trait and registration handles
pub mod reactor;

/// Error types for the reactor
pub mod error {
    use crate::reactor::Descriptor;
    use thiserror::Error;

    /// Errors that can occur while registering a handler.
    ///
    /// Registration failures are local: the rejected handler is dropped (which
    /// closes its socket) and the reactor keeps running.
    #[derive(Error, Debug)]
    pub enum RegistrationError {
        /// A handler for this descriptor is already registered.
        #[error("Descriptor {0} is already registered")]
        AlreadyRegistered(Descriptor),

        /// The handler's socket could not be identified (e.g. the peer is gone).
        #[error("Invalid descriptor: {0}")]
        InvalidDescriptor(#[source] std::io::Error),

        /// The registration limit has been reached.
        #[error("Reactor is at capacity ({0} registrations)")]
        CapacityExhausted(usize),
    }
}

pub use error::RegistrationError;
pub use reactor::{Descriptor, Disposition, EventHandler, HandlerFuture, Reactor, Token};
