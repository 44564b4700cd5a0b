//! # Seatbook Server
//!
//! The reservation server: a listener and per-connection handlers driven by
//! the `seatbook-runtime` reactor, a request [`Dispatcher`] over any
//! `InventoryStore`, and a protocol [`Client`].
//!
//! ## Example
//!
//! ```no_run
//! use seatbook_server::{Server, config::ServerConfig};
//! use seatbook_testing::InMemoryInventoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryInventoryStore::new());
//! let server = Server::bind(&ServerConfig::default(), store).await?;
//! println!("listening on {}", server.local_addr());
//! server.run_until(tokio::signal::ctrl_c()).await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod metrics;

pub use client::{Client, ClientError};
pub use dispatch::Dispatcher;

use crate::config::ServerConfig;
use crate::connection::ConnectionSettings;
use crate::listener::ListenerHandler;
use crate::metrics::MetricsError;
use seatbook_core::{BookingError, InventoryStore};
use seatbook_runtime::{Reactor, RegistrationError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Errors that can occur while starting the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The listener could not be registered with the reactor.
    #[error(transparent)]
    Register(#[from] RegistrationError),

    /// The inventory store could not be opened or migrated.
    #[error(transparent)]
    Store(#[from] BookingError),

    /// The metrics exporter could not be started.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// A bound server ready to run.
#[derive(Debug)]
pub struct Server {
    reactor: Reactor,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the listener and register it with a fresh reactor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound, or
    /// [`ServerError::Register`] if the listener cannot be registered (for
    /// example with a registration limit of zero).
    pub async fn bind<S>(config: &ServerConfig, store: Arc<S>) -> Result<Self, ServerError>
    where
        S: InventoryStore + 'static,
    {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let settings = ConnectionSettings {
            max_frame_bytes: config.max_frame_bytes,
            read_chunk_bytes: config.read_chunk_bytes,
            max_pending_output_bytes: config.max_pending_output_bytes,
        };
        let mut reactor = Reactor::new(config.max_connections);
        reactor.register(Box::new(ListenerHandler::new(
            listener,
            Dispatcher::new(store),
            settings,
        )))?;

        tracing::info!(addr = %local_addr, max_connections = config.max_connections, "Listening");
        Ok(Self {
            reactor,
            local_addr,
        })
    }

    /// The address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process is killed.
    pub async fn run(mut self) {
        self.reactor.run().await;
    }

    /// Serve until `shutdown` resolves. Open connections are closed on return.
    pub async fn run_until<F: Future>(mut self, shutdown: F) {
        self.reactor.run_until(shutdown).await;
        tracing::info!(addr = %self.local_addr, "Server stopped");
    }
}
