//! Prometheus metrics for the reservation server.
//!
//! Metrics are recorded with the `metrics` macros throughout the workspace and
//! are no-ops until a recorder is installed. [`MetricsServer::start`] installs
//! the Prometheus recorder and serves it over HTTP.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `seatbook_connections_accepted_total` | counter | |
//! | `seatbook_connections_closed_total` | counter | `reason` |
//! | `seatbook_requests_total` | counter | `operation`, `status` |
//! | `seatbook_bookings_total` | counter | `outcome` |
//! | `seatbook_reactor_registered_handlers` | gauge | |
//!
//! # Example
//!
//! ```rust,no_run
//! use seatbook_server::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Connections accepted by the listener.
pub const CONNECTIONS_ACCEPTED: &str = "seatbook_connections_accepted_total";
/// Connections torn down, by reason.
pub const CONNECTIONS_CLOSED: &str = "seatbook_connections_closed_total";
/// Requests served, by operation and reply status.
pub const REQUESTS: &str = "seatbook_requests_total";
/// Booking attempts, by outcome.
pub const BOOKINGS: &str = "seatbook_bookings_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),

    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP exporter on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built (for
    /// example outside a tokio runtime), or [`MetricsError::Install`] if a
    /// different recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("addr", &self.addr)
            .field("started", &self.handle.is_some())
            .finish()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(CONNECTIONS_ACCEPTED, "Total number of accepted connections");
    describe_counter!(
        CONNECTIONS_CLOSED,
        "Total number of closed connections, by teardown reason"
    );
    describe_counter!(REQUESTS, "Total number of requests, by operation and status");
    describe_counter!(BOOKINGS, "Total number of booking attempts, by outcome");
    describe_gauge!(
        "seatbook_reactor_registered_handlers",
        "Handlers currently registered with the reactor"
    );
}
