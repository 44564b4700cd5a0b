//! Listening socket handler.
//!
//! Accepts one pending connection per readiness event and registers a
//! [`ConnectionHandler`] for it. Failures to accept or register are logged and
//! never stop the listener. After a failed accept (descriptor exhaustion, for
//! example) the listener stays quiet for [`ACCEPT_BACKOFF`] before polling
//! again.

use crate::connection::{ConnectionHandler, ConnectionSettings};
use crate::dispatch::Dispatcher;
use crate::metrics::CONNECTIONS_ACCEPTED;
use seatbook_core::InventoryStore;
use seatbook_runtime::{Descriptor, Disposition, EventHandler, HandlerFuture, Reactor};
use std::io;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Sleep;
use tracing::{debug, warn};

/// Pause after a failed accept.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Handler owning the listening socket.
pub struct ListenerHandler<S> {
    listener: TcpListener,
    /// Result of the accept that made this handler readable.
    pending: Option<io::Result<(TcpStream, SocketAddr)>>,
    /// Armed by a failed accept.
    backoff: Option<Pin<Box<Sleep>>>,
    dispatcher: Dispatcher<S>,
    settings: ConnectionSettings,
}

impl<S: InventoryStore + 'static> ListenerHandler<S> {
    /// Wrap a bound listener.
    #[must_use]
    pub const fn new(
        listener: TcpListener,
        dispatcher: Dispatcher<S>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            listener,
            pending: None,
            backoff: None,
            dispatcher,
            settings,
        }
    }

    fn accept(&mut self, reactor: &mut Reactor) {
        match self.pending.take() {
            Some(Ok((stream, peer))) => {
                metrics::counter!(CONNECTIONS_ACCEPTED).increment(1);
                let handler = ConnectionHandler::new(
                    stream,
                    peer,
                    self.dispatcher.clone(),
                    self.settings,
                );
                match reactor.register(Box::new(handler)) {
                    Ok(token) => debug!(peer = %peer, token = %token, "Connection accepted"),
                    // The handler was dropped by the reactor, closing the socket.
                    Err(e) => warn!(peer = %peer, error = %e, "Connection rejected"),
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, backoff_ms = ACCEPT_BACKOFF.as_millis(), "Accept failed");
                self.backoff = Some(Box::pin(tokio::time::sleep(ACCEPT_BACKOFF)));
            }
            None => {}
        }
    }
}

impl<S: InventoryStore + 'static> EventHandler for ListenerHandler<S> {
    fn descriptor(&self) -> io::Result<Descriptor> {
        Ok(Descriptor::Listener(self.listener.local_addr()?))
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(backoff) = self.backoff.as_mut() {
            if backoff.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            self.backoff = None;
        }
        if self.pending.is_none() {
            match self.listener.poll_accept(cx) {
                Poll::Ready(result) => self.pending = Some(result),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(())
    }

    fn on_readable<'a>(&'a mut self, reactor: &'a mut Reactor) -> HandlerFuture<'a> {
        self.accept(reactor);
        Box::pin(std::future::ready(Disposition::Keep))
    }
}

impl<S> std::fmt::Debug for ListenerHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandler")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("settings", &self.settings)
            .field("backing_off", &self.backoff.is_some())
            .finish_non_exhaustive()
    }
}
