//! The reactor: registration table and run loop.
//!
//! # Ownership
//!
//! The reactor holds the only owning reference to every registered handler.
//! While a handler is being serviced it is moved out of its registration slot
//! and handed a `&mut Reactor`, so it can register new handlers (the listener
//! does this for every accepted connection) without any back-pointer. When the
//! callback returns, the handler is put back, or dropped if it asked to close
//! or was unregistered in the meantime. Dropping a handler closes its socket,
//! so "unregister" and "release the descriptor" are one operation and nothing
//! can observe a handler after its socket is gone.
//!
//! # Scheduling
//!
//! [`Reactor::run`] waits in one place for any registered handler to report
//! read- or write-readiness, then services every ready handler once, in token
//! order, awaiting each callback to completion before starting the next. A
//! handler that is ready both ways gets `on_writable` first.

use crate::error::RegistrationError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::{Future, poll_fn};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info};

/// Handle identifying one registration.
///
/// Tokens are never reused during the lifetime of a reactor, so a stale token
/// can only ever miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    /// The raw token value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The socket a handler watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptor {
    /// A listening socket bound to this address.
    Listener(SocketAddr),
    /// An accepted connection.
    Connection {
        /// Our side of the connection
        local: SocketAddr,
        /// The remote peer
        peer: SocketAddr,
    },
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener(addr) => write!(f, "listener {addr}"),
            Self::Connection { local, peer } => write!(f, "{local} <- {peer}"),
        }
    }
}

/// What the reactor should do with a handler after its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep watching the handler's socket.
    Keep,
    /// Unregister the handler and drop it, closing its socket.
    Close,
}

/// Future returned by [`EventHandler::on_readable`] and
/// [`EventHandler::on_writable`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Disposition> + Send + 'a>>;

/// An object owning one socket and reacting to its readiness.
///
/// Write interest is opt-in: the default `poll_writable` never reports
/// ready, so handlers that never queue output only implement the read side.
///
/// # Dyn Compatibility
///
/// The callbacks return an explicit boxed future instead of being
/// `async fn`s so handlers can be stored as `Box<dyn EventHandler>`.
pub trait EventHandler: Send {
    /// Identify the watched socket.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while querying the socket's addresses.
    fn descriptor(&self) -> io::Result<Descriptor>;

    /// Poll the socket for read-readiness, registering `cx`'s waker if it is
    /// not ready yet.
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Service one readiness event.
    ///
    /// The reactor is lent to the callback so it can register new handlers.
    /// The callback's own registration is detached while it runs.
    fn on_readable<'a>(&'a mut self, reactor: &'a mut Reactor) -> HandlerFuture<'a>;

    /// Poll the socket for write-readiness. Only handlers holding unsent
    /// output should report ready.
    fn poll_writable(&mut self, _cx: &mut Context<'_>) -> Poll<()> {
        Poll::Pending
    }

    /// Service one write-readiness event.
    fn on_writable<'a>(&'a mut self, _reactor: &'a mut Reactor) -> HandlerFuture<'a> {
        Box::pin(std::future::ready(Disposition::Keep))
    }
}

/// What a handler reported ready for in one wakeup.
#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
}

struct Registration {
    descriptor: Descriptor,
    /// `None` while the handler is being serviced.
    handler: Option<Box<dyn EventHandler>>,
}

/// Single-threaded readiness multiplexer and dispatch loop.
pub struct Reactor {
    registrations: BTreeMap<Token, Registration>,
    descriptors: HashMap<Descriptor, Token>,
    next_token: u64,
    max_registrations: usize,
}

impl Reactor {
    /// Create a reactor accepting at most `max_registrations` handlers.
    #[must_use]
    pub fn new(max_registrations: usize) -> Self {
        Self {
            registrations: BTreeMap::new(),
            descriptors: HashMap::new(),
            next_token: 0,
            max_registrations,
        }
    }

    /// Start watching a handler's socket.
    ///
    /// # Errors
    ///
    /// - `InvalidDescriptor`: the handler could not report its socket addresses
    /// - `AlreadyRegistered`: a handler for the same descriptor is registered
    /// - `CapacityExhausted`: the registration limit is reached
    ///
    /// On error the handler is dropped, closing its socket.
    pub fn register(&mut self, handler: Box<dyn EventHandler>) -> Result<Token, RegistrationError> {
        let descriptor = handler
            .descriptor()
            .map_err(RegistrationError::InvalidDescriptor)?;

        if self.descriptors.contains_key(&descriptor) {
            return Err(RegistrationError::AlreadyRegistered(descriptor));
        }
        if self.registrations.len() >= self.max_registrations {
            return Err(RegistrationError::CapacityExhausted(self.max_registrations));
        }

        let token = Token(self.next_token);
        self.next_token += 1;
        self.registrations.insert(
            token,
            Registration {
                descriptor,
                handler: Some(handler),
            },
        );
        self.descriptors.insert(descriptor, token);
        self.record_size();

        debug!(token = %token, descriptor = %descriptor, "Handler registered");
        Ok(token)
    }

    /// Stop watching and drop a handler, closing its socket.
    ///
    /// Idempotent: returns `false` if the token is not (or no longer)
    /// registered. Unregistering a handler from inside its own callback is
    /// allowed; it is dropped as soon as the callback returns.
    pub fn unregister(&mut self, token: Token) -> bool {
        let Some(registration) = self.registrations.remove(&token) else {
            return false;
        };
        self.descriptors.remove(&registration.descriptor);
        self.record_size();

        debug!(token = %token, descriptor = %registration.descriptor, "Handler unregistered");
        true
    }

    /// Whether `token` is currently registered.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        self.registrations.contains_key(&token)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Service readiness events until nothing is left to watch.
    ///
    /// With a listener registered this never returns.
    pub async fn run(&mut self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Service readiness events until `shutdown` resolves or nothing is left
    /// to watch.
    ///
    /// Shutdown is only observed between wakeups: a callback in progress always
    /// runs to completion.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        loop {
            if self.registrations.is_empty() {
                debug!("Nothing left to watch, reactor stopping");
                return;
            }

            let registered = self.registrations.len();
            let ready = tokio::select! {
                _ = &mut shutdown => {
                    info!(registered, "Reactor shutting down");
                    return;
                }
                ready = self.wait() => ready,
            };

            for readiness in ready {
                self.dispatch(readiness).await;
            }
        }
    }

    /// Block until at least one registered handler is readable or writable.
    async fn wait(&mut self) -> Vec<Readiness> {
        poll_fn(|cx| {
            let ready: Vec<Readiness> = self
                .registrations
                .iter_mut()
                .filter_map(|(token, registration)| {
                    let handler = registration.handler.as_mut()?;
                    // Poll both so each side registers its waker.
                    let writable = handler.poll_writable(cx).is_ready();
                    let readable = handler.poll_readable(cx).is_ready();
                    (readable || writable).then_some(Readiness {
                        token: *token,
                        readable,
                        writable,
                    })
                })
                .collect();

            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        })
        .await
    }

    /// Run one handler's callbacks to completion.
    async fn dispatch(&mut self, readiness: Readiness) {
        let token = readiness.token;
        // An earlier callback in the same wakeup may have unregistered it.
        let Some(mut handler) = self
            .registrations
            .get_mut(&token)
            .and_then(|registration| registration.handler.take())
        else {
            return;
        };

        let mut disposition = Disposition::Keep;
        if readiness.writable {
            disposition = handler.on_writable(self).await;
        }
        if readiness.readable
            && disposition == Disposition::Keep
            && self.registrations.contains_key(&token)
        {
            disposition = handler.on_readable(self).await;
        }

        if !self.registrations.contains_key(&token) {
            debug!(token = %token, "Handler unregistered during its callback");
            return;
        }

        match disposition {
            Disposition::Keep => {
                if let Some(registration) = self.registrations.get_mut(&token) {
                    registration.handler = Some(handler);
                }
            }
            Disposition::Close => {
                self.unregister(token);
            }
        }
    }

    #[allow(clippy::cast_precision_loss)] // Registration counts are far below 2^52
    fn record_size(&self) {
        metrics::gauge!("seatbook_reactor_registered_handlers").set(self.registrations.len() as f64);
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("registered", &self.registrations.len())
            .field("max_registrations", &self.max_registrations)
            .field("next_token", &self.next_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle(Descriptor);

    impl EventHandler for Idle {
        fn descriptor(&self) -> io::Result<Descriptor> {
            Ok(self.0)
        }

        fn poll_readable(&mut self, _cx: &mut Context<'_>) -> Poll<()> {
            Poll::Pending
        }

        fn on_readable<'a>(&'a mut self, _reactor: &'a mut Reactor) -> HandlerFuture<'a> {
            Box::pin(async { Disposition::Keep })
        }
    }

    fn listener_at(port: u16) -> Descriptor {
        Descriptor::Listener(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn tokens_are_not_reused() {
        let mut reactor = Reactor::default();
        let first = reactor.register(Box::new(Idle(listener_at(1))));
        assert!(matches!(first, Ok(token) if token.as_u64() == 0));

        if let Ok(token) = first {
            assert!(reactor.unregister(token));
        }

        let second = reactor.register(Box::new(Idle(listener_at(1))));
        assert!(matches!(second, Ok(token) if token.as_u64() == 1));
    }

    #[test]
    fn descriptor_display() {
        assert_eq!(listener_at(6000).to_string(), "listener 127.0.0.1:6000");
        let connection = Descriptor::Connection {
            local: SocketAddr::from(([127, 0, 0, 1], 6000)),
            peer: SocketAddr::from(([10, 0, 0, 2], 40000)),
        };
        assert_eq!(connection.to_string(), "127.0.0.1:6000 <- 10.0.0.2:40000");
    }
}
