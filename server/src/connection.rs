//! Per-peer connection handler.
//!
//! A connection is `Open` until its first terminal event (peer EOF, a read or
//! write error, or an unrecoverable framing error), at which point it moves to
//! `Closing` exactly once and asks the reactor to drop it. Dropping the
//! handler closes the socket.
//!
//! Replies are queued in an outbound buffer and written with non-blocking
//! writes; whatever the socket does not take is flushed on the next
//! write-readiness event. While the backlog is at or above
//! `max_pending_output_bytes` the handler stops reading and leaves any
//! complete frames it already holds parked in the inbound buffer, so a peer
//! that never reads its replies cannot grow server memory or hold up the
//! reactor.

use crate::dispatch::Dispatcher;
use crate::metrics::CONNECTIONS_CLOSED;
use bytes::{Buf, BufMut, BytesMut};
use seatbook_core::InventoryStore;
use seatbook_core::frame::{FrameCodec, FrameError};
use seatbook_core::protocol::Reply;
use seatbook_runtime::{Descriptor, Disposition, EventHandler, HandlerFuture, Reactor};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Reading and serving requests.
    Open,
    /// Torn down; waiting for the reactor to drop the handler.
    Closing,
}

/// Why a connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side (EOF).
    PeerClosed,
    /// Reading from the socket failed.
    ReadError,
    /// Writing a reply failed.
    WriteError,
    /// The peer sent a frame that cannot be resynchronised.
    ProtocolViolation,
}

impl CloseReason {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::ProtocolViolation => "protocol_violation",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Largest accepted frame body in bytes
    pub max_frame_bytes: usize,
    /// Bytes read per readiness event
    pub read_chunk_bytes: usize,
    /// Unsent reply bytes at which reading pauses
    pub max_pending_output_bytes: usize,
}

/// Handler owning one accepted connection.
pub struct ConnectionHandler<S> {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
    codec: FrameCodec,
    inbound: BytesMut,
    outbound: BytesMut,
    read_chunk_bytes: usize,
    max_pending_output_bytes: usize,
    dispatcher: Dispatcher<S>,
}

impl<S: InventoryStore + 'static> ConnectionHandler<S> {
    /// Wrap an accepted stream.
    #[must_use]
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        dispatcher: Dispatcher<S>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            stream,
            peer,
            state: ConnectionState::Open,
            codec: FrameCodec::new(settings.max_frame_bytes),
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            read_chunk_bytes: settings.read_chunk_bytes.max(1),
            max_pending_output_bytes: settings.max_pending_output_bytes.max(1),
            dispatcher,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    fn backlogged(&self) -> bool {
        self.outbound.len() >= self.max_pending_output_bytes
    }

    /// Read once, then serve buffered frames.
    async fn read_and_serve(&mut self) -> Disposition {
        if self.state == ConnectionState::Closing {
            return Disposition::Close;
        }

        self.inbound.reserve(self.read_chunk_bytes);
        let mut chunk = (&mut self.inbound).limit(self.read_chunk_bytes);
        match self.stream.try_read_buf(&mut chunk) {
            Ok(0) => return self.teardown(CloseReason::PeerClosed),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Disposition::Keep,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Read failed");
                return self.teardown(CloseReason::ReadError);
            }
        }

        self.serve_buffered().await
    }

    /// Flush queued output, then resume any frames parked by the backlog.
    async fn write_and_serve(&mut self) -> Disposition {
        if self.state == ConnectionState::Closing {
            return Disposition::Close;
        }
        if self.flush() == Disposition::Close {
            return Disposition::Close;
        }
        self.serve_buffered().await
    }

    /// Serve complete frames in arrival order until none is left or the
    /// backlog stays full after a flush.
    async fn serve_buffered(&mut self) -> Disposition {
        loop {
            if self.backlogged() {
                if self.flush() == Disposition::Close {
                    return Disposition::Close;
                }
                if self.backlogged() {
                    debug!(
                        peer = %self.peer,
                        pending = self.outbound.len(),
                        parked = self.inbound.len(),
                        "Peer is not reading, pausing"
                    );
                    return Disposition::Keep;
                }
            }

            match self.codec.decode(&mut self.inbound) {
                Ok(Some(body)) => {
                    let reply = self.dispatcher.handle_frame(&body).await;
                    if let Err(e) = self.queue(&reply) {
                        warn!(peer = %self.peer, error = %e, "Reply encode failed");
                        return self.teardown(CloseReason::WriteError);
                    }
                }
                Ok(None) => return self.flush(),
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Unrecoverable framing error");
                    return self.teardown(CloseReason::ProtocolViolation);
                }
            }
        }
    }

    fn queue(&mut self, reply: &Reply) -> Result<(), FrameError> {
        let body = reply.encode().map_err(io::Error::other)?;
        self.codec.encode(&body[..], &mut self.outbound)
    }

    /// Write as much queued output as the socket takes without blocking.
    fn flush(&mut self) -> Disposition {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => return self.teardown(CloseReason::WriteError),
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Reply write failed");
                    return self.teardown(CloseReason::WriteError);
                }
            }
        }
        Disposition::Keep
    }

    /// Move to `Closing`. Only the first call logs and counts.
    fn teardown(&mut self, reason: CloseReason) -> Disposition {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
            info!(peer = %self.peer, reason = %reason, "Connection closed");
            metrics::counter!(CONNECTIONS_CLOSED, "reason" => reason.as_str()).increment(1);
        } else {
            debug!(peer = %self.peer, reason = %reason, "Connection already closing");
        }
        Disposition::Close
    }
}

impl<S: InventoryStore + 'static> EventHandler for ConnectionHandler<S> {
    fn descriptor(&self) -> io::Result<Descriptor> {
        Ok(Descriptor::Connection {
            local: self.stream.local_addr()?,
            peer: self.stream.peer_addr()?,
        })
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.state == ConnectionState::Closing {
            return Poll::Ready(());
        }
        if self.backlogged() {
            return Poll::Pending;
        }
        // Readiness errors surface from the following read.
        self.stream.poll_read_ready(cx).map(|_| ())
    }

    fn on_readable<'a>(&'a mut self, _reactor: &'a mut Reactor) -> HandlerFuture<'a> {
        Box::pin(self.read_and_serve())
    }

    fn poll_writable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.state == ConnectionState::Closing || self.outbound.is_empty() {
            return Poll::Pending;
        }
        self.stream.poll_write_ready(cx).map(|_| ())
    }

    fn on_writable<'a>(&'a mut self, _reactor: &'a mut Reactor) -> HandlerFuture<'a> {
        Box::pin(self.write_and_serve())
    }
}

impl<S> fmt::Debug for ConnectionHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish_non_exhaustive()
    }
}
