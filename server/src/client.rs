//! Protocol client.
//!
//! Speaks the same framed schema as the server. Replies are matched to
//! requests purely by order, so a client may pipeline several requests with
//! [`Client::send`] and collect the replies with [`Client::receive`].
//!
//! # Example
//!
//! ```no_run
//! use seatbook_server::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect("127.0.0.1:6000").await?;
//! let inventory = client.list_inventory().await?;
//! println!("{} slots", inventory.count.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use futures::{SinkExt, StreamExt};
use seatbook_core::frame::{DEFAULT_MAX_FRAME_LEN, FrameCodec, FrameError};
use seatbook_core::protocol::ProtocolError;
use seatbook_core::{Reply, Request, ReservationId, SlotId};
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

/// Errors that can occur while talking to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server sent an unusable frame.
    #[error(transparent)]
    Frame(FrameError),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    Closed,
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(e) => Self::Io(e),
            other => Self::Frame(other),
        }
    }
}

/// A connection to a Seatbook server.
#[derive(Debug)]
pub struct Client {
    framed: Framed<TcpStream, FrameCodec>,
}

impl Client {
    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new(DEFAULT_MAX_FRAME_LEN * 16)),
        })
    }

    /// Send a request without waiting for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        let body = request.encode()?;
        self.send_raw(&body).await
    }

    /// Send an arbitrary frame body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if writing fails.
    pub async fn send_raw(&mut self, body: &[u8]) -> Result<(), ClientError> {
        self.framed.send(body).await?;
        Ok(())
    }

    /// Wait for the next reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the server closes the connection
    /// first, or an I/O, framing or decode error.
    pub async fn receive(&mut self) -> Result<Reply, ClientError> {
        let body = self.framed.next().await.ok_or(ClientError::Closed)??;
        Ok(Reply::decode(&body)?)
    }

    /// Send a request and wait for its reply.
    ///
    /// # Errors
    ///
    /// See [`Client::send`] and [`Client::receive`].
    pub async fn request(&mut self, request: &Request) -> Result<Reply, ClientError> {
        self.send(request).await?;
        self.receive().await
    }

    /// Authenticate; a successful reply carries the account name.
    ///
    /// # Errors
    ///
    /// Transport errors only; a rejected login is an `ERR` reply.
    pub async fn login(&mut self, phone: &str, password: &str) -> Result<Reply, ClientError> {
        self.request(&Request::Login {
            phone: phone.to_string(),
            password: password.to_string(),
        })
        .await
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    pub async fn register(
        &mut self,
        phone: &str,
        name: &str,
        password: &str,
    ) -> Result<Reply, ClientError> {
        self.request(&Request::Register {
            phone: phone.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        })
        .await
    }

    /// List every slot.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    pub async fn list_inventory(&mut self) -> Result<Reply, ClientError> {
        self.request(&Request::ListInventory).await
    }

    /// Reserve one seat of `slot_id`.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    pub async fn book(&mut self, phone: &str, slot_id: SlotId) -> Result<Reply, ClientError> {
        self.request(&Request::Book {
            phone: phone.to_string(),
            slot_id,
        })
        .await
    }

    /// List the account's reservations.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    pub async fn list_my_reservations(&mut self, phone: &str) -> Result<Reply, ClientError> {
        self.request(&Request::ListMyReservations {
            phone: phone.to_string(),
        })
        .await
    }

    /// Cancel a reservation.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    pub async fn cancel(&mut self, reservation_id: ReservationId) -> Result<Reply, ClientError> {
        self.request(&Request::Cancel { reservation_id }).await
    }
}
