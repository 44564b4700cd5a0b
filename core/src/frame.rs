//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian body length followed by the body. The
//! transport gives no message boundaries, so [`FrameCodec`] decodes from a
//! growing [`BytesMut`] and yields complete bodies in arrival order; a body
//! split across several reads is reassembled, and several bodies in one read
//! are all yielded. The codec plugs into `tokio_util::codec::Framed` or can be
//! driven by hand over a buffer the caller fills.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Default upper bound on a frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Framing failures. The byte stream cannot be resynchronised after one.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The declared body length exceeds the configured maximum.
    #[error("Frame of {len} bytes exceeds maximum of {max} bytes")]
    TooLarge {
        /// Declared body length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// The body is too long for the 4-byte length prefix.
    #[error("Body of {0} bytes cannot be length-prefixed")]
    Unrepresentable(usize),

    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Length prefix for a body of `len` bytes.
///
/// # Errors
///
/// Returns [`FrameError::Unrepresentable`] if `len` does not fit in a `u32`.
pub fn length_prefix(len: usize) -> Result<[u8; HEADER_LEN], FrameError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| FrameError::Unrepresentable(len))
}

/// Codec for length-prefixed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// Create a codec rejecting incoming bodies longer than `max_frame_len`.
    #[must_use]
    pub const fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// Largest accepted incoming body.
    #[must_use]
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    /// Take the next complete body, if one is buffered.
    ///
    /// Rejects an oversized header as soon as it arrives, without waiting for
    /// the body.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.first_chunk::<HEADER_LEN>() else {
            return Ok(None);
        };
        let len = u32::from_be_bytes(*header) as usize;
        if len > self.max_frame_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&[u8]>::encode(self, &body[..], dst)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, body: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        let prefix = length_prefix(body.len())?;
        dst.reserve(HEADER_LEN + body.len());
        dst.put_slice(&prefix);
        dst.put_slice(body);
        Ok(())
    }
}
