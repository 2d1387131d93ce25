//! Streaming RESP reader
//!
//! Pulls bytes from any `AsyncRead` and yields one complete value at a time.
//! Shared by client connections and AOF replay.

use super::resp::RespParser;
use super::types::{RespError, RespValue};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Buffered reader of RESP values
pub struct RespReader<R> {
    inner: R,
    buffer: BytesMut,
    /// Bytes consumed by fully decoded values
    position: u64,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        RespReader {
            inner,
            buffer: BytesMut::with_capacity(4096),
            position: 0,
        }
    }

    /// Read the next value
    ///
    /// Returns `Ok(None)` when the source ends on a value boundary and
    /// `Err(RespError::UnexpectedEof)` when it ends inside a value.
    pub async fn read_value(&mut self) -> Result<Option<RespValue>, RespError> {
        loop {
            let before = self.buffer.len();
            if let Some(value) = RespParser::parse(&mut self.buffer)? {
                self.position += (before - self.buffer.len()) as u64;
                return Ok(Some(value));
            }

            if self.inner.read_buf(&mut self.buffer).await? == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(RespError::UnexpectedEof)
                };
            }
        }
    }

    /// Offset just past the last value returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Access the underlying source, e.g. to write replies on a socket
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}
