//! Connection handling
//!
//! Manages individual client connections, parsing RESP commands
//! and sending responses.

use crate::dispatch::Dispatcher;
use crate::protocol::{RespEncoder, RespError, RespReader, RespValue};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Connection handler
///
/// Generic over the transport so tests can drive it with in-memory streams.
pub struct Connection<S> {
    /// Buffered reader over the stream; replies go to the same stream
    reader: RespReader<S>,

    /// Write buffer
    write_buffer: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Create a new connection handler
    pub fn new(stream: S) -> Self {
        Connection {
            reader: RespReader::new(stream),
            write_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Handle the connection
    ///
    /// Reads commands one at a time, dispatches them and writes each reply
    /// before reading the next. Returns `Ok(())` when the client closes the
    /// stream between requests, or once `shutdown` is cancelled. A request
    /// already read when that happens still gets its reply.
    ///
    /// A request that is valid RESP but not a command gets an error reply
    /// and the loop continues. Bytes that are not valid RESP get one error
    /// reply and end the connection, since the stream cannot be resynced.
    pub async fn handle(
        &mut self,
        dispatcher: &Dispatcher,
        shutdown: &CancellationToken,
    ) -> Result<(), RespError> {
        loop {
            let read = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Server shutting down, closing connection");
                    return Ok(());
                }

                read = self.reader.read_value() => read,
            };

            let request = match read {
                Ok(Some(value)) => value,
                Ok(None) => return Ok(()),
                Err(e) if e.is_malformed() => {
                    warn!("Protocol error: {}", e);
                    let error_response = RespValue::error(format!("ERR protocol error: {}", e));
                    self.send_response(&error_response).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            debug!("Parsed command: {}", request);

            let response = match dispatcher.dispatch(&request) {
                Ok(response) => response,
                Err(e) => RespValue::error(format!("ERR {}", e)),
            };

            debug!("Response: {}", response);

            self.send_response(&response).await?;
        }
    }

    /// Send a response to the client
    async fn send_response(&mut self, response: &RespValue) -> Result<(), RespError> {
        // Encode the response
        self.write_buffer.clear();
        RespEncoder::encode_to(&mut self.write_buffer, response);

        // Write to the socket
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }
}
