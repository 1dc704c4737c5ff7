//! Transport abstraction traits for Spout.
//!
//! An [`EventSink`] is the write side of one client's event stream. The hub
//! never touches sinks directly; [`crate::drain`] moves messages from a
//! subscription into one.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use spout_core::HubError;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The response cannot be flushed incrementally.
    #[error("Streaming unsupported")]
    StreamingUnsupported,

    /// The client went away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The hub rejected the request.
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write side of a client's event stream.
#[async_trait]
pub trait EventSink: Send {
    /// Whether written events reach the client before the response ends.
    ///
    /// Streams are refused up front on sinks that cannot flush.
    fn supports_flush(&self) -> bool {
        true
    }

    /// Write one encoded event block.
    async fn send_event(&mut self, event: Bytes) -> Result<(), TransportError>;

    /// Push written events to the client.
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Resolves once the client has gone away.
    fn closed(&self) -> BoxFuture<'static, ()>;
}
