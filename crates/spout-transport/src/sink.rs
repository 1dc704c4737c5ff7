//! Channel-backed sink for streaming response bodies.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::traits::{EventSink, TransportError};

/// One chunk of a streaming body.
pub type BodyChunk = Result<Bytes, std::io::Error>;

/// Sink that hands each event to a body stream over an mpsc channel.
///
/// The client is considered gone once the receiving side is dropped, which
/// is what HTTP servers do with a body whose connection has closed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<BodyChunk>,
}

impl ChannelSink {
    /// Create a sink and the receiver that feeds the response body.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<BodyChunk>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send_event(&mut self, event: Bytes) -> Result<(), TransportError> {
        self.sender
            .send(Ok(event))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let sender = self.sender.clone();
        Box::pin(async move { sender.closed().await })
    }
}

/// Turn the receiving side of a [`ChannelSink`] into a body stream.
pub fn body_stream(receiver: mpsc::Receiver<BodyChunk>) -> impl Stream<Item = BodyChunk> + Send {
    futures_util::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|chunk| (chunk, receiver))
    })
}
