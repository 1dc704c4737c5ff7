//! Opening and draining event streams.

use spout_core::{Hub, SubscribeRequest, Subscription};
use spout_protocol::EventCodec;
use tracing::{debug, trace};

use crate::traits::{EventSink, TransportError};

/// Why a drain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The hub closed the subscriber's queue.
    QueueClosed,
    /// The client went away.
    ClientGone,
    /// Writing to the sink failed.
    SinkFailed,
}

/// Summary of a finished drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Events written to the sink.
    pub delivered: u64,
    /// Encoded bytes written to the sink.
    pub bytes: u64,
}

/// Subscribe on behalf of a client whose response is written to `sink`.
///
/// # Errors
///
/// Returns [`TransportError::StreamingUnsupported`] without subscribing if the
/// sink cannot flush incrementally, or a hub error if the hub has stopped.
pub async fn open_stream<S>(
    hub: &Hub,
    request: SubscribeRequest,
    sink: &S,
) -> Result<Subscription, TransportError>
where
    S: EventSink + ?Sized,
{
    if !sink.supports_flush() {
        return Err(TransportError::StreamingUnsupported);
    }

    let subscription = hub.subscribe(request).await?;
    debug!(
        topic = %subscription.topic(),
        subscriber = subscription.id(),
        "Stream opened"
    );
    Ok(subscription)
}

/// Write queued messages to `sink` until the queue closes or the client leaves.
///
/// Every message is stamped with the codec's retry interval and flushed on
/// its own. When the client side ends the stream, the subscriber is removed
/// from the hub.
pub async fn drain<S>(
    hub: &Hub,
    mut subscription: Subscription,
    sink: &mut S,
    codec: EventCodec,
) -> DrainReport
where
    S: EventSink + ?Sized,
{
    let mut closed = sink.closed();
    let mut delivered = 0;
    let mut bytes = 0;

    let outcome = loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else {
                    break DrainOutcome::QueueClosed;
                };

                let event = codec.encode(&message);
                let len = event.len() as u64;
                if let Err(e) = sink.send_event(event).await {
                    debug!(subscriber = subscription.id(), error = %e, "Event write failed");
                    break DrainOutcome::SinkFailed;
                }
                if let Err(e) = sink.flush().await {
                    debug!(subscriber = subscription.id(), error = %e, "Flush failed");
                    break DrainOutcome::SinkFailed;
                }

                trace!(subscriber = subscription.id(), bytes = len, "Event delivered");
                delivered += 1;
                bytes += len;
            }
            () = &mut closed => break DrainOutcome::ClientGone,
        }
    };

    if outcome != DrainOutcome::QueueClosed {
        let key = subscription.key().clone();
        // Release the queue first so a delivery blocked on it can finish.
        drop(subscription);
        if let Err(e) = hub.unsubscribe(&key).await {
            debug!(topic = %key.topic, error = %e, "Unsubscribe after disconnect failed");
        }
    }

    debug!(?outcome, delivered, "Stream finished");
    DrainReport {
        outcome,
        delivered,
        bytes,
    }
}
