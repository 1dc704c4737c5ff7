//! Subscriber abstraction for Spout.
//!
//! A subscriber is one connected client: the hub-side [`Subscriber`] holds
//! the delivery filter and the sending half of the outbound queue, while the
//! transport drains the receiving half through a [`Subscription`].

use serde::Serialize;
use spout_protocol::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A process-unique subscriber identifier.
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a subscriber ID.
#[must_use]
pub fn next_subscriber_id() -> SubscriberId {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Parameters of a subscribe request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeRequest {
    topic: String,
    identity: String,
    min_version: u32,
    last_event_id: String,
}

impl SubscribeRequest {
    /// Create a request for an anonymous subscriber of `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Address the subscriber by `identity` within its topic.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Only accept messages whose version does not exceed `min_version`.
    #[must_use]
    pub fn with_min_version(mut self, min_version: u32) -> Self {
        self.min_version = min_version;
        self
    }

    /// Seed the last delivered event ID (from a `Last-Event-ID` header).
    #[must_use]
    pub fn with_last_event_id(mut self, last_event_id: impl Into<String>) -> Self {
        self.last_event_id = last_event_id.into();
        self
    }

    /// The requested topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The requested identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Locates a registered subscriber for unsubscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberKey {
    /// Topic the subscriber belongs to.
    pub topic: String,
    /// Subscriber ID.
    pub id: SubscriberId,
}

/// Hub-side half of a subscriber.
///
/// Owned by its topic once registered. Dropping it closes the outbound queue.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    topic: String,
    identity: String,
    last_event_id: String,
    min_version: u32,
    sender: mpsc::Sender<Arc<Message>>,
}

impl Subscriber {
    /// Create a subscriber and the subscription that drains it.
    ///
    /// `capacity` bounds the outbound queue; delivery waits for space.
    #[must_use]
    pub fn channel(request: SubscribeRequest, capacity: usize) -> (Self, Subscription) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = next_subscriber_id();

        let subscription = Subscription {
            key: SubscriberKey {
                topic: request.topic.clone(),
                id,
            },
            identity: request.identity.clone(),
            min_version: request.min_version,
            last_event_id: request.last_event_id.clone(),
            receiver,
        };

        let subscriber = Self {
            id,
            topic: request.topic,
            identity: request.identity,
            last_event_id: request.last_event_id,
            min_version: request.min_version,
            sender,
        };

        (subscriber, subscription)
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// ID of the last message delivered to this subscriber.
    #[must_use]
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    #[must_use]
    pub fn min_version(&self) -> u32 {
        self.min_version
    }

    /// Deliver a message if it passes the version filter.
    ///
    /// Waits for queue space without a timeout. Returns `true` if the message
    /// was queued; messages newer than the subscriber's version, and messages
    /// for a subscriber whose transport has gone away, are dropped.
    pub async fn send_message(&mut self, message: &Arc<Message>) -> bool {
        if message.version() > self.min_version {
            trace!(
                subscriber = self.id,
                version = message.version(),
                min_version = self.min_version,
                "Skipping incompatible message"
            );
            return false;
        }

        self.last_event_id = message.id().to_string();

        if self.sender.send(Arc::clone(message)).await.is_err() {
            trace!(subscriber = self.id, "Outbound queue has no receiver");
            return false;
        }
        true
    }

    /// Snapshot of this subscriber.
    #[must_use]
    pub fn info(&self) -> SubscriberInfo {
        SubscriberInfo {
            id: self.id,
            identity: self.identity.clone(),
            last_event_id: self.last_event_id.clone(),
            min_version: self.min_version,
        }
    }
}

/// Point-in-time view of a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub identity: String,
    pub last_event_id: String,
    pub min_version: u32,
}

/// Transport-side half of a subscriber.
///
/// `recv` yields queued messages until the hub removes the subscriber, after
/// which it returns `None`.
#[derive(Debug)]
pub struct Subscription {
    key: SubscriberKey,
    identity: String,
    min_version: u32,
    last_event_id: String,
    receiver: mpsc::Receiver<Arc<Message>>,
}

impl Subscription {
    /// Receive the next message, or `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.recv().await
    }

    /// Receive a message if one is queued.
    ///
    /// # Errors
    ///
    /// Returns `Empty` if nothing is queued and `Disconnected` once closed.
    pub fn try_recv(&mut self) -> Result<Arc<Message>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Key used to unsubscribe.
    #[must_use]
    pub fn key(&self) -> &SubscriberKey {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.key.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.key.topic
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn min_version(&self) -> u32 {
        self.min_version
    }

    /// The event ID the client reported when subscribing.
    #[must_use]
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }
}
