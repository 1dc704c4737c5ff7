//! Topic abstraction for Spout.
//!
//! Topics are named groups of subscribers that receive the same broadcasts.
//! A topic is only ever touched from inside the hub's control loop.

use crate::subscriber::{Subscriber, SubscriberId, SubscriberInfo};
use serde::Serialize;
use spout_protocol::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// A named group of subscribers.
#[derive(Debug)]
pub struct Topic {
    /// Topic name.
    name: String,
    /// ID of the last message broadcast to the whole topic.
    last_event_id: String,
    /// Registered subscribers.
    subscribers: HashMap<SubscriberId, Subscriber>,
    /// Non-empty identity to the subscriber currently holding it.
    identities: HashMap<String, SubscriberId>,
}

impl Topic {
    /// Create an empty topic.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_event_id: String::new(),
            subscribers: HashMap::new(),
            identities: HashMap::new(),
        }
    }

    /// Get the topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of subscribers.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.subscribers.len()
    }

    /// ID of the last message broadcast to every subscriber.
    #[must_use]
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Check if the topic has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Check if a subscriber is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    /// Register a subscriber.
    ///
    /// A subscriber that already held the same non-empty identity is
    /// displaced and returned so the caller can disconnect it.
    pub fn add_subscriber(&mut self, subscriber: Subscriber) -> Option<Subscriber> {
        let mut displaced = None;
        if !subscriber.identity().is_empty() {
            if let Some(previous) = self
                .identities
                .insert(subscriber.identity().to_string(), subscriber.id())
            {
                displaced = self.subscribers.remove(&previous);
            }
        }

        trace!(topic = %self.name, subscriber = subscriber.id(), "Subscriber added");
        self.subscribers.insert(subscriber.id(), subscriber);
        displaced
    }

    /// Remove a subscriber, returning it if it was registered.
    pub fn remove_subscriber(&mut self, id: SubscriberId) -> Option<Subscriber> {
        let subscriber = self.subscribers.remove(&id)?;
        let identity = subscriber.identity();
        if !identity.is_empty() && self.identities.get(identity) == Some(&id) {
            self.identities.remove(identity);
        }
        trace!(topic = %self.name, subscriber = id, "Subscriber removed");
        Some(subscriber)
    }

    /// Deliver a message.
    ///
    /// With a non-empty `identity` only that subscriber receives it (nothing
    /// happens if it is absent). Otherwise the topic's last event ID is
    /// updated and every subscriber receives it, in no particular order.
    ///
    /// Returns the number of subscribers the message was queued for.
    pub async fn send_message(&mut self, identity: &str, message: &Arc<Message>) -> usize {
        if !identity.is_empty() {
            let Some(&id) = self.identities.get(identity) else {
                return 0;
            };
            return match self.subscribers.get_mut(&id) {
                Some(subscriber) => usize::from(subscriber.send_message(message).await),
                None => 0,
            };
        }

        self.last_event_id = message.id().to_string();

        let mut delivered = 0;
        for subscriber in self.subscribers.values_mut() {
            if subscriber.send_message(message).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Remove every subscriber.
    ///
    /// The returned subscribers close their queues when dropped.
    pub fn close(&mut self) -> Vec<Subscriber> {
        self.identities.clear();
        self.subscribers.drain().map(|(_, subscriber)| subscriber).collect()
    }

    /// Snapshot of this topic.
    #[must_use]
    pub fn info(&self) -> TopicInfo {
        let mut subscribers: Vec<SubscriberInfo> =
            self.subscribers.values().map(Subscriber::info).collect();
        subscribers.sort_by_key(|s| s.id);

        TopicInfo {
            name: self.name.clone(),
            last_event_id: self.last_event_id.clone(),
            subscriber_count: subscribers.len(),
            subscribers,
        }
    }
}

/// Point-in-time view of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub last_event_id: String,
    pub subscriber_count: usize,
    pub subscribers: Vec<SubscriberInfo>,
}
