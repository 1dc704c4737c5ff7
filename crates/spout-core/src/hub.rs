//! The dispatch hub for Spout.
//!
//! The hub owns every topic. A single control loop, spawned when the hub is
//! created, applies subscribe, unsubscribe, broadcast, close, restart and
//! shutdown requests one at a time, plus a heartbeat tick when enabled.
//! [`Hub`] is a cheap handle that marshals requests into that loop.
//!
//! Broadcasts are fanned out from inside the loop and wait for space in each
//! subscriber's outbound queue, so a subscriber whose queue stays full stalls
//! the whole hub until it is drained or its receiver is dropped.

use crate::logger::{DiscardLogger, Logger};
use crate::subscriber::{SubscribeRequest, Subscriber, SubscriberKey, Subscription};
use crate::topic::{Topic, TopicInfo};
use spout_protocol::Message;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Default interval between heartbeat messages.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default outbound queue capacity per subscriber.
const DEFAULT_OUTBOUND_CAPACITY: usize = 16;

/// Default number of requests buffered ahead of the control loop.
const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Hub errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The control loop has stopped.
    #[error("Hub has been shut down")]
    Stopped,
}

/// Callback invoked with `(topic, identity)` after a subscriber is removed.
pub type DisconnectHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Hub configuration.
#[derive(Clone)]
pub struct HubOptions {
    /// Broadcast a heartbeat message on every interval.
    pub heartbeat: bool,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Outbound queue capacity per subscriber.
    pub outbound_capacity: usize,
    /// Requests buffered ahead of the control loop.
    pub command_capacity: usize,
    /// Operational log sink; lines are discarded when unset.
    pub logger: Option<Arc<dyn Logger>>,
    /// Called after each subscriber removal.
    pub on_disconnect: Option<DisconnectHook>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            heartbeat: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            logger: None,
            on_disconnect: None,
        }
    }
}

impl HubOptions {
    /// Enable or disable heartbeats.
    #[must_use]
    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = enabled;
        self
    }

    /// Set the heartbeat period.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Set the request buffer size.
    #[must_use]
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Set the operational log sink.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the disconnect callback.
    #[must_use]
    pub fn with_on_disconnect(mut self, hook: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for HubOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubOptions")
            .field("heartbeat", &self.heartbeat)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("outbound_capacity", &self.outbound_capacity)
            .field("command_capacity", &self.command_capacity)
            .field("logger", &self.logger.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// Requests handled by the control loop.
enum Command {
    Subscribe(Subscriber),
    Unsubscribe(SubscriberKey),
    Broadcast {
        topic: String,
        identity: String,
        message: Arc<Message>,
    },
    CloseTopic(String),
    Restart,
    Shutdown(oneshot::Sender<()>),
    TopicExists(String, oneshot::Sender<bool>),
    GetTopic(String, oneshot::Sender<Option<TopicInfo>>),
    ListTopics(oneshot::Sender<Vec<String>>),
    SubscriberCount(oneshot::Sender<usize>),
}

/// Handle to the dispatch hub.
///
/// Clones share the same control loop. The loop stops on [`Hub::shutdown`]
/// or once every handle is dropped; afterwards every method returns
/// [`HubError::Stopped`].
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    outbound_capacity: usize,
}

impl Hub {
    /// Create a hub and spawn its control loop.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(options: HubOptions) -> Self {
        debug!("Creating hub with options: {:?}", options);

        let (commands, receiver) = mpsc::channel(options.command_capacity.max(1));
        let outbound_capacity = options.outbound_capacity;
        tokio::spawn(Dispatcher::new(options).run(receiver));

        Self {
            commands,
            outbound_capacity,
        }
    }

    /// Register a subscriber and return the subscription that drains it.
    ///
    /// The topic is created if this is its first subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<Subscription, HubError> {
        let (subscriber, subscription) = Subscriber::channel(request, self.outbound_capacity);
        self.send(Command::Subscribe(subscriber)).await?;
        Ok(subscription)
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Removing a subscriber that is already gone is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn unsubscribe(&self, key: &SubscriberKey) -> Result<(), HubError> {
        self.send(Command::Unsubscribe(key.clone())).await
    }

    /// Broadcast a message.
    ///
    /// An empty `topic` targets every topic; an empty `identity` targets
    /// every subscriber of the resolved topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn broadcast(
        &self,
        topic: impl Into<String>,
        identity: impl Into<String>,
        message: Message,
    ) -> Result<(), HubError> {
        self.send(Command::Broadcast {
            topic: topic.into(),
            identity: identity.into(),
            message: Arc::new(message),
        })
        .await
    }

    /// Broadcast a message to every subscriber of `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn publish(&self, topic: impl Into<String>, message: Message) -> Result<(), HubError> {
        self.broadcast(topic, String::new(), message).await
    }

    /// Disconnect every subscriber of a topic and delete it.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn close_topic(&self, name: impl Into<String>) -> Result<(), HubError> {
        self.send(Command::CloseTopic(name.into())).await
    }

    /// Close every topic while keeping the hub running.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn restart(&self) -> Result<(), HubError> {
        self.send(Command::Restart).await
    }

    /// Close every topic and stop the control loop.
    ///
    /// Resolves once every subscriber queue has been closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub had already stopped.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.query(Command::Shutdown).await
    }

    /// Check if a topic exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn topic_exists(&self, name: impl Into<String>) -> Result<bool, HubError> {
        let name = name.into();
        self.query(|reply| Command::TopicExists(name, reply)).await
    }

    /// Snapshot a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn get_topic(&self, name: impl Into<String>) -> Result<Option<TopicInfo>, HubError> {
        let name = name.into();
        self.query(|reply| Command::GetTopic(name, reply)).await
    }

    /// Get all topic names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn list_topics(&self) -> Result<Vec<String>, HubError> {
        self.query(Command::ListTopics).await
    }

    /// Count subscribers across all topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn total_subscriber_count(&self) -> Result<usize, HubError> {
        self.query(Command::SubscriberCount).await
    }

    /// Check if the control loop has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Stopped)
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| HubError::Stopped)
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("stopped", &self.is_stopped())
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}

/// State owned by the control loop.
struct Dispatcher {
    topics: HashMap<String, Topic>,
    logger: Arc<dyn Logger>,
    on_disconnect: Option<DisconnectHook>,
    heartbeat: bool,
    heartbeat_interval: Duration,
}

impl Dispatcher {
    fn new(options: HubOptions) -> Self {
        Self {
            topics: HashMap::new(),
            logger: options.logger.unwrap_or_else(|| Arc::new(DiscardLogger)),
            on_disconnect: options.on_disconnect,
            heartbeat: options.heartbeat,
            heartbeat_interval: options.heartbeat_interval.max(Duration::from_millis(1)),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.logger.print("hub started.");

        let period = self.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let keepalive = Arc::new(Message::heartbeat());

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        commands.close();
                        self.close_all();
                        self.logger.print("hub stopped.");
                        let _ = done.send(());
                        return;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.close_all();
                        self.logger.print("hub stopped.");
                        return;
                    }
                },
                _ = heartbeat.tick(), if self.heartbeat => {
                    self.broadcast("", "", &keepalive).await;
                }
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(subscriber) => self.subscribe(subscriber),
            Command::Unsubscribe(key) => self.unsubscribe(&key),
            Command::Broadcast {
                topic,
                identity,
                message,
            } => self.broadcast(&topic, &identity, &message).await,
            Command::CloseTopic(name) => self.close_topic(&name),
            Command::Restart => {
                self.logger.print("restarting hub.");
                self.close_all();
            }
            Command::TopicExists(name, reply) => {
                let _ = reply.send(self.topics.contains_key(&name));
            }
            Command::GetTopic(name, reply) => {
                let _ = reply.send(self.topics.get(&name).map(Topic::info));
            }
            Command::ListTopics(reply) => {
                let mut names: Vec<String> = self.topics.keys().cloned().collect();
                names.sort();
                let _ = reply.send(names);
            }
            Command::SubscriberCount(reply) => {
                let _ = reply.send(self.topics.values().map(Topic::client_count).sum());
            }
            // Handled by the loop itself.
            Command::Shutdown(_) => {}
        }
    }

    fn subscribe(&mut self, subscriber: Subscriber) {
        let name = subscriber.topic().to_string();

        let topic = match self.topics.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.logger
                    .printf(format_args!("topic '{}' created.", entry.key()));
                let topic = Topic::new(entry.key().clone());
                entry.insert(topic)
            }
        };

        let displaced = topic.add_subscriber(subscriber);
        self.logger.printf(format_args!(
            "new subscriber connected to topic '{}'.",
            topic.name()
        ));

        if let Some(previous) = displaced {
            self.logger.printf(format_args!(
                "subscriber '{}' replaced on topic '{}'.",
                previous.identity(),
                previous.topic()
            ));
            self.disconnect(previous);
        }
    }

    fn unsubscribe(&mut self, key: &SubscriberKey) {
        let (removed, empty) = match self.topics.get_mut(&key.topic) {
            Some(topic) => {
                let removed = topic.remove_subscriber(key.id);
                (removed, topic.is_empty())
            }
            None => {
                self.logger.printf(format_args!(
                    "subscriber left topic '{}', but it doesn't exist.",
                    key.topic
                ));
                return;
            }
        };

        if let Some(subscriber) = removed {
            self.disconnect(subscriber);
            self.logger.printf(format_args!(
                "subscriber disconnected from topic '{}'.",
                key.topic
            ));
        }

        if empty {
            self.topics.remove(&key.topic);
            self.logger.printf(format_args!(
                "topic '{}' has no subscribers.",
                key.topic
            ));
        }
    }

    async fn broadcast(&mut self, topic: &str, identity: &str, message: &Arc<Message>) {
        if topic.is_empty() {
            if !message.is_heartbeat() {
                self.logger.print("broadcasting message to all topics.");
            }
            for target in self.topics.values_mut() {
                target.send_message(identity, message).await;
            }
        } else if let Some(target) = self.topics.get_mut(topic) {
            self.logger
                .printf(format_args!("message sent to topic '{}'.", topic));
            target.send_message(identity, message).await;
        } else {
            self.logger.printf(format_args!(
                "message not sent because topic '{}' has no subscribers.",
                topic
            ));
        }
    }

    fn close_topic(&mut self, name: &str) {
        match self.topics.remove(name) {
            Some(mut topic) => {
                for subscriber in topic.close() {
                    self.disconnect(subscriber);
                }
                self.logger
                    .printf(format_args!("topic '{}' closed.", name));
            }
            None => self.logger.printf(format_args!(
                "requested to close topic '{}', but it doesn't exist.",
                name
            )),
        }
    }

    fn close_all(&mut self) {
        let names: Vec<String> = self.topics.keys().cloned().collect();
        for name in names {
            self.close_topic(&name);
        }
    }

    /// Drop a removed subscriber, closing its queue, then notify.
    fn disconnect(&self, subscriber: Subscriber) {
        let topic = subscriber.topic().to_string();
        let identity = subscriber.identity().to_string();
        drop(subscriber);

        if let Some(hook) = &self.on_disconnect {
            hook(&topic, &identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc::error::TryRecvError;

    #[derive(Default)]
    struct MemoryLogger {
        lines: Mutex<Vec<String>>,
    }

    impl MemoryLogger {
        fn contains(&self, needle: &str) -> bool {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .any(|line| line.contains(needle))
        }
    }

    impl Logger for MemoryLogger {
        fn print(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    fn logged_hub() -> (Hub, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::default());
        let hub = Hub::new(HubOptions::default().with_logger(logger.clone()));
        (hub, logger)
    }

    #[tokio::test]
    async fn test_subscribe_creates_topic() {
        let (hub, logger) = logged_hub();

        let _sub = hub.subscribe(SubscribeRequest::new("/news")).await.unwrap();
        assert!(hub.topic_exists("/news").await.unwrap());
        assert_eq!(hub.list_topics().await.unwrap(), vec!["/news".to_string()]);
        assert_eq!(hub.total_subscriber_count().await.unwrap(), 1);
        assert!(logger.contains("topic '/news' created."));
    }

    #[tokio::test]
    async fn test_broadcast_to_topic() {
        let hub = Hub::new(HubOptions::default());
        let mut first = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut second = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut other = hub.subscribe(SubscribeRequest::new("u")).await.unwrap();

        hub.publish("t", Message::new("5", "hello", "")).await.unwrap();

        assert_eq!(first.recv().await.unwrap().id(), "5");
        assert_eq!(second.recv().await.unwrap().id(), "5");

        let info = hub.get_topic("t").await.unwrap().unwrap();
        assert_eq!(info.last_event_id, "5");
        assert_eq!(info.subscriber_count, 2);
        assert!(info.subscribers.iter().all(|s| s.last_event_id == "5"));

        assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(first.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_broadcast_to_all_topics() {
        let (hub, logger) = logged_hub();
        let mut a = hub.subscribe(SubscribeRequest::new("a")).await.unwrap();
        let mut b = hub.subscribe(SubscribeRequest::new("b")).await.unwrap();

        hub.broadcast("", "", Message::simple("everyone"))
            .await
            .unwrap();

        assert_eq!(a.recv().await.unwrap().data(), "everyone");
        assert_eq!(b.recv().await.unwrap().data(), "everyone");
        assert!(logger.contains("broadcasting message to all topics."));
    }

    #[tokio::test]
    async fn test_broadcast_to_identity() {
        let hub = Hub::new(HubOptions::default());
        let mut alice = hub
            .subscribe(SubscribeRequest::new("t").with_identity("alice"))
            .await
            .unwrap();
        let mut bob = hub
            .subscribe(SubscribeRequest::new("t").with_identity("bob"))
            .await
            .unwrap();

        hub.broadcast("t", "bob", Message::simple("for bob"))
            .await
            .unwrap();
        hub.broadcast("t", "carol", Message::simple("for nobody"))
            .await
            .unwrap();
        // Queries are ordered after the broadcasts above.
        assert!(hub.topic_exists("t").await.unwrap());

        assert_eq!(bob.try_recv().unwrap().data(), "for bob");
        assert!(matches!(bob.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(alice.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_version_filter() {
        let hub = Hub::new(HubOptions::default());
        let mut legacy = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut current = hub
            .subscribe(SubscribeRequest::new("t").with_min_version(2))
            .await
            .unwrap();

        hub.publish("t", Message::new("1", "v0", "")).await.unwrap();
        hub.publish("t", Message::new("2", "v2", "").with_version(2))
            .await
            .unwrap();
        hub.publish("t", Message::new("3", "v3", "").with_version(3))
            .await
            .unwrap();
        assert!(hub.topic_exists("t").await.unwrap());

        assert_eq!(legacy.try_recv().unwrap().id(), "1");
        assert!(matches!(legacy.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(current.try_recv().unwrap().id(), "1");
        assert_eq!(current.try_recv().unwrap().id(), "2");
        assert!(matches!(current.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unsubscribe_last_deletes_topic() {
        let (hub, logger) = logged_hub();
        let mut sub = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        hub.unsubscribe(sub.key()).await.unwrap();
        assert!(sub.recv().await.is_none());
        assert!(!hub.topic_exists("t").await.unwrap());
        assert!(logger.contains("topic 't' has no subscribers."));

        hub.publish("t", Message::simple("late")).await.unwrap();
        assert_eq!(hub.total_subscriber_count().await.unwrap(), 0);
        assert!(logger.contains("message not sent because topic 't' has no subscribers."));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = Hub::new(HubOptions::default());
        let first = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut second = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        hub.unsubscribe(first.key()).await.unwrap();
        hub.unsubscribe(first.key()).await.unwrap();

        assert_eq!(hub.total_subscriber_count().await.unwrap(), 1);
        hub.publish("t", Message::simple("still here")).await.unwrap();
        assert_eq!(second.recv().await.unwrap().data(), "still here");
    }

    #[tokio::test]
    async fn test_on_disconnect_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let hub = Hub::new(HubOptions::default().with_on_disconnect(move |topic, identity| {
            record
                .lock()
                .unwrap()
                .push(format!("{topic}:{identity}"));
        }));

        let sub = hub
            .subscribe(SubscribeRequest::new("t").with_identity("alice"))
            .await
            .unwrap();
        hub.unsubscribe(sub.key()).await.unwrap();
        hub.unsubscribe(sub.key()).await.unwrap();
        assert!(!hub.topic_exists("t").await.unwrap());

        assert_eq!(*seen.lock().unwrap(), vec!["t:alice".to_string()]);
    }

    #[tokio::test]
    async fn test_identity_replacement() {
        let disconnects = Arc::new(Mutex::new(0));
        let counter = disconnects.clone();
        let hub = Hub::new(HubOptions::default().with_on_disconnect(move |_, _| {
            *counter.lock().unwrap() += 1;
        }));

        let mut old = hub
            .subscribe(SubscribeRequest::new("t").with_identity("alice"))
            .await
            .unwrap();
        let mut new = hub
            .subscribe(SubscribeRequest::new("t").with_identity("alice"))
            .await
            .unwrap();

        assert!(old.recv().await.is_none());
        assert_eq!(hub.total_subscriber_count().await.unwrap(), 1);
        assert_eq!(*disconnects.lock().unwrap(), 1);

        hub.broadcast("t", "alice", Message::simple("hi"))
            .await
            .unwrap();
        assert_eq!(new.recv().await.unwrap().data(), "hi");

        // The stale key no longer matches anyone.
        hub.unsubscribe(old.key()).await.unwrap();
        assert_eq!(hub.total_subscriber_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_topic() {
        let (hub, logger) = logged_hub();
        let mut a = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut b = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();
        let mut kept = hub.subscribe(SubscribeRequest::new("u")).await.unwrap();

        hub.close_topic("t").await.unwrap();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert!(!hub.topic_exists("t").await.unwrap());
        assert!(hub.topic_exists("u").await.unwrap());
        assert!(matches!(kept.try_recv(), Err(TryRecvError::Empty)));

        hub.close_topic("missing").await.unwrap();
        assert!(hub.topic_exists("u").await.unwrap());
        assert!(logger.contains("requested to close topic 'missing', but it doesn't exist."));
    }

    #[tokio::test]
    async fn test_restart_keeps_hub_running() {
        let hub = Hub::new(HubOptions::default());
        let mut a = hub.subscribe(SubscribeRequest::new("a")).await.unwrap();
        let mut b = hub.subscribe(SubscribeRequest::new("b")).await.unwrap();

        hub.restart().await.unwrap();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert!(hub.list_topics().await.unwrap().is_empty());

        let mut fresh = hub.subscribe(SubscribeRequest::new("a")).await.unwrap();
        hub.publish("a", Message::simple("again")).await.unwrap();
        assert_eq!(fresh.recv().await.unwrap().data(), "again");
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (hub, logger) = logged_hub();
        let mut a = hub.subscribe(SubscribeRequest::new("a")).await.unwrap();
        let mut b = hub.subscribe(SubscribeRequest::new("b")).await.unwrap();

        hub.shutdown().await.unwrap();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert!(logger.contains("hub stopped."));

        assert_eq!(hub.shutdown().await, Err(HubError::Stopped));
        assert_eq!(
            hub.publish("a", Message::simple("x")).await,
            Err(HubError::Stopped)
        );
        assert!(hub.subscribe(SubscribeRequest::new("a")).await.is_err());
        assert!(hub.is_stopped());
    }

    #[tokio::test]
    async fn test_dropping_all_handles_stops_hub() {
        let hub = Hub::new(HubOptions::default());
        let mut sub = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        drop(hub);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_creates_one_topic() {
        let (hub, logger) = logged_hub();
        let (first, second) = tokio::join!(
            hub.subscribe(SubscribeRequest::new("race")),
            hub.subscribe(SubscribeRequest::new("race"))
        );
        let (_first, _second) = (first.unwrap(), second.unwrap());

        assert_eq!(hub.list_topics().await.unwrap(), vec!["race".to_string()]);
        assert_eq!(hub.total_subscriber_count().await.unwrap(), 2);

        let created = logger
            .lines
            .lock()
            .unwrap()
            .iter()
            .filter(|line| *line == "topic 'race' created.")
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat() {
        let (hub, logger) = logged_hub_with(HubOptions::default().with_heartbeat(true));
        let mut sub = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        let message = time::timeout(Duration::from_secs(16), sub.recv())
            .await
            .expect("heartbeat within one interval")
            .unwrap();
        assert!(message.is_heartbeat());
        assert!(!logger.contains("broadcasting message to all topics."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_disabled() {
        let hub = Hub::new(HubOptions::default());
        let mut sub = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        let result = time::timeout(Duration::from_secs(60), sub.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_stalls_hub() {
        let hub = Hub::new(HubOptions::default().with_outbound_capacity(1));
        let mut slow = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

        hub.publish("t", Message::new("1", "a", "")).await.unwrap();
        hub.publish("t", Message::new("2", "b", "")).await.unwrap();

        // The second delivery is waiting for queue space.
        let stalled = time::timeout(Duration::from_secs(5), hub.topic_exists("t")).await;
        assert!(stalled.is_err());

        assert_eq!(slow.recv().await.unwrap().id(), "1");
        assert!(hub.topic_exists("t").await.unwrap());
        assert_eq!(slow.recv().await.unwrap().id(), "2");
    }

    fn logged_hub_with(options: HubOptions) -> (Hub, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::default());
        let hub = Hub::new(options.with_logger(logger.clone()));
        (hub, logger)
    }
}
