//! # spout-core
//!
//! Topic registry and dispatch hub for the Spout server-push engine.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Subscriber** - One outbound delivery endpoint with a version filter
//! - **Topic** - A named group of subscribers
//! - **Hub** - The single control loop that owns every topic
//! - **Logger** - Injected sink for the hub's operational log lines
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  commands   ┌─────────────┐     ┌─────────────┐
//! │  Hub handle │────────────▶│ control loop│────▶│   Topic     │
//! └─────────────┘   (mpsc)    └─────────────┘     └─────────────┘
//!                                    ▲                   │
//!                          heartbeat │                   ▼
//!                                    │            ┌─────────────┐
//!                                 interval        │ Subscriber  │──▶ outbound queue
//!                                                 └─────────────┘
//! ```
//!
//! Every mutation of the topic table happens inside the control loop, one
//! command at a time, so requests are totally ordered with respect to each
//! other.

pub mod hub;
pub mod logger;
pub mod subscriber;
pub mod topic;

pub use hub::{DisconnectHook, Hub, HubError, HubOptions, DEFAULT_HEARTBEAT_INTERVAL};
pub use logger::{DiscardLogger, Logger, TracingLogger};
pub use spout_protocol::Message;
pub use subscriber::{
    SubscribeRequest, Subscriber, SubscriberId, SubscriberInfo, SubscriberKey, Subscription,
};
pub use topic::{Topic, TopicInfo};
