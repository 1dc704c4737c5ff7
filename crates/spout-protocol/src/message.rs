//! The message envelope delivered to subscribers.

use std::fmt;

/// Event label carried by synthetic keep-alive messages.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// An event-stream message.
///
/// Messages are immutable once built. The retry hint is normally left unset
/// here and stamped by the delivery path from the server-wide setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    id: String,
    data: String,
    event: String,
    retry: u64,
    version: u32,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(id: impl Into<String>, data: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            event: event.into(),
            retry: 0,
            version: 0,
        }
    }

    /// Create a message carrying only a payload.
    #[must_use]
    pub fn simple(data: impl Into<String>) -> Self {
        Self::new("", data, "")
    }

    /// Create the keep-alive message broadcast by the hub.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new("", "", HEARTBEAT_EVENT)
    }

    /// Set the compatibility version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the reconnection hint in milliseconds.
    #[must_use]
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = retry_ms;
        self
    }

    /// The event id, empty if none.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The payload.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The event label, empty for the default event.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The retry hint in milliseconds, 0 if unset.
    #[must_use]
    pub fn retry(&self) -> u64 {
        self.retry
    }

    /// The compatibility version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether this is a hub keep-alive.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.event == HEARTBEAT_EVENT && self.id.is_empty() && self.data.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = crate::codec::encode(self);
        f.write_str(&String::from_utf8_lossy(&encoded))
    }
}
