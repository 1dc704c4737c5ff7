//! Logging capability injected into the hub.
//!
//! The hub reports its operational events (topics created, subscribers
//! leaving, routing misses) through a [`Logger`]. When none is configured the
//! lines are discarded.

use std::fmt;
use tracing::info;

/// Sink for the hub's operational log lines.
pub trait Logger: Send + Sync {
    /// Log a plain message.
    fn print(&self, message: &str);

    /// Log a formatted message.
    fn printf(&self, args: fmt::Arguments<'_>) {
        self.print(&args.to_string());
    }
}

/// Logger that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardLogger;

impl Logger for DiscardLogger {
    fn print(&self, _message: &str) {}

    fn printf(&self, _args: fmt::Arguments<'_>) {}
}

/// Logger that forwards to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn print(&self, message: &str) {
        info!(target: "spout::hub", "{}", message);
    }

    fn printf(&self, args: fmt::Arguments<'_>) {
        info!(target: "spout::hub", "{}", args);
    }
}
