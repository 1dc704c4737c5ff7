//! Metrics collection and export for Spout.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use spout_transport::{EventSink, TransportError};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "spout_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "spout_connections_active";
    pub const EVENTS_TOTAL: &str = "spout_events_total";
    pub const EVENTS_BYTES: &str = "spout_events_bytes";
    pub const TOPICS_ACTIVE: &str = "spout_topics_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "spout_subscriptions_total";
    pub const DISCONNECTS_TOTAL: &str = "spout_disconnects_total";
    pub const PUBLISH_TOTAL: &str = "spout_publish_total";
    pub const ERRORS_TOTAL: &str = "spout_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of stream connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open stream connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events written");
    metrics::describe_counter!(names::EVENTS_BYTES, "Total bytes of events written");
    metrics::describe_gauge!(names::TOPICS_ACTIVE, "Current number of topics");
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Total number of subscriptions");
    metrics::describe_counter!(
        names::DISCONNECTS_TOTAL,
        "Total number of subscribers removed by the hub"
    );
    metrics::describe_counter!(names::PUBLISH_TOTAL, "Total number of publish requests");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an event written to a client.
pub fn record_event(bytes: usize) {
    counter!(names::EVENTS_TOTAL).increment(1);
    counter!(names::EVENTS_BYTES).increment(bytes as u64);
}

/// Record a subscription.
pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Record a subscriber removed by the hub.
pub fn record_hub_disconnect() {
    counter!(names::DISCONNECTS_TOTAL).increment(1);
}

/// Record a publish request.
pub fn record_publish(scope: &str) {
    counter!(names::PUBLISH_TOTAL, "scope" => scope.to_string()).increment(1);
}

/// Update active topic count.
pub fn set_active_topics(count: usize) {
    gauge!(names::TOPICS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

/// Sink wrapper that counts written events.
pub struct MeteredSink<S> {
    inner: S,
}

impl<S> MeteredSink<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for MeteredSink<S> {
    fn supports_flush(&self) -> bool {
        self.inner.supports_flush()
    }

    async fn send_event(&mut self, event: Bytes) -> Result<(), TransportError> {
        let len = event.len();
        match self.inner.send_event(event).await {
            Ok(()) => {
                record_event(len);
                Ok(())
            }
            Err(e) => {
                record_error("stream_write");
                Err(e)
            }
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.inner.flush().await
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.inner.closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spout_transport::ChannelSink;

    #[test]
    fn test_metrics_guard() {
        // Just test that it doesn't panic
        let _guard = ConnectionMetricsGuard::new();
    }

    #[tokio::test]
    async fn test_metered_sink_forwards() {
        let (sink, mut body) = ChannelSink::new(2);
        let mut sink = MeteredSink::new(sink);
        assert!(sink.supports_flush());

        sink.send_event(Bytes::from_static(b"data: x\n\n"))
            .await
            .unwrap();
        assert_eq!(&body.recv().await.unwrap().unwrap()[..], b"data: x\n\n");

        drop(body);
        assert!(sink.send_event(Bytes::new()).await.is_err());
    }
}
