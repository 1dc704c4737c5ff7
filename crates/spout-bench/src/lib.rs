//! Shared fixtures for Spout benchmarks.

use spout_core::{Hub, HubOptions, SubscribeRequest, Subscription};
use tokio::runtime::Runtime;

/// Build the runtime benchmarks drive the hub on.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
#[must_use]
pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}

/// Hub with queues deep enough that a benchmark iteration never stalls.
#[must_use]
pub fn bench_hub(outbound_capacity: usize) -> Hub {
    Hub::new(HubOptions::default().with_outbound_capacity(outbound_capacity))
}

/// Subscribe `count` anonymous subscribers to `topic`.
///
/// # Panics
///
/// Panics if the hub has stopped.
pub async fn subscribe_many(hub: &Hub, topic: &str, count: usize) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(count);
    for _ in 0..count {
        subscriptions.push(
            hub.subscribe(SubscribeRequest::new(topic))
                .await
                .expect("hub stopped"),
        );
    }
    subscriptions
}

/// Drain whatever is queued on every subscription.
pub fn drain_all(subscriptions: &mut [Subscription]) -> usize {
    let mut drained = 0;
    for subscription in subscriptions {
        while subscription.try_recv().is_ok() {
            drained += 1;
        }
    }
    drained
}
