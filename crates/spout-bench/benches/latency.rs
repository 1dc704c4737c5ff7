//! Latency benchmarks for Spout.
//!
//! These benchmarks measure the time from publish to receipt.

use criterion::{criterion_group, criterion_main, Criterion};
use spout_bench::{bench_hub, runtime, subscribe_many};
use spout_core::{Message, SubscribeRequest};
use std::time::Instant;

/// Benchmark publish + receive through the control loop.
fn bench_publish_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("publish_latency");

    group.bench_function("single_subscriber", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let hub = bench_hub(16);
                let mut subscription = hub.subscribe(SubscribeRequest::new("t")).await.unwrap();

                let start = Instant::now();
                for _ in 0..iters {
                    hub.publish("t", Message::simple("ping")).await.unwrap();
                    subscription.recv().await.unwrap();
                }
                let elapsed = start.elapsed();

                hub.shutdown().await.unwrap();
                elapsed
            })
        });
    });

    group.bench_function("addressed_among_100", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let hub = bench_hub(16);
                let _others = subscribe_many(&hub, "t", 99).await;
                let mut target = hub
                    .subscribe(SubscribeRequest::new("t").with_identity("target"))
                    .await
                    .unwrap();

                let start = Instant::now();
                for _ in 0..iters {
                    hub.broadcast("t", "target", Message::simple("ping"))
                        .await
                        .unwrap();
                    target.recv().await.unwrap();
                }
                let elapsed = start.elapsed();

                hub.shutdown().await.unwrap();
                elapsed
            })
        });
    });

    group.finish();
}

/// Benchmark subscribe + unsubscribe round trips.
fn bench_subscribe_churn(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let hub = bench_hub(16);

                let start = Instant::now();
                for _ in 0..iters {
                    let subscription = hub.subscribe(SubscribeRequest::new("churn")).await.unwrap();
                    hub.unsubscribe(subscription.key()).await.unwrap();
                }
                let elapsed = start.elapsed();

                hub.shutdown().await.unwrap();
                elapsed
            })
        });
    });
}

criterion_group!(benches, bench_publish_latency, bench_subscribe_churn);
criterion_main!(benches);
