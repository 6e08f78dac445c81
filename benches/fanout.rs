//! Shared stream benchmark suite.
//!
//! Benchmarks the multiplexer at different consumer counts:
//! - Subscribe/unsubscribe churn on one event
//! - Fan-out of one delivered payload to every consumer
//!
//! Run with: cargo bench --bench fanout
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::{FutureExt, StreamExt};
use serde_json::json;

use socketio_facade::{EventStream, MemoryFactory, MemoryTransport, Socket, SocketConfig};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const URL: &str = "http://localhost:3000";
const CONSUMER_COUNTS: &[usize] = &[1, 10, 100, 1000];

// ============================================================================
// Setup
// ============================================================================

fn setup() -> (Socket, std::sync::Arc<MemoryTransport>) {
    let factory = MemoryFactory::new();
    let socket = Socket::new(SocketConfig::new(URL), factory.clone()).unwrap();
    let transport = factory.transport(URL).unwrap();
    (socket, transport)
}

// ============================================================================
// Benchmark: Subscribe Churn
// ============================================================================

fn bench_subscribe_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscribe_churn");

    for &count in CONSUMER_COUNTS {
        group.bench_with_input(BenchmarkId::new("consumers", count), &count, |b, &n| {
            let (socket, _transport) = setup();
            b.iter(|| {
                let streams: Vec<EventStream> =
                    (0..n).map(|_| socket.subscribe_event("price")).collect();
                black_box(&streams);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Fan-out
// ============================================================================

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for &count in CONSUMER_COUNTS {
        group.bench_with_input(BenchmarkId::new("consumers", count), &count, |b, &n| {
            let (socket, transport) = setup();
            let mut streams: Vec<EventStream> =
                (0..n).map(|_| socket.subscribe_event("price")).collect();

            b.iter(|| {
                transport.deliver("price", vec![json!(42)]);
                for stream in streams.iter_mut() {
                    black_box(stream.next().now_or_never());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_subscribe_churn, bench_fanout);
criterion_main!(benches);
