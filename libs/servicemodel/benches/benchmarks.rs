//! Benchmarks for the servicemodel library
//!
//! Run with: cargo bench -p servicemodel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use servicemodel::core::mru_cache::MruCache;
use servicemodel::core::state::{AtomicCommunicationState, Transition};
use servicemodel::*;

fn endpoint_trait(binding: &Arc<dyn Binding<LoopbackChannel>>, path: usize) -> EndpointTrait<LoopbackChannel> {
    let address = EndpointAddress::parse(&format!("loopback://echo/{}", path)).unwrap();
    EndpointTrait::programmatic(Arc::clone(binding), address, None)
}

/// Benchmark state machine transitions
fn bench_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_machine");

    group.bench_function("get", |b| {
        let state = AtomicCommunicationState::new(CommunicationState::Opened);
        b.iter(|| black_box(state.get()))
    });

    group.bench_function("illegal_transition", |b| {
        let state = AtomicCommunicationState::new(CommunicationState::Opened);
        b.iter(|| black_box(state.apply(black_box(Transition::BeginOpen))))
    });

    group.bench_function("open_close_cycle", |b| {
        b.iter(|| {
            let object = CommunicationObject::new("bench");
            object.open(&NoOpHooks, Duration::from_secs(1)).unwrap();
            object.close(&NoOpHooks, Duration::from_secs(1)).unwrap();
            black_box(object.state())
        })
    });

    group.finish();
}

/// Benchmark endpoint trait hashing and equality
fn bench_endpoint_trait(c: &mut Criterion) {
    let mut group = c.benchmark_group("endpoint_trait");
    let binding: Arc<dyn Binding<LoopbackChannel>> = Arc::new(LoopbackBinding::new());
    let a = endpoint_trait(&binding, 1);
    let b = endpoint_trait(&binding, 1);

    group.bench_function("hash", |bench| {
        bench.iter(|| {
            let mut hasher = DefaultHasher::new();
            black_box(&a).hash(&mut hasher);
            black_box(hasher.finish())
        })
    });

    group.bench_function("eq", |bench| bench.iter(|| black_box(black_box(&a) == black_box(&b))));

    group.finish();
}

/// Benchmark MRU cache operations
fn bench_mru_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("mru_cache");
    group.throughput(Throughput::Elements(1));

    for watermark in [32usize, 256] {
        group.bench_with_input(BenchmarkId::new("get_hit", watermark), &watermark, |b, &watermark| {
            let mut cache = MruCache::new(watermark);
            for key in 0..watermark {
                cache.insert(key, key);
            }
            let mut key = 0;
            b.iter(|| {
                key = (key + 1) % watermark;
                black_box(cache.get(&key).copied())
            })
        });

        group.bench_with_input(BenchmarkId::new("insert_with_trim", watermark), &watermark, |b, &watermark| {
            let mut cache = MruCache::new(watermark);
            let mut key = 0usize;
            b.iter(|| {
                key += 1;
                black_box(cache.insert(key, key).aged_out.len())
            })
        });
    }

    group.finish();
}

/// Benchmark shared factory lookup through the client façade
fn bench_factory_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("factory_cache");
    let binding: Arc<dyn Binding<LoopbackChannel>> = Arc::new(LoopbackBinding::new());
    let manager = ChannelFactoryCacheManager::with_watermark(64);

    // Warm the cache with one published factory
    let seed = ClientBase::new(&manager, endpoint_trait(&binding, 0)).unwrap();
    seed.channel().unwrap();

    group.bench_function("try_get_value_hit", |b| {
        let cache = manager.cache_for::<LoopbackChannel>();
        let key = endpoint_trait(&binding, 0);
        b.iter(|| black_box(cache.try_get_value(&key).is_some()))
    });

    group.bench_function("client_on_cached_factory", |b| {
        b.iter(|| {
            let client = ClientBase::new(&manager, endpoint_trait(&binding, 0)).unwrap();
            let channel = client.channel().unwrap();
            black_box(channel.echo("ping").unwrap());
            client.close(Duration::from_secs(1)).unwrap();
        })
    });

    group.finish();
    seed.abort();
    manager.shutdown();
}

criterion_group!(
    benches,
    bench_state_machine,
    bench_endpoint_trait,
    bench_mru_cache,
    bench_factory_cache,
);

criterion_main!(benches);
