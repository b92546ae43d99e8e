use std::num::NonZeroU32;
use std::sync::Arc;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use governor::Quota;
use governor::RateLimiter;

use drip_limit::Limiter;
use drip_limit::MemoryStore;

fn limiter(spec: &str) -> Limiter {
    Limiter::new(spec.parse().unwrap(), 1_000_000.0)
        .unwrap()
        .with_store(Arc::new(MemoryStore::new()))
}

fn bench_single_key(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("decide-single-key");

    for (id, spec) in [("sliding", "1000000/min"), ("fixed", "1000000/min:fixed")] {
        let limiter = limiter(spec);
        group.bench_function(id, |b| {
            b.to_async(&rt).iter(|| {
                let l = limiter.clone();
                async move {
                    let verdict = l.decide("bench", 1.0).await.unwrap();
                    black_box(verdict)
                }
            });
        });
    }

    // Governor's keyed limiter as the reference point.
    let quota = Quota::per_minute(NonZeroU32::new(1_000_000).unwrap());
    let gov = RateLimiter::keyed(quota);
    group.bench_function("governor", |b| {
        b.iter(|| {
            let outcome = gov.check_key(&"bench");
            black_box(outcome)
        });
    });

    group.finish();
}

fn bench_key_spread(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("decide-key-spread");

    for keys in [100usize, 10_000, 100_000] {
        let limiter = limiter("1000000/min");
        let names: Vec<String> = (0..keys).map(|i| format!("client-{i}")).collect();

        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, &n| {
            let mut i = 0usize;
            b.to_async(&rt).iter(|| {
                let l = limiter.clone();
                let key = names[i % n].clone();
                i = i.wrapping_add(1);
                async move {
                    let verdict = l.decide(&key, 1.0).await.unwrap();
                    black_box(verdict)
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_key, bench_key_spread);
criterion_main!(benches);
