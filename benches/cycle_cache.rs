use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pulsedeck_core::CycleCache;

fn bench_get_or_compute(c: &mut Criterion) {
    let cache = CycleCache::new();
    cache.rebuild(|entries| entries.insert("memory", 42u64));

    c.bench_function("cycle_cache_hit", |b| {
        b.iter(|| {
            let value: u64 = cache.get_or_compute(black_box("memory"), || 0);
            black_box(value)
        })
    });

    c.bench_function("cycle_cache_miss", |b| {
        b.iter(|| {
            cache.rebuild(|_| {});
            let value: u64 = cache.get_or_compute(black_box("fans"), || 7);
            black_box(value)
        })
    });
}

criterion_group!(benches, bench_get_or_compute);
criterion_main!(benches);
