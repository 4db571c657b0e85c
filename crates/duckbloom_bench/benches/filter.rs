use criterion::{black_box, criterion_group, criterion_main, Criterion};
use duckbloom_core::BloomFilter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn digests(n: usize) -> Vec<[u8; 20]> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..n)
        .map(|_| {
            let mut d = [0u8; 20];
            rng.fill(&mut d);
            d
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let items = digests(10_000);

    let mut mem = BloomFilter::in_memory(1 << 20, 7).unwrap();
    c.bench_function("add160/in_memory", |b| {
        b.iter(|| {
            for d in &items {
                mem.add160(black_box(d));
            }
        })
    });
    c.bench_function("check160/in_memory", |b| {
        b.iter(|| items.iter().filter(|d| mem.check160(black_box(d))).count())
    });
    c.bench_function("add_atomic/in_memory", |b| {
        b.iter(|| {
            for d in &items {
                mem.add_atomic(black_box(d));
            }
        })
    });

    let dir = tempfile::tempdir().unwrap();
    let mut file = BloomFilter::create(dir.path().join("bench.blm"), 1 << 20, 7).unwrap();
    c.bench_function("add/file", |b| {
        b.iter(|| {
            for d in &items {
                file.add(black_box(d));
            }
        })
    });
    c.bench_function("sync/file", |b| b.iter(|| file.sync().unwrap()));
}

criterion_group!(benches, bench_filter);
criterion_main!(benches);
