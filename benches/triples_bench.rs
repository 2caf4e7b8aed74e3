use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tribits::{Bitmap, BitmapTriples, Config, IndexPolicy, TripleId};

fn bench_bitmap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap");
    let bm = Bitmap::build((0..64000).map(|i| i % 2 == 1)).unwrap(); // 50% density

    group.bench_function("rank1", |b| {
        b.iter(|| {
            for i in 0..64000 {
                black_box(bm.rank1(i));
            }
        })
    });

    group.bench_function("select1", |b| {
        b.iter(|| {
            for k in 1..=32000 {
                black_box(bm.select1(k).ok());
            }
        })
    });
}

fn sample_triples() -> Vec<TripleId> {
    let mut triples = Vec::new();
    for s in 1..=5000u64 {
        for p in 1..=(s % 8 + 1) {
            for o in 0..(s % 5 + 1) {
                triples.push(TripleId::new(s, p, (s * 7 + o) % 10000 + 1));
            }
        }
    }
    for t in triples.chunk_by_mut(|a, b| a.subject == b.subject && a.predicate == b.predicate) {
        t.sort();
    }
    triples
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let triples = sample_triples();
    let indexed = BitmapTriples::build(triples.iter().copied(), &Config::default()).unwrap();
    indexed.ensure_predicate_index();
    let scan_config = Config::default().with_predicate_index(IndexPolicy::Disabled);
    let scan = BitmapTriples::build(triples.iter().copied(), &scan_config).unwrap();

    group.bench_function("s??", |b| {
        b.iter(|| {
            for s in (1..=5000).step_by(97) {
                black_box(indexed.search(TripleId::new(s, 0, 0)).count());
            }
        })
    });

    group.bench_function("spo", |b| {
        b.iter(|| {
            for t in triples.iter().step_by(101) {
                black_box(indexed.contains(*t));
            }
        })
    });

    group.bench_function("?p? indexed", |b| {
        b.iter(|| black_box(indexed.search(TripleId::new(0, 8, 0)).count()))
    });

    group.bench_function("?p? scan", |b| {
        b.iter(|| black_box(scan.search(TripleId::new(0, 8, 0)).count()))
    });

    group.bench_function("???", |b| b.iter(|| black_box(indexed.iter().count())));
}

criterion_group!(benches, bench_bitmap, bench_search);
criterion_main!(benches);
