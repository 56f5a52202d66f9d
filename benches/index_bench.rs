//! Benchmarks for Virtindex query resolution
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use virtindex::config::IndexSettings;
use virtindex::database::{Database, MetricsMessage, TagsMessage};
use virtindex::index::postings::intersect;

const HOSTS: usize = 1000;
const METRICS_PER_HOST: usize = 20;

fn create_test_db() -> Database {
    let db = Database::new(IndexSettings::default()).unwrap();

    for host in 0..HOSTS {
        let value = format!("host{}", host);
        let dc = if host % 2 == 0 { "us_west" } else { "eu_central" };
        let status = if host % 10 == 0 { "down" } else { "live" };

        db.insert_tags(&TagsMessage {
            key: "fqdn".to_string(),
            value: value.clone(),
            tags: vec![
                format!("servers-dc:{}", dc),
                format!("servers-status:{}", status),
                format!("servers-rack:r{}", host % 40),
            ],
        })
        .unwrap();

        db.insert_metrics(&MetricsMessage {
            key: "fqdn".to_string(),
            value: value.clone(),
            metrics: (0..METRICS_PER_HOST)
                .map(|m| format!("{}.metric{}.value", value, m))
                .collect(),
        })
        .unwrap();
    }

    db.materialize_indexes().unwrap();
    db
}

fn bench_postings(c: &mut Criterion) {
    let mut group = c.benchmark_group("postings");

    for size in [1_000u64, 100_000] {
        let dense: Vec<u64> = (0..size).collect();
        let sparse: Vec<u64> = (0..size).step_by(97).collect();

        group.throughput(Throughput::Elements(size));

        group.bench_function(format!("intersect_dense_sparse_{}", size), |b| {
            b.iter(|| intersect(black_box(&[dense.as_slice(), sparse.as_slice()])))
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let db = create_test_db();
    let mut group = c.benchmark_group("query");

    group.bench_function("split_single_tag", |b| {
        b.iter(|| db.query_str(black_box("virt.v1.servers-rack:r7")).unwrap())
    });

    group.bench_function("split_two_tags", |b| {
        b.iter(|| {
            db.query_str(black_box("virt.v1.servers-dc:us_west.servers-status:down"))
                .unwrap()
        })
    });

    group.bench_function("text_pattern", |b| {
        b.iter(|| db.query_str(black_box("virt.v1.re-match:host42.metric1")).unwrap())
    });

    group.bench_function("split_and_text", |b| {
        b.iter(|| {
            db.query_str(black_box("virt.v1.servers-status:down.re-match:metric3$"))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_autocomplete(c: &mut Criterion) {
    let db = create_test_db();

    c.bench_function("autocomplete_values", |b| {
        b.iter(|| db.autocomplete(black_box("servers-rack:r1")).unwrap())
    });
}

criterion_group!(benches, bench_postings, bench_query, bench_autocomplete);
criterion_main!(benches);
