//! 누산기 / 인코더 벤치마크
//!
//! 단일 스레드 추가 처리량, 경합 상황의 추가, 배치 인코딩 비용을 측정합니다.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use webstats_collector::encoder::BatchEncoder;
use webstats_collector::{BatchAccumulator, ColumnarBatchEncoder, JsonBatchEncoder};
use webstats_core::{Batch, RequestRecord};

fn record(i: usize) -> RequestRecord {
    RequestRecord::new(
        format!("203.0.{}.{}", (i / 256) % 256, i % 256),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    )
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulator_append");

    for batch_size in [1usize, 100, 10_000] {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &n| {
                let acc = BatchAccumulator::new(n);
                let records: Vec<RequestRecord> = (0..1000).map(record).collect();
                b.iter(|| {
                    for r in &records {
                        black_box(acc.append(r.clone()));
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_contended_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulator_contended");
    group.throughput(Throughput::Elements(8 * 1000));

    group.bench_function("8_threads", |b| {
        let acc = Arc::new(BatchAccumulator::new(100));
        b.iter(|| {
            std::thread::scope(|s| {
                for t in 0..8 {
                    let acc = Arc::clone(&acc);
                    s.spawn(move || {
                        for i in 0..1000 {
                            black_box(acc.append(record(t * 1000 + i)));
                        }
                    });
                }
            });
        })
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let batch = Batch::from_records((0..1000).map(record).collect());

    let encoders: [(&str, Box<dyn BatchEncoder>); 2] = [
        ("json", Box::new(JsonBatchEncoder::new())),
        ("columnar", Box::new(ColumnarBatchEncoder::new(3))),
    ];

    let mut group = c.benchmark_group("encode_1000_records");
    group.throughput(Throughput::Elements(1000));
    group.sample_size(20);

    for (name, encoder) in &encoders {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let outcome = encoder.encode(black_box(&batch), dir.path()).expect("encode");
                std::fs::remove_file(&outcome.path).expect("cleanup");
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_contended_append, bench_encode);
criterion_main!(benches);
