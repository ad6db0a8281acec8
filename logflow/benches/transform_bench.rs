//! Benchmarks for the record transform.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logflow::transform::{process_object, transform, RawRecord, TransformConfig};

fn synthetic_object(lines: usize) -> String {
    let services = ["auth", "payments", "search", "gateway"];
    let levels = ["INFO", "INFO", "WARN", "ERROR", "DEBUG"];
    let mut out = String::with_capacity(lines * 64);
    for i in 0..lines {
        out.push_str(&format!(
            "2024-01-01T{:02}:{:02}:00Z,{},{},request {} handled\n",
            (i / 60) % 24,
            i % 60,
            services[i % services.len()],
            levels[i % levels.len()],
            i
        ));
        if i % 97 == 0 {
            out.push_str("malformed,line\n");
        }
    }
    out
}

fn bench_transform_record(c: &mut Criterion) {
    let config = TransformConfig::new();
    let record = RawRecord::from_line(
        "bench.csv",
        1,
        "2024-01-01T10:00:00Z,svcA,ERROR,\"connection reset, retrying\"",
        ',',
    );

    c.bench_function("transform/record", |b| {
        b.iter(|| black_box(transform(black_box(&record), &config)));
    });
}

fn bench_process_object(c: &mut Criterion) {
    let config = TransformConfig::new();
    let mut group = c.benchmark_group("transform/process_object");

    for lines in [100, 10_000] {
        let object = synthetic_object(lines);
        group.throughput(Throughput::Bytes(object.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &object, |b, input| {
            b.iter(|| {
                let batch = process_object("bench.csv", black_box(input.as_bytes()), &config);
                black_box(batch)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transform_record, bench_process_object);
criterion_main!(benches);
