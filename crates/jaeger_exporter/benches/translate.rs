use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jaeger_exporter::wire::{encode_emit_batch, serialize_binary, Batch, Process, Tag};
use jaeger_exporter::{span_to_wire, AttributeValue, SpanId, SpanKind, SpanRecord, Status, TraceId};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

fn record(id: u64) -> SpanRecord {
    let mut span = SpanRecord::new(
        TraceId::from_u128((u128::from(id) << 64) | 0xfeed),
        SpanId::from_u64(id),
        "/api/v1/users",
        SpanKind::Server,
    );
    span.parent_span_id = SpanId::from_u64(id + 1);
    span.set_attribute("http.method", "GET");
    span.set_attribute("http.status_code", 200i64);
    span.set_attribute("cache.hit", true);
    span.set_attribute("load", 0.42);
    let now = SystemTime::now();
    span.annotate(
        now,
        "request received",
        HashMap::from([("bytes".to_string(), AttributeValue::Int64(512))]),
    );
    span.finish(now + Duration::from_millis(3), Status::new(Status::OK, ""));
    span
}

fn bench_translate(c: &mut Criterion) {
    let span = record(1);
    c.bench_function("span_to_wire", |b| {
        b.iter(|| black_box(span_to_wire(black_box(&span))));
    });
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let process = Process {
        service_name: "bench".to_string(),
        tags: vec![Tag::string("hostname", "localhost")],
    };

    for spans in [1u64, 10, 100] {
        let batch = Batch::new(process.clone(), (0..spans).map(|i| span_to_wire(&record(i))).collect());
        group.throughput(Throughput::Elements(spans));

        group.bench_with_input(BenchmarkId::new("agent_compact", spans), &batch, |b, batch| {
            b.iter(|| encode_emit_batch(black_box(batch), 1).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("collector_binary", spans), &batch, |b, batch| {
            b.iter(|| serialize_binary(black_box(batch)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_translate, bench_encode);
criterion_main!(benches);
