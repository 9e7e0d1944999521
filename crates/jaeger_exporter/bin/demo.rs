//! # Jaeger Exporter Demo
//!
//! End-to-end run of the exporter against a local stand-in for the Jaeger agent: a UDP
//! listener that decodes every `emitBatch` datagram it receives.
//!
//! - Several producer threads ingest spans concurrently (ingest is synchronous)
//! - Spans carry realistic attributes, annotations and an occasional error status
//! - Batches leave on the count threshold, on the delay threshold and on `flush`
//! - A deliberately tiny second exporter shows oversized batches going to the error handler
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (2 producers, 50 spans each)
//! cargo run -p jaeger_exporter --bin demo -- --quick
//!
//! # Full mode with debug logs from the exporter
//! RUST_LOG=jaeger_exporter=debug cargo run -p jaeger_exporter --bin demo
//! ```

use jaeger_exporter::wire::decode_emit_batch;
use jaeger_exporter::{
    AttributeValue, BatchConfig, ErrorHandler, ExporterConfig, JaegerExporter, ProcessTag, SpanId,
    SpanKind, SpanRecord, Status, TraceId,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let quick = std::env::args().any(|arg| arg == "--quick");
    let (num_producers, spans_per_producer) = if quick { (2, 50) } else { (8, 500) };

    println!("\n=== Jaeger Exporter Demo ===\n");

    // =========================================================================
    // FAKE AGENT
    // =========================================================================

    let agent = UdpSocket::bind("127.0.0.1:0").await?;
    let agent_addr = agent.local_addr()?;
    let received_spans = Arc::new(AtomicU64::new(0));
    let received_batches = Arc::new(AtomicU64::new(0));
    let listener = tokio::spawn(run_agent(
        agent,
        Arc::clone(&received_spans),
        Arc::clone(&received_batches),
    ));
    println!("fake agent listening on {agent_addr}");

    // =========================================================================
    // EXPORTER
    // =========================================================================

    let config = ExporterConfig::new()
        .with_agent_endpoint(agent_addr.to_string())
        .with_process(
            "demo-service",
            vec![
                ProcessTag::string("hostname", "localhost"),
                ProcessTag::int64("pid", i64::from(std::process::id())),
                ProcessTag::bool("demo", true),
            ],
        )
        .with_batch_config(BatchConfig {
            max_batch_count: 50,
            batch_timeout: Duration::from_millis(200),
            ..BatchConfig::default()
        });
    let exporter = Arc::new(JaegerExporter::new(config).await?);

    // =========================================================================
    // PRODUCERS
    // =========================================================================

    let start = std::time::Instant::now();
    let producers: Vec<_> = (0..num_producers)
        .map(|producer_id| {
            let exporter = Arc::clone(&exporter);
            std::thread::spawn(move || run_producer(producer_id, spans_per_producer, &exporter))
        })
        .collect();
    for producer in producers {
        producer
            .join()
            .map_err(|_| "producer thread panicked")?;
    }
    exporter.flush().await;
    let elapsed = start.elapsed();

    let metrics = Arc::clone(exporter.metrics());
    match Arc::try_unwrap(exporter) {
        Ok(exporter) => exporter.shutdown().await,
        Err(_) => return Err("exporter still shared".into()),
    }

    // =========================================================================
    // OVERSIZED BATCHES
    // =========================================================================

    let rejected = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&rejected);
    let tiny = JaegerExporter::new(
        ExporterConfig::new()
            .with_agent_endpoint(agent_addr.to_string())
            .with_agent_max_packet_size(256)
            .with_error_handler(ErrorHandler::new(move |err| {
                counter.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "batch rejected");
            })),
    )
    .await?;
    run_producer(99, 20, &tiny);
    tiny.flush().await;
    tiny.shutdown().await;

    // let the last datagrams arrive
    tokio::time::sleep(Duration::from_millis(100)).await;
    listener.abort();

    // =========================================================================
    // SUMMARY
    // =========================================================================

    let total = (num_producers * spans_per_producer) as u64;
    println!();
    println!("producers:            {num_producers:>10}");
    println!("spans ingested:       {total:>10}");
    println!("spans exported:       {:>10}", metrics.spans_exported());
    println!("batches exported:     {:>10}", metrics.batches_exported());
    println!("export errors:        {:>10}", metrics.export_errors());
    println!("spans dropped:        {:>10}", metrics.spans_dropped());
    println!("agent received spans: {:>10}", received_spans.load(Ordering::Relaxed));
    println!("agent received batches:{:>9}", received_batches.load(Ordering::Relaxed));
    println!("oversized rejections: {:>10}", rejected.load(Ordering::Relaxed));
    println!(
        "ingest throughput:    {:>10.0} spans/s",
        total as f64 / elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

async fn run_agent(socket: UdpSocket, spans: Arc<AtomicU64>, batches: Arc<AtomicU64>) {
    let mut buf = vec![0u8; 65_535];
    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "fake agent recv failed");
                continue;
            }
        };
        match decode_emit_batch(&buf[..n]) {
            Ok((seq_id, batch)) => {
                tracing::debug!(seq_id, spans = batch.len(), bytes = n, "agent received batch");
                spans.fetch_add(batch.len() as u64, Ordering::Relaxed);
                batches.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => tracing::warn!(error = %err, "fake agent could not decode datagram"),
        }
    }
}

const OPERATIONS: [(&str, SpanKind); 5] = [
    ("/api/v1/users", SpanKind::Server),
    ("db.query", SpanKind::Client),
    ("cache.get", SpanKind::Client),
    ("render", SpanKind::Unspecified),
    ("/api/v1/orders", SpanKind::Server),
];

fn run_producer(producer_id: usize, span_count: usize, exporter: &JaegerExporter) {
    let mut rng = rand::thread_rng();

    for i in 0..span_count {
        let (name, kind) = OPERATIONS[i % OPERATIONS.len()];
        let trace_id = TraceId::from_u128(((producer_id as u128) << 64) | (i / 5) as u128);
        let mut span = SpanRecord::new(
            trace_id,
            SpanId::from_u64(((producer_id as u64) << 32) | i as u64 | 1),
            name,
            kind,
        );
        if i % 5 != 0 {
            span.parent_span_id = SpanId::from_u64(((producer_id as u64) << 32) | (i - 1) as u64 | 1);
        }
        // roughly one span in ten is not sampled
        if rng.gen_bool(0.1) {
            span.trace_options = 0;
        }

        span.set_attribute("producer", producer_id as i64);
        span.set_attribute("iteration", i as i32);
        span.set_attribute("load", rng.gen_range(0.0..1.0));
        span.set_attribute("tags", AttributeValue::Array(vec!["dropped".to_string()]));

        let start = SystemTime::now();
        span.start_time = start;
        span.annotate(
            start,
            "started",
            HashMap::from([("attempt".to_string(), AttributeValue::Int64(1))]),
        );

        let status = if rng.gen_bool(0.1) {
            Status::new(13, "internal error")
        } else {
            Status::new(Status::OK, "")
        };
        span.finish(start + Duration::from_micros(rng.gen_range(50..5_000)), status);

        exporter.ingest(&span);
    }
}
