//! Bridges synchronous span ingestion with asynchronous delivery.
//!
//! Producers push translated spans onto an unbounded channel without blocking. A single worker
//! task owns the [`BatchProcessor`], hands full or expired batches to the [`Uploader`] and runs
//! those deliveries in a `JoinSet`, at most `max_concurrent_exports` at a time.

use crate::batch_processor::{BatchConfig, BatchProcessor, DEFAULT_BUFFER_MAX_COUNT};
use crate::error::{ErrorHandler, ExportError};
use crate::transport::TransportBoxed;
use crate::wire::{Batch, Process, Span};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Thread-safe counters shared by producers, the worker and delivery tasks
#[derive(Debug, Default)]
pub struct ExportMetrics {
    /// Spans accepted but not yet handed to a delivery
    pub spans_pending: AtomicU64,
    /// Spans accepted whose delivery has not finished (pending plus in flight)
    pub spans_buffered: AtomicU64,
    pub spans_exported: AtomicU64,
    pub batches_exported: AtomicU64,
    pub export_errors: AtomicU64,
    /// Spans refused at ingest because the buffer was full or the worker had stopped
    pub spans_dropped: AtomicU64,
    pub inflight_exports: AtomicU64,
}

impl ExportMetrics {
    pub fn spans_pending(&self) -> u64 {
        self.spans_pending.load(Ordering::Acquire)
    }

    pub fn spans_buffered(&self) -> u64 {
        self.spans_buffered.load(Ordering::Acquire)
    }

    pub fn spans_exported(&self) -> u64 {
        self.spans_exported.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn inflight_exports(&self) -> u64 {
        self.inflight_exports.load(Ordering::Relaxed)
    }

    /// Claims room for one span unless `max` spans are already buffered
    fn try_reserve(&self, max: usize) -> bool {
        let reserved = self
            .spans_buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |buffered| {
                (buffered < max as u64).then_some(buffered + 1)
            })
            .is_ok();
        if reserved {
            self.spans_pending.fetch_add(1, Ordering::AcqRel);
        }
        reserved
    }

    fn record_dropped(&self) {
        self.spans_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_success(&self, span_count: u64) {
        self.spans_exported.fetch_add(span_count, Ordering::Relaxed);
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.export_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wraps spans with the shared process and sends them through the selected transport
pub(crate) struct Uploader {
    process: Process,
    transport: Arc<dyn TransportBoxed>,
    metrics: Arc<ExportMetrics>,
}

impl Uploader {
    pub(crate) fn new(
        process: Process,
        transport: Arc<dyn TransportBoxed>,
        metrics: Arc<ExportMetrics>,
    ) -> Self {
        Self {
            process,
            transport,
            metrics,
        }
    }

    pub(crate) fn process(&self) -> &Process {
        &self.process
    }

    pub(crate) fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub(crate) async fn upload(&self, spans: Vec<Span>) -> Result<(), ExportError> {
        let span_count = spans.len();
        let batch = Batch::new(self.process.clone(), spans);
        match self.transport.emit_batch_boxed(&batch).await {
            Ok(()) => {
                self.metrics.record_success(span_count as u64);
                tracing::debug!(
                    transport = self.transport.name(),
                    spans = span_count,
                    "exported batch"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_error();
                Err(err)
            }
        }
    }
}

enum Command {
    Span(Span),
    /// Deliver everything received so far, then ack once those deliveries have finished
    Flush(oneshot::Sender<()>),
}

/// Producer-facing handle of the accumulator; owns the worker task
pub(crate) struct Accumulator {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
    metrics: Arc<ExportMetrics>,
    buffer_max_count: usize,
}

impl Accumulator {
    /// Spawns the worker. Must be called within a Tokio runtime.
    ///
    /// A `buffer_max_count` of 0 selects [`DEFAULT_BUFFER_MAX_COUNT`].
    pub(crate) fn spawn(config: BatchConfig, uploader: Arc<Uploader>, on_error: ErrorHandler) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::clone(&uploader.metrics);
        let buffer_max_count = match config.buffer_max_count {
            0 => DEFAULT_BUFFER_MAX_COUNT,
            count => count,
        };

        let worker = Worker {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_exports.max(1))),
            processor: BatchProcessor::new(config),
            uploader,
            on_error,
            deliveries: JoinSet::new(),
        };

        Self {
            tx,
            worker: tokio::spawn(worker.run(rx)),
            metrics,
            buffer_max_count,
        }
    }

    pub(crate) fn metrics(&self) -> &Arc<ExportMetrics> {
        &self.metrics
    }

    /// Queues a span without blocking. Returns false if the span was dropped.
    pub(crate) fn add(&self, span: Span) -> bool {
        if !self.metrics.try_reserve(self.buffer_max_count) {
            self.metrics.record_dropped();
            tracing::debug!(
                buffer_max_count = self.buffer_max_count,
                "span buffer full, dropping span"
            );
            return false;
        }
        if self.tx.send(Command::Span(span)).is_err() {
            self.metrics.spans_pending.fetch_sub(1, Ordering::AcqRel);
            self.metrics.spans_buffered.fetch_sub(1, Ordering::AcqRel);
            self.metrics.record_dropped();
            tracing::debug!("exporter worker stopped, dropping span");
            return false;
        }
        true
    }

    /// Waits until every span added before this call has been delivered or failed
    pub(crate) async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stops accepting spans, delivers what is left and waits for the worker to exit
    pub(crate) async fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "exporter worker failed");
        }
    }
}

struct Worker {
    processor: BatchProcessor,
    uploader: Arc<Uploader>,
    on_error: ErrorHandler,
    semaphore: Arc<Semaphore>,
    deliveries: JoinSet<()>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut ticker = tokio::time::interval(tick_period(self.processor.config().batch_timeout));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(joined) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    log_join_error(joined);
                }

                command = rx.recv() => match command {
                    Some(Command::Span(span)) => {
                        self.processor.add(span);
                        if self.processor.is_full() {
                            self.dispatch().await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        self.dispatch().await;
                        self.drain().await;
                        let _ = ack.send(());
                    }
                    None => {
                        self.dispatch().await;
                        self.drain().await;
                        break;
                    }
                },

                _ = ticker.tick() => {
                    if self.processor.should_flush() {
                        self.dispatch().await;
                    }
                }
            }
        }
        tracing::debug!(
            transport = self.uploader.transport_name(),
            "exporter worker stopped"
        );
    }

    /// Hands the pending buffer to a delivery task, waiting for a free delivery slot
    async fn dispatch(&mut self) {
        let Some(spans) = self.processor.take_batch() else {
            return;
        };
        let span_count = spans.len() as u64;
        let metrics = Arc::clone(&self.uploader.metrics);
        metrics.spans_pending.fetch_sub(span_count, Ordering::AcqRel);

        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            metrics.spans_buffered.fetch_sub(span_count, Ordering::AcqRel);
            return;
        };

        let uploader = Arc::clone(&self.uploader);
        let on_error = self.on_error.clone();
        let slot = DeliverySlot::claim(metrics, span_count, permit);

        self.deliveries.spawn(async move {
            let _slot = slot;
            if let Err(err) = uploader.upload(spans).await {
                on_error.handle(&err);
            }
        });
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.deliveries.join_next().await {
            log_join_error(joined);
        }
    }
}

/// Buffer room, in-flight count and semaphore permit held by one delivery.
/// Released on drop, including when the delivery panics.
struct DeliverySlot {
    metrics: Arc<ExportMetrics>,
    span_count: u64,
    _permit: OwnedSemaphorePermit,
}

impl DeliverySlot {
    fn claim(metrics: Arc<ExportMetrics>, span_count: u64, permit: OwnedSemaphorePermit) -> Self {
        metrics.inflight_exports.fetch_add(1, Ordering::Relaxed);
        Self {
            metrics,
            span_count,
            _permit: permit,
        }
    }
}

impl Drop for DeliverySlot {
    fn drop(&mut self) {
        self.metrics
            .spans_buffered
            .fetch_sub(self.span_count, Ordering::AcqRel);
        self.metrics.inflight_exports.fetch_sub(1, Ordering::Relaxed);
    }
}

fn tick_period(batch_timeout: Duration) -> Duration {
    (batch_timeout / 4).max(Duration::from_millis(1))
}

fn log_join_error(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "export task panicked");
    }
}
