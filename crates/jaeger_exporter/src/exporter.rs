use crate::async_bridge::{Accumulator, ExportMetrics, Uploader};
use crate::config::{Destination, ExporterConfig};
use crate::error::{ConfigError, ExportError};
use crate::span::SpanRecord;
use crate::translate::span_to_wire;
use crate::transport::{AgentTransport, CollectorTransport, TransportBoxed};
use crate::wire::{Process, Span};
use std::sync::Arc;

/// Exports finished spans to Jaeger.
///
/// `ingest` is synchronous and cheap: sampled spans are translated on the calling thread and
/// queued for a background worker that batches them and delivers each batch through the
/// transport chosen at construction. Delivery failures go to the configured
/// [`ErrorHandler`](crate::ErrorHandler); they never surface from `ingest`.
pub struct JaegerExporter {
    accumulator: Accumulator,
    uploader: Arc<Uploader>,
}

impl JaegerExporter {
    /// Validates `config`, opens the transport and starts the worker.
    pub async fn new(config: ExporterConfig) -> Result<Self, ConfigError> {
        let transport: Arc<dyn TransportBoxed> = match config.destination()? {
            Destination::Collector(endpoint) => Arc::new(CollectorTransport::new(
                &endpoint,
                &config.username,
                &config.password,
            )?),
            Destination::Agent(endpoint) => Arc::new(
                AgentTransport::connect(&endpoint, config.agent_max_packet_size).await?,
            ),
        };
        Ok(Self::with_transport(config, transport))
    }

    /// Starts an exporter on an already built transport; endpoint settings in `config` are
    /// ignored. Must be called within a Tokio runtime.
    pub fn with_transport(config: ExporterConfig, transport: Arc<dyn TransportBoxed>) -> Self {
        let process = config.build_process();
        tracing::info!(
            transport = transport.name(),
            service_name = %process.service_name,
            "starting Jaeger exporter"
        );

        let metrics = Arc::new(ExportMetrics::default());
        let uploader = Arc::new(Uploader::new(process, transport, metrics));
        let accumulator = Accumulator::spawn(config.batch, Arc::clone(&uploader), config.on_error);
        Self {
            accumulator,
            uploader,
        }
    }

    /// Queues a finished span for export. Unsampled spans are ignored.
    ///
    /// Never blocks on I/O; spans beyond the buffer ceiling are dropped and counted.
    pub fn ingest(&self, span: &SpanRecord) {
        if !span.is_sampled() {
            return;
        }
        self.accumulator.add(span_to_wire(span));
    }

    /// Waits until every span ingested before this call has been handed to a delivery
    /// attempt and that attempt has finished.
    pub async fn flush(&self) {
        self.accumulator.flush().await;
    }

    /// Sends `spans` as one batch right away, bypassing the buffer.
    pub async fn upload(&self, spans: Vec<Span>) -> Result<(), ExportError> {
        self.uploader.upload(spans).await
    }

    /// Stops the worker after delivering everything still buffered
    pub async fn shutdown(self) {
        self.accumulator.shutdown().await;
    }

    pub fn metrics(&self) -> &Arc<ExportMetrics> {
        self.accumulator.metrics()
    }

    /// Spans ingested but not yet handed to a delivery attempt
    pub fn pending_count(&self) -> u64 {
        self.metrics().spans_pending()
    }

    pub fn process(&self) -> &Process {
        self.uploader.process()
    }
}

impl std::fmt::Debug for JaegerExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JaegerExporter")
            .field("transport", &self.uploader.transport_name())
            .field("process", self.process())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_processor::BatchConfig;
    use crate::config::ProcessTag;
    use crate::span::{SpanId, SpanKind, TraceId};
    use crate::transport::RecordingTransport;
    use crate::wire::Tag;
    use std::time::Duration;

    fn record(id: u64) -> SpanRecord {
        SpanRecord::new(
            TraceId::from_u128(u128::from(id)),
            SpanId::from_u64(id),
            format!("op-{id}"),
            SpanKind::Client,
        )
    }

    fn exporter(transport: Arc<RecordingTransport>) -> JaegerExporter {
        let config = ExporterConfig::new()
            .with_process("svc", vec![ProcessTag::string("host", "a")])
            .with_batch_config(BatchConfig {
                max_batch_count: 100,
                batch_timeout: Duration::from_secs(60),
                ..BatchConfig::default()
            });
        JaegerExporter::with_transport(config, transport)
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_construction() {
        let err = JaegerExporter::new(ExporterConfig::new()).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
    }

    #[tokio::test]
    async fn test_ingest_and_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = exporter(transport.clone());

        for id in 1..=3 {
            exporter.ingest(&record(id));
        }
        exporter.flush().await;
        assert_eq!(exporter.pending_count(), 0);

        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].process.service_name, "svc");
        assert_eq!(batches[0].process.tags, vec![Tag::string("host", "a")]);
        assert_eq!(batches[0].spans[0].operation_name, "Sent.op-1");
        exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsampled_spans_are_ignored() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = exporter(transport.clone());

        let mut span = record(1);
        span.trace_options = 0;
        exporter.ingest(&span);
        exporter.flush().await;

        assert!(transport.batches().is_empty());
        assert_eq!(exporter.metrics().spans_dropped(), 0);
        exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_upload_returns_transport_error() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.fail_with.lock().unwrap() = Some(ExportError::HttpStatus(503));
        let exporter = exporter(transport.clone());

        let err = exporter.upload(vec![Span::default()]).await.unwrap_err();
        assert_eq!(err, ExportError::HttpStatus(503));
        assert_eq!(exporter.metrics().export_errors(), 1);
        exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_buffer_max_count_from_env_keeps_exporting() {
        let transport = Arc::new(RecordingTransport::default());
        let config = ExporterConfig::from_lookup(|key| {
            (key == "JAEGER_BUFFER_MAX_COUNT").then(|| "0".to_string())
        });
        assert_eq!(config.batch.buffer_max_count, 0);
        let exporter = JaegerExporter::with_transport(config, transport.clone());

        for id in 1..=5 {
            exporter.ingest(&record(id));
        }
        exporter.flush().await;

        assert_eq!(transport.span_count(), 5);
        assert_eq!(exporter.metrics().spans_dropped(), 0);
        exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_delivers_remaining_spans() {
        let transport = Arc::new(RecordingTransport::default());
        let exporter = exporter(transport.clone());
        exporter.ingest(&record(1));
        exporter.shutdown().await;
        assert_eq!(transport.span_count(), 1);
    }
}
