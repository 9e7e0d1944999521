//! Jaeger Span Exporter
//!
//! Translates finished spans into the Jaeger Thrift model, batches them in the background and
//! delivers each batch either as one compact-encoded UDP datagram to a Jaeger agent or as one
//! binary-encoded HTTP POST to a Jaeger collector.
//!
//! ```rust,ignore
//! use jaeger_exporter::{ExporterConfig, JaegerExporter, ProcessTag};
//!
//! let config = ExporterConfig::new()
//!     .with_agent_endpoint("localhost:6831")
//!     .with_process("checkout", vec![ProcessTag::string("version", "1.4.2")]);
//! let exporter = JaegerExporter::new(config).await?;
//!
//! exporter.ingest(&span);
//! exporter.flush().await;
//! exporter.shutdown().await;
//! ```
//!
//! Delivery is best effort: a batch that fails (too large for one datagram, network error,
//! non-2xx response) is reported to the [`ErrorHandler`] and dropped.

pub mod async_bridge;
pub mod batch_processor;
pub mod config;
pub mod error;
pub mod exporter;
pub mod span;
pub mod tag;
pub mod translate;
pub mod transport;
pub mod wire;

// Re-export main types
pub use async_bridge::ExportMetrics;
pub use batch_processor::{BatchConfig, BatchProcessor};
pub use config::{Destination, ExporterConfig, ProcessConfig, ProcessTag};
pub use error::{ConfigError, ErrorHandler, ExportError};
pub use exporter::JaegerExporter;
pub use span::{
    Annotation, AttributeValue, Link, SpanId, SpanKind, SpanRecord, Status, TraceId,
    TRACE_OPTION_SAMPLED,
};
pub use tag::attribute_to_tag;
pub use translate::span_to_wire;
pub use transport::{AgentTransport, CollectorTransport, Transport, TransportBoxed};
