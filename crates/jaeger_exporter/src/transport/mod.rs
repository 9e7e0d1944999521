//! Delivery of encoded batches to Jaeger
//!
//! [`Transport`] uses native async fn in traits, so it is not object-safe. The exporter holds
//! its transport as `Arc<dyn TransportBoxed>`; every `Transport` gets `TransportBoxed` through
//! the blanket impl below.

mod agent;
mod collector;

pub use agent::{AgentTransport, DEFAULT_MAX_PACKET_SIZE};
pub use collector::CollectorTransport;

use crate::error::ExportError;
use crate::wire::Batch;
use std::future::Future;
use std::pin::Pin;

/// One best-effort delivery of a batch. No retries.
pub trait Transport: Send + Sync {
    fn emit_batch(&self, batch: &Batch) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Short transport name used in logs
    fn name(&self) -> &str;
}

/// Object-safe version of [`Transport`]
pub trait TransportBoxed: Send + Sync {
    fn emit_batch_boxed<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>>;

    fn name(&self) -> &str;
}

impl<T: Transport> TransportBoxed for T {
    fn emit_batch_boxed<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>> {
        Box::pin(self.emit_batch(batch))
    }

    fn name(&self) -> &str {
        Transport::name(self)
    }
}

/// Records every batch it is handed; fails each call while `fail_with` is set
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    batches: std::sync::Mutex<Vec<Batch>>,
    pub(crate) fail_with: std::sync::Mutex<Option<ExportError>>,
    pub(crate) delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn span_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Batch::len).sum()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    async fn emit_batch(&self, batch: &Batch) -> Result<(), ExportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
