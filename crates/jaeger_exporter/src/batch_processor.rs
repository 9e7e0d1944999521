//! Batch Processor - Pure Batching Abstraction
//!
//! Buffers translated spans in arrival order and decides when the buffer should be handed
//! off for delivery: once it holds `max_batch_count` spans, or once its oldest span has
//! waited `batch_timeout`.
//!
//! Concurrency is kept out of this module. The worker in [`async_bridge`](crate::async_bridge)
//! owns the processor, feeds it from the ingest channel and runs deliveries concurrently via
//! [`BatchProcessor::take_batch`].
//!
//! ```rust,ignore
//! let mut processor = BatchProcessor::new(BatchConfig::default());
//! processor.add(span);
//! if processor.should_flush() {
//!     if let Some(spans) = processor.take_batch() {
//!         uploader.upload(spans).await?;
//!     }
//! }
//! ```

use crate::wire::Span;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Number of spans that triggers a delivery
pub const DEFAULT_MAX_BATCH_COUNT: usize = 10;
/// Upper bound on spans held in memory (pending plus in flight)
pub const DEFAULT_BUFFER_MAX_COUNT: usize = 1_000_000_000;

/// Configuration for batch processing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Spans per batch; reaching it hands the buffer off immediately
    pub max_batch_count: usize,
    /// Longest time a buffered span waits before its batch is handed off
    #[serde(with = "duration_millis")]
    pub batch_timeout: Duration,
    /// Spans offered while this many are pending or in flight are dropped; 0 means the default
    pub buffer_max_count: usize,
    /// Deliveries allowed to run at once; 1 serializes them
    pub max_concurrent_exports: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            batch_timeout: Duration::from_secs(1),
            buffer_max_count: DEFAULT_BUFFER_MAX_COUNT,
            max_concurrent_exports: 1,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Ordered span buffer with count and age thresholds
pub struct BatchProcessor {
    pending: Vec<Span>,
    config: BatchConfig,
    /// Arrival time of the oldest pending span
    oldest: Option<Instant>,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            pending: Vec::new(),
            config,
            oldest: None,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Adds a span to the end of the buffer
    pub fn add(&mut self, span: Span) {
        if self.pending.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.pending.push(span);
    }

    pub fn total_pending(&self) -> usize {
        self.pending.len()
    }

    /// True once the count threshold is reached
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.config.max_batch_count.max(1)
    }

    /// True when the oldest pending span has waited at least `batch_timeout`
    pub fn is_expired(&self) -> bool {
        self.oldest
            .is_some_and(|oldest| oldest.elapsed() >= self.config.batch_timeout)
    }

    pub fn should_flush(&self) -> bool {
        !self.pending.is_empty() && (self.is_full() || self.is_expired())
    }

    /// Takes every pending span, in arrival order.
    ///
    /// Returns `None` if nothing is pending.
    pub fn take_batch(&mut self) -> Option<Vec<Span>> {
        if self.pending.is_empty() {
            return None;
        }
        self.oldest = None;
        let capacity = self.config.max_batch_count.min(1024);
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(capacity),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: i64) -> Span {
        Span {
            span_id: id,
            operation_name: format!("op-{id}"),
            ..Span::default()
        }
    }

    #[test]
    fn test_count_threshold() {
        let mut processor = BatchProcessor::new(BatchConfig {
            max_batch_count: 5,
            batch_timeout: Duration::from_secs(10),
            ..BatchConfig::default()
        });

        for i in 0..4 {
            processor.add(span(i));
        }
        assert_eq!(processor.total_pending(), 4);
        assert!(!processor.should_flush());

        processor.add(span(4));
        assert!(processor.should_flush());

        let batch = processor.take_batch().unwrap();
        assert_eq!(
            batch.iter().map(|s| s.span_id).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(processor.total_pending(), 0);
        assert!(!processor.should_flush());
    }

    #[test]
    fn test_take_batch_empty() {
        let mut processor = BatchProcessor::new(BatchConfig::default());
        assert!(processor.take_batch().is_none());

        processor.add(span(1));
        assert_eq!(processor.take_batch().unwrap().len(), 1);
        assert!(processor.take_batch().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_threshold() {
        let mut processor = BatchProcessor::new(BatchConfig {
            batch_timeout: Duration::from_millis(100),
            ..BatchConfig::default()
        });
        assert!(!processor.is_expired());

        processor.add(span(1));
        tokio::time::advance(Duration::from_millis(60)).await;
        processor.add(span(2));
        assert!(!processor.should_flush());

        // age is measured from the oldest span, not the newest
        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(processor.should_flush());

        processor.take_batch();
        assert!(!processor.is_expired());
    }

    #[test]
    fn test_zero_batch_count_behaves_as_one() {
        let mut processor = BatchProcessor::new(BatchConfig {
            max_batch_count: 0,
            ..BatchConfig::default()
        });
        assert!(!processor.should_flush());
        processor.add(span(1));
        assert!(processor.should_flush());
    }

    #[test]
    fn test_config_deserialize() {
        let config: BatchConfig =
            serde_json::from_str(r#"{"max_batch_count": 50, "batch_timeout": 250}"#).unwrap();
        assert_eq!(config.max_batch_count, 50);
        assert_eq!(config.batch_timeout, Duration::from_millis(250));
        assert_eq!(config.buffer_max_count, DEFAULT_BUFFER_MAX_COUNT);
        assert_eq!(config.max_concurrent_exports, 1);
    }
}
