use crate::wire::CodecError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned while building an exporter
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither a collector endpoint nor an agent endpoint was configured
    #[error("missing endpoint for Jaeger exporter")]
    MissingEndpoint,
    #[error("invalid collector endpoint {endpoint:?}: {reason}")]
    InvalidCollectorEndpoint { endpoint: String, reason: String },
    /// Agent address could not be resolved or the socket could not be opened
    #[error("agent endpoint {endpoint:?}: {source}")]
    AgentEndpoint {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised by a single delivery attempt.
///
/// These never reach the caller of `ingest`; they are handed to the [`ErrorHandler`] and the
/// batch is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Encoded batch does not fit in one agent datagram
    #[error("data does not fit within one UDP packet; size {size}, max {max}, spans {spans}")]
    BatchTooLarge { size: usize, max: usize, spans: usize },
    /// Collector answered outside the 2xx range
    #[error("failed to upload traces; HTTP status code: {0}")]
    HttpStatus(u16),
    /// Network-level failure (connect, write, request)
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The socket accepted fewer bytes than the datagram holds
    #[error("short write: {written} of {size} bytes sent")]
    ShortWrite { written: usize, size: usize },
}

impl From<CodecError> for ExportError {
    fn from(err: CodecError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Observer for delivery failures.
///
/// Invoked from the exporter's worker task, once per failed batch.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&ExportError) + Send + Sync>);

impl ErrorHandler {
    pub fn new(handler: impl Fn(&ExportError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn handle(&self, err: &ExportError) {
        (self.0)(err);
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(|err| tracing::error!(error = %err, "failed to export to Jaeger"))
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_batch_too_large_message_names_all_sizes() {
        let err = ExportError::BatchTooLarge {
            size: 65001,
            max: 65000,
            spans: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("65001"));
        assert!(msg.contains("65000"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_custom_handler_observes_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = ErrorHandler::new(move |err| sink.lock().unwrap().push(err.clone()));

        handler.handle(&ExportError::HttpStatus(500));
        handler.clone().handle(&ExportError::Transport("refused".into()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ExportError::HttpStatus(500),
                ExportError::Transport("refused".into())
            ]
        );
    }

    #[test]
    fn test_default_handler_does_not_panic() {
        ErrorHandler::default().handle(&ExportError::HttpStatus(503));
    }
}
