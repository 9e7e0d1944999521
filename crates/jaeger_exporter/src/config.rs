//! Exporter configuration
//!
//! [`ExporterConfig`] can be built in code with the `with_*` setters, deserialized from a host
//! application's config file, or read from the standard `JAEGER_*` environment variables.

use crate::batch_processor::BatchConfig;
use crate::error::{ConfigError, ErrorHandler};
use crate::span::AttributeValue;
use crate::tag::attribute_to_tag;
use crate::wire::Process;
use serde::Deserialize;

/// Service name reported when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "OpenCensus";
/// Appended to the deprecated bare `endpoint` to form a collector URL
pub const LEGACY_COLLECTOR_PATH: &str = "/api/traces?format=jaeger.thrift";
pub const DEFAULT_AGENT_PORT: u16 = 6831;

/// A process-level tag. Values go through the same conversion as span attributes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessTag {
    pub key: String,
    pub value: AttributeValue,
}

impl ProcessTag {
    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: AttributeValue::Bool(value),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: AttributeValue::String(value.into()),
        }
    }

    pub fn int64(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: AttributeValue::Int64(value),
        }
    }
}

/// Describes the process that emits the spans
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub service_name: String,
    pub tags: Vec<ProcessTag>,
}

/// Where batches are sent; fixed for the exporter's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Full HTTP collector URL
    Collector(String),
    /// Agent `host:port`
    Agent(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Full collector URL, e.g. `http://localhost:14268/api/traces`
    pub collector_endpoint: String,
    /// Collector base URL, e.g. `http://localhost:14268`.
    /// Deprecated: use `collector_endpoint`.
    pub endpoint: String,
    /// Agent address, e.g. `localhost:6831`
    pub agent_endpoint: String,
    /// Datagram ceiling for the agent transport; 0 means 65000
    pub agent_max_packet_size: usize,
    pub username: String,
    pub password: String,
    /// Deprecated: use `process.service_name`.
    pub service_name: String,
    pub process: ProcessConfig,
    pub batch: BatchConfig,
    #[serde(skip)]
    pub on_error: ErrorHandler,
}

impl ExporterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the `JAEGER_*` variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from a variable lookup.
    ///
    /// `JAEGER_ENDPOINT` is a full collector URL; the agent is used only when
    /// `JAEGER_AGENT_HOST` is set (port from `JAEGER_AGENT_PORT`, default 6831).
    /// Unparsable numbers are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(endpoint) = var("JAEGER_ENDPOINT") {
            config.collector_endpoint = endpoint;
        }
        if let Some(host) = var("JAEGER_AGENT_HOST") {
            let port = var("JAEGER_AGENT_PORT")
                .and_then(|port| parse_or_warn::<u16>("JAEGER_AGENT_PORT", &port))
                .unwrap_or(DEFAULT_AGENT_PORT);
            config.agent_endpoint = format!("{host}:{port}");
        }
        if let Some(username) = var("JAEGER_USER") {
            config.username = username;
        }
        if let Some(password) = var("JAEGER_PASSWORD") {
            config.password = password;
        }
        if let Some(service_name) = var("JAEGER_SERVICE_NAME") {
            config.process.service_name = service_name;
        }
        if let Some(count) = var("JAEGER_BUFFER_MAX_COUNT")
            .and_then(|count| parse_or_warn::<usize>("JAEGER_BUFFER_MAX_COUNT", &count))
        {
            config.batch.buffer_max_count = count;
        }
        config
    }

    pub fn with_collector_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.collector_endpoint = endpoint.into();
        self
    }

    #[deprecated(note = "use `with_collector_endpoint` instead")]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_agent_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.agent_endpoint = endpoint.into();
        self
    }

    pub fn with_agent_max_packet_size(mut self, size: usize) -> Self {
        self.agent_max_packet_size = size;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    #[deprecated(note = "use `with_process` instead")]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_process(mut self, service_name: impl Into<String>, tags: Vec<ProcessTag>) -> Self {
        self.process = ProcessConfig {
            service_name: service_name.into(),
            tags,
        };
        self
    }

    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_buffer_max_count(mut self, count: usize) -> Self {
        self.batch.buffer_max_count = count;
        self
    }

    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }

    /// Picks the destination: collector URL, then the legacy endpoint, then the agent
    pub fn destination(&self) -> Result<Destination, ConfigError> {
        if !self.collector_endpoint.is_empty() {
            return Ok(Destination::Collector(self.collector_endpoint.clone()));
        }
        if !self.endpoint.is_empty() {
            tracing::warn!(
                endpoint = %self.endpoint,
                "`endpoint` has been deprecated, use `collector_endpoint` instead"
            );
            return Ok(Destination::Collector(format!(
                "{}{LEGACY_COLLECTOR_PATH}",
                self.endpoint
            )));
        }
        if !self.agent_endpoint.is_empty() {
            return Ok(Destination::Agent(self.agent_endpoint.clone()));
        }
        Err(ConfigError::MissingEndpoint)
    }

    /// `process.service_name`, else the deprecated `service_name`, else the default
    pub fn resolved_service_name(&self) -> &str {
        [&self.process.service_name, &self.service_name]
            .into_iter()
            .find(|name| !name.is_empty())
            .map_or(DEFAULT_SERVICE_NAME, String::as_str)
    }

    /// Builds the process shared by every batch; unsupported tag values are dropped
    pub fn build_process(&self) -> Process {
        Process {
            service_name: self.resolved_service_name().to_string(),
            tags: self
                .process
                .tags
                .iter()
                .filter_map(|tag| attribute_to_tag(&tag.key, &tag.value))
                .collect(),
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "ignoring unparsable environment variable");
    }
    parsed
}
